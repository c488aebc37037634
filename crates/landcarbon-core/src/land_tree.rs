//! Land allocation tree and conceptual root resolution.
//!
//! The land of a region is organised as a tree of land types, for example
//! `Region -> AgroForest -> Forest -> Hardwood`. Carbon is reported by the top-level
//! conceptual category of each leaf, so every node knows which flagged ancestor
//! ("conceptual root") it belongs to.
//!
//! Nodes live in a [`petgraph::Graph`] arena. Each node stores the index of its parent and
//! a memoized [`ConceptualRootKey`], so lookups never walk the tree.
//!
//! ```rust
//! use landcarbon_core::land_tree::LandTree;
//!
//! let mut tree = LandTree::new("USA");
//! let forest = tree.add_child(tree.root(), "Forest", true).unwrap();
//! let hardwood = tree.add_child(forest, "Hardwood", false).unwrap();
//! let softwood = tree.add_child(forest, "Softwood", false).unwrap();
//!
//! assert_eq!(
//!     tree.conceptual_root_key(hardwood).unwrap(),
//!     tree.conceptual_root_key(softwood).unwrap()
//! );
//! ```

use crate::errors::{CarbonError, CarbonResult};
use petgraph::graph::NodeIndex;
use petgraph::visit::Bfs;
use petgraph::Graph;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Identifier of a conceptual root.
///
/// Keys are dense: a tree with `n` conceptual roots uses keys `0..n`, so a key can index
/// an array of per-category accumulators. Key 0 always belongs to the tree root, which
/// collects every node without a flagged ancestor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptualRootKey(usize);

impl ConceptualRootKey {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConceptualRootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of the land allocation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandNode {
    pub name: String,
    /// Whether this node is a top-level conceptual category
    pub conceptual_root: bool,
    parent: Option<NodeIndex>,
    root_key: ConceptualRootKey,
}

impl LandNode {
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn conceptual_root_key(&self) -> ConceptualRootKey {
        self.root_key
    }
}

/// Land allocation tree of a region.
///
/// Edges point from parent to child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandTree {
    graph: Graph<LandNode, ()>,
    root: NodeIndex,
    /// Node of each conceptual root, indexed by key
    conceptual_roots: Vec<NodeIndex>,
}

impl LandTree {
    /// Create a tree containing only a root node
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut graph = Graph::new();
        let root = graph.add_node(LandNode {
            name: root_name.into(),
            conceptual_root: false,
            parent: None,
            root_key: ConceptualRootKey(0),
        });
        Self {
            graph,
            root,
            conceptual_roots: vec![root],
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.graph.node_weight(node).is_some()
    }

    /// The node at `node`.
    ///
    /// # Errors
    ///
    /// [`CarbonError::NullReference`] if the node is not part of this tree.
    pub fn node(&self, node: NodeIndex) -> CarbonResult<&LandNode> {
        self.graph.node_weight(node).ok_or_else(|| {
            CarbonError::NullReference(format!("land node {} is not in the tree", node.index()))
        })
    }

    pub fn name(&self, node: NodeIndex) -> CarbonResult<&str> {
        self.node(node).map(|n| n.name.as_str())
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|idx| self.graph[*idx].name == name)
    }

    /// Add a node below `parent`.
    ///
    /// Node names must be unique within the tree.
    pub fn add_child(
        &mut self,
        parent: NodeIndex,
        name: impl Into<String>,
        conceptual_root: bool,
    ) -> CarbonResult<NodeIndex> {
        let parent_key = self.node(parent)?.root_key;
        let name = name.into();
        if self.find(&name).is_some() {
            return Err(CarbonError::invalid_parameter(
                "name",
                format!("a land node named '{}' already exists", name),
            ));
        }

        let root_key = if conceptual_root {
            ConceptualRootKey(self.conceptual_roots.len())
        } else {
            parent_key
        };
        let node = self.graph.add_node(LandNode {
            name,
            conceptual_root,
            parent: Some(parent),
            root_key,
        });
        self.graph.add_edge(parent, node, ());
        if conceptual_root {
            self.conceptual_roots.push(node);
        }
        Ok(node)
    }

    pub fn parent(&self, node: NodeIndex) -> CarbonResult<Option<NodeIndex>> {
        self.node(node).map(|n| n.parent)
    }

    /// Children of `node`, in insertion order
    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        children.sort();
        children
    }

    pub fn is_leaf(&self, node: NodeIndex) -> bool {
        self.contains(node) && self.graph.neighbors(node).next().is_none()
    }

    /// Walk from `node` towards the root until reaching a conceptual root.
    ///
    /// The tree root is returned when no flagged ancestor exists.
    pub fn conceptual_root(&self, node: NodeIndex) -> CarbonResult<NodeIndex> {
        let mut current = node;
        // A walk longer than the number of nodes would mean a cycle in the parent links
        for _ in 0..self.graph.node_count() {
            let land_node = self.node(current)?;
            if land_node.conceptual_root {
                return Ok(current);
            }
            match land_node.parent {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(CarbonError::NullReference(format!(
            "no conceptual root found above land node {}",
            node.index()
        )))
    }

    /// Key of the conceptual root `node` belongs to.
    ///
    /// # Errors
    ///
    /// [`CarbonError::NullReference`] if the node is not part of this tree.
    pub fn conceptual_root_key(&self, node: NodeIndex) -> CarbonResult<ConceptualRootKey> {
        self.node(node).map(|n| n.root_key)
    }

    pub fn num_conceptual_roots(&self) -> usize {
        self.conceptual_roots.len()
    }

    pub fn conceptual_root_name(&self, key: ConceptualRootKey) -> Option<&str> {
        self.conceptual_roots
            .get(key.index())
            .map(|idx| self.graph[*idx].name.as_str())
    }

    /// Flag or unflag `node` as a conceptual root and recompute every key.
    pub fn set_conceptual_root(&mut self, node: NodeIndex, flag: bool) -> CarbonResult<()> {
        self.node(node)?;
        self.graph[node].conceptual_root = flag;
        self.rebuild_root_keys();
        Ok(())
    }

    /// Recompute every memoized conceptual root key.
    ///
    /// Keys are assigned in breadth-first order starting with the tree root.
    pub fn rebuild_root_keys(&mut self) {
        self.conceptual_roots.clear();
        self.conceptual_roots.push(self.root);

        let mut bfs = Bfs::new(&self.graph, self.root);
        while let Some(node) = bfs.next(&self.graph) {
            let key = if node == self.root {
                ConceptualRootKey(0)
            } else if self.graph[node].conceptual_root {
                self.conceptual_roots.push(node);
                ConceptualRootKey(self.conceptual_roots.len() - 1)
            } else {
                match self.graph[node].parent {
                    Some(parent) => self.graph[parent].root_key,
                    None => ConceptualRootKey(0),
                }
            };
            self.graph[node].root_key = key;
        }
        debug!(
            nodes = self.graph.node_count(),
            conceptual_roots = self.conceptual_roots.len(),
            "Rebuilt conceptual root keys"
        );
    }
}
