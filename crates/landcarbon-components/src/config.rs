//! Scenario configuration
//!
//! A scenario describes one region: the accounting settings, the model periods, the land
//! tree and the carbon parameters of every leaf.
//!
//! ```toml
//! region = "USA"
//!
//! [settings]
//! soil_time_scale = 40.0
//!
//! [modeltime]
//! years = [1975, 1990, 2005]
//!
//! [[nodes]]
//! name = "Forest"
//! conceptual_root = true
//!
//! [[leaves]]
//! name = "Hardwood"
//! parent = "Forest"
//! land_allocation = [10.0, 9.0, 8.0]
//! land_use_history = [[1700, 12.0], [1975, 10.0]]
//! historical_share = 1.0
//!
//! [leaves.carbon]
//! type = "box"
//! densities = { vegetation = 6.0 }
//! ```
//!
//! Box and flow names are only checked when the leaves are built, so a misspelt name
//! removes the affected leaf rather than the whole scenario.

use crate::allocator::{LandAllocator, LandLeaf, LeafFailure};
use crate::carbon::{BoxCarbonCalc, CarbonCalc, NoEmissCarbonCalc};
use crate::parameters::{BoxModelParameters, FlowDefinition, FlowRate};
use landcarbon_core::carbon_types::{string_box_name_to_type, string_flow_name_to_type, BoxType};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::land_use_history::LandUseHistory;
use landcarbon_core::settings::CarbonSettings;
use landcarbon_core::timeseries::{FloatValue, Modeltime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeltimeConfig {
    /// Calendar year of every model period
    pub years: Modeltime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Defaults to the region
    pub parent: Option<String>,
    #[serde(default)]
    pub conceptual_root: bool,
}

/// A flow rule with its pools and flow type still given by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub rate: FlowRate,
}

impl FlowConfig {
    fn resolve(&self) -> CarbonResult<FlowDefinition> {
        Ok(FlowDefinition::new(
            string_box_name_to_type(&self.from)?,
            string_box_name_to_type(&self.to)?,
            string_flow_name_to_type(&self.kind)?,
            self.rate.clone(),
        ))
    }
}

/// Carbon calculator of a leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CarbonConfig {
    /// [`BoxCarbonCalc`]. Densities given here replace the default for that pool and
    /// flows given here replace every default flow.
    Box {
        #[serde(default)]
        densities: BTreeMap<String, FloatValue>,
        flows: Option<Vec<FlowConfig>>,
    },
    /// [`NoEmissCarbonCalc`]
    NoEmissions {
        #[serde(default)]
        densities: BTreeMap<String, FloatValue>,
    },
}

impl Default for CarbonConfig {
    fn default() -> Self {
        CarbonConfig::Box {
            densities: BTreeMap::new(),
            flows: None,
        }
    }
}

fn resolve_densities(
    densities: &BTreeMap<String, FloatValue>,
) -> CarbonResult<BTreeMap<BoxType, FloatValue>> {
    densities
        .iter()
        .map(|(name, density)| string_box_name_to_type(name).map(|box_type| (box_type, *density)))
        .collect()
}

impl CarbonConfig {
    /// Build the calculator, converting every box and flow name
    pub fn build(&self) -> CarbonResult<Box<dyn CarbonCalc>> {
        match self {
            CarbonConfig::Box { densities, flows } => {
                let mut parameters = BoxModelParameters::default();
                parameters.densities.extend(resolve_densities(densities)?);
                if let Some(flows) = flows {
                    parameters.flows = flows
                        .iter()
                        .map(FlowConfig::resolve)
                        .collect::<CarbonResult<Vec<_>>>()?;
                }
                Ok(Box::new(BoxCarbonCalc::from_parameters(parameters)))
            }
            CarbonConfig::NoEmissions { densities } => Ok(Box::new(NoEmissCarbonCalc::new(
                resolve_densities(densities)?,
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafConfig {
    pub name: String,
    /// Defaults to the region
    pub parent: Option<String>,
    /// Land area of each model period
    pub land_allocation: Vec<FloatValue>,
    pub land_use_history: Option<LandUseHistory>,
    /// Weight of the history after its cutoff, required with `land_use_history`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_share: Option<FloatValue>,
    #[serde(default)]
    pub carbon: CarbonConfig,
}

/// Scenario of a single region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub region: String,
    #[serde(default)]
    pub settings: CarbonSettings,
    pub modeltime: ModeltimeConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub leaves: Vec<LeafConfig>,
}

/// The allocator built from a scenario and the leaves that could not be built
#[derive(Debug)]
pub struct ScenarioLoad {
    pub allocator: LandAllocator,
    pub failures: Vec<LeafFailure>,
}

impl ScenarioConfig {
    /// Parse a scenario.
    ///
    /// # Errors
    ///
    /// [`CarbonError::Config`] if the text is not a valid scenario.
    pub fn from_toml_str(text: &str) -> CarbonResult<Self> {
        toml::from_str(text).map_err(|e| CarbonError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> CarbonResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CarbonError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> CarbonResult<String> {
        toml::to_string(self).map_err(|e| CarbonError::Config(e.to_string()))
    }

    /// Build the land allocator of the scenario.
    ///
    /// Nodes are added in order, so a node's parent must come before it. A leaf that
    /// can not be built is left out and reported; the allocator is still returned.
    ///
    /// # Errors
    ///
    /// Fails if the settings are invalid or a node can not be added.
    pub fn build(&self) -> CarbonResult<ScenarioLoad> {
        self.settings.validate()?;
        let mut allocator = LandAllocator::new(
            &self.region,
            Arc::new(self.modeltime.years.clone()),
            Arc::new(self.settings.clone()),
        );

        for node in &self.nodes {
            let parent = node.parent.as_deref().unwrap_or(&self.region);
            allocator
                .add_node(parent, &node.name, node.conceptual_root)
                .map_err(|e| CarbonError::Config(format!("node '{}': {}", node.name, e)))?;
        }

        let mut failures = Vec::new();
        for leaf in &self.leaves {
            if let Err(error) = self.add_leaf(&mut allocator, leaf) {
                warn!(
                    region = %self.region,
                    leaf = %leaf.name,
                    error = %error,
                    "Skipping land leaf with invalid configuration"
                );
                failures.push(LeafFailure::new(leaf.name.clone(), error));
            }
        }

        info!(
            region = %self.region,
            nodes = self.nodes.len(),
            leaves = allocator.leaves().len(),
            skipped = failures.len(),
            "Loaded scenario"
        );
        Ok(ScenarioLoad {
            allocator,
            failures,
        })
    }

    fn add_leaf(&self, allocator: &mut LandAllocator, config: &LeafConfig) -> CarbonResult<()> {
        let carbon = config.carbon.build()?;
        let mut leaf = LandLeaf::new(&config.name, carbon)
            .with_land_allocation(config.land_allocation.clone());
        match (&config.land_use_history, config.historical_share) {
            (Some(history), Some(share)) => leaf = leaf.with_history(history.clone(), share),
            (Some(_), None) => {
                return Err(CarbonError::Config(format!(
                    "leaf '{}': land_use_history requires a historical_share",
                    config.name
                )))
            }
            (None, _) => {}
        }
        let parent = config.parent.as_deref().unwrap_or(&self.region);
        allocator.add_leaf(parent, leaf)?;
        Ok(())
    }
}

/// Parse a scenario and build its land allocator
pub fn load_scenario(text: &str) -> CarbonResult<ScenarioLoad> {
    ScenarioConfig::from_toml_str(text)?.build()
}
