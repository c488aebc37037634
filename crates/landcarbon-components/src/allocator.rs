//! Land allocator of a region
//!
//! The allocator owns the land tree of a region and one [`LandLeaf`] per land category.
//! It drives every leaf's carbon calculator period by period and aggregates the results
//! by conceptual root.

use crate::carbon::{CarbonCalc, LeafContext};
use crate::report::{CarbonSummary, PeriodCarbonReport};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::land_tree::{ConceptualRootKey, LandTree};
use landcarbon_core::land_use_history::LandUseHistory;
use landcarbon_core::settings::CarbonSettings;
use landcarbon_core::timeseries::{FloatValue, Modeltime, PeriodVector};
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A land category at the bottom of the land tree
#[derive(Debug)]
pub struct LandLeaf {
    name: String,
    node: NodeIndex,
    simulated: PeriodVector,
    history: Option<LandUseHistory>,
    historical_share: FloatValue,
    carbon: Box<dyn CarbonCalc>,
    /// Latest report of each calculated period
    reports: BTreeMap<usize, PeriodCarbonReport>,
    enabled: bool,
}

impl LandLeaf {
    pub fn new(name: impl Into<String>, carbon: Box<dyn CarbonCalc>) -> Self {
        Self {
            name: name.into(),
            node: NodeIndex::end(),
            simulated: PeriodVector::from(vec![]),
            history: None,
            historical_share: 0.0,
            carbon,
            reports: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Land allocation of each period
    pub fn with_land_allocation(mut self, simulated: impl Into<PeriodVector>) -> Self {
        self.simulated = simulated.into();
        self
    }

    /// Historical land use and the weight it carries after the historical cutoff
    pub fn with_history(mut self, history: LandUseHistory, historical_share: FloatValue) -> Self {
        self.history = Some(history);
        self.historical_share = historical_share;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> NodeIndex {
        self.node
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn carbon(&self) -> &dyn CarbonCalc {
        self.carbon.as_ref()
    }

    pub fn land_allocation(&self) -> &PeriodVector {
        &self.simulated
    }

    /// Report of the last calculation of `period`
    pub fn report(&self, period: usize) -> Option<&PeriodCarbonReport> {
        self.reports.get(&period)
    }

    fn complete_init(
        &mut self,
        conceptual_root: ConceptualRootKey,
        modeltime: &Modeltime,
        settings: Arc<CarbonSettings>,
    ) -> CarbonResult<()> {
        let context = LeafContext {
            name: &self.name,
            conceptual_root,
            modeltime,
            simulated: &self.simulated,
            history: self.history.as_ref(),
            historical_share: self.historical_share,
        };
        self.reports.clear();
        self.carbon.complete_init(settings, &context)
    }

    fn calc(
        &mut self,
        conceptual_root: ConceptualRootKey,
        period: usize,
        modeltime: &Modeltime,
    ) -> CarbonResult<PeriodCarbonReport> {
        let context = LeafContext {
            name: &self.name,
            conceptual_root,
            modeltime,
            simulated: &self.simulated,
            history: self.history.as_ref(),
            historical_share: self.historical_share,
        };
        match self.carbon.calc(period, &context) {
            Ok(report) => {
                self.reports.insert(period, report.clone());
                Ok(report)
            }
            Err(error) => {
                self.reports.remove(&period);
                Err(error)
            }
        }
    }
}

/// An error that stopped a single leaf
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafFailure {
    pub leaf: String,
    pub error: String,
    #[serde(skip)]
    pub source: CarbonError,
}

impl LeafFailure {
    pub fn new(leaf: impl Into<String>, error: CarbonError) -> Self {
        Self {
            leaf: leaf.into(),
            error: error.to_string(),
            source: error,
        }
    }
}

/// Reports of the leaves that were calculated for a period and the leaves that failed
#[derive(Debug, Clone, Default)]
pub struct PeriodResults {
    pub reports: Vec<PeriodCarbonReport>,
    pub failures: Vec<LeafFailure>,
}

/// Land allocation and carbon accounting of a single region
#[derive(Debug)]
pub struct LandAllocator {
    region: String,
    tree: LandTree,
    leaves: Vec<LandLeaf>,
    modeltime: Arc<Modeltime>,
    settings: Arc<CarbonSettings>,
}

impl LandAllocator {
    pub fn new(
        region: impl Into<String>,
        modeltime: Arc<Modeltime>,
        settings: Arc<CarbonSettings>,
    ) -> Self {
        let region = region.into();
        Self {
            tree: LandTree::new(region.clone()),
            region,
            leaves: Vec::new(),
            modeltime,
            settings,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn tree(&self) -> &LandTree {
        &self.tree
    }

    pub fn modeltime(&self) -> &Modeltime {
        &self.modeltime
    }

    pub fn settings(&self) -> &CarbonSettings {
        &self.settings
    }

    pub fn leaves(&self) -> &[LandLeaf] {
        &self.leaves
    }

    pub fn leaf(&self, name: &str) -> Option<&LandLeaf> {
        self.leaves.iter().find(|l| l.name == name)
    }

    fn find_node(&self, name: &str) -> CarbonResult<NodeIndex> {
        self.tree
            .find(name)
            .ok_or_else(|| CarbonError::NullReference(format!("no land node named '{}'", name)))
    }

    /// Add an intermediate node below the node named `parent`
    pub fn add_node(
        &mut self,
        parent: &str,
        name: impl Into<String>,
        conceptual_root: bool,
    ) -> CarbonResult<NodeIndex> {
        let parent = self.find_node(parent)?;
        if self.leaves.iter().any(|l| l.node == parent) {
            return Err(CarbonError::invalid_parameter(
                "parent",
                "land leaves can not have children",
            ));
        }
        self.tree.add_child(parent, name, conceptual_root)
    }

    /// Add a leaf below the node named `parent`.
    ///
    /// The land allocation is extended to cover every model period by holding its last
    /// value.
    pub fn add_leaf(&mut self, parent: &str, mut leaf: LandLeaf) -> CarbonResult<NodeIndex> {
        let parent = self.find_node(parent)?;
        if self.leaves.iter().any(|l| l.node == parent) {
            return Err(CarbonError::invalid_parameter(
                "parent",
                "land leaves can not have children",
            ));
        }

        let num_periods = self.modeltime.num_periods();
        let mut values: Vec<FloatValue> = leaf.simulated.clone().into();
        let fill = values.last().copied().unwrap_or(0.0);
        values.resize(values.len().max(num_periods), fill);
        leaf.simulated = PeriodVector::from(values);

        leaf.node = self.tree.add_child(parent, leaf.name.clone(), false)?;
        let node = leaf.node;
        self.leaves.push(leaf);
        Ok(node)
    }

    /// Set the land allocation of a leaf for one period.
    ///
    /// A leaf that has already calculated `period` must calculate it again to pick up
    /// the new value.
    pub fn set_land_allocation(
        &mut self,
        leaf: &str,
        period: usize,
        value: FloatValue,
    ) -> CarbonResult<()> {
        let leaf = self
            .leaves
            .iter_mut()
            .find(|l| l.name == leaf)
            .ok_or_else(|| CarbonError::NullReference(format!("no land leaf named '{}'", leaf)))?;
        leaf.simulated.set(period, value)
    }

    /// Flag or unflag a node as a conceptual root
    pub fn set_conceptual_root(&mut self, name: &str, flag: bool) -> CarbonResult<()> {
        let node = self.find_node(name)?;
        self.tree.set_conceptual_root(node, flag)
    }

    /// Initialise the carbon calculator of every leaf.
    ///
    /// A leaf that fails to initialise is disabled and its failure returned; the other
    /// leaves are unaffected.
    ///
    /// # Errors
    ///
    /// Fails as a whole if the settings can not cover the model time.
    pub fn complete_init(&mut self) -> CarbonResult<Vec<LeafFailure>> {
        self.settings.validate_against(&self.modeltime)?;

        let mut failures = Vec::new();
        for leaf in &mut self.leaves {
            let key = self.tree.conceptual_root_key(leaf.node)?;
            match leaf.complete_init(key, &self.modeltime, self.settings.clone()) {
                Ok(()) => leaf.enabled = true,
                Err(error) => {
                    warn!(
                        region = %self.region,
                        leaf = %leaf.name,
                        error = %error,
                        "Disabling land leaf that failed to initialise"
                    );
                    leaf.enabled = false;
                    failures.push(LeafFailure::new(leaf.name.clone(), error));
                }
            }
        }
        info!(
            region = %self.region,
            leaves = self.leaves.len(),
            failed = failures.len(),
            "Initialised carbon calculators"
        );
        Ok(failures)
    }

    /// Calculate carbon for `period` in every enabled leaf.
    ///
    /// Leaves are independent and calculated in parallel.
    pub fn calc_carbon(&mut self, period: usize) -> CarbonResult<PeriodResults> {
        if period >= self.modeltime.num_periods() {
            return Err(CarbonError::invalid_parameter(
                "period",
                format!(
                    "{} is not one of the {} model periods",
                    period,
                    self.modeltime.num_periods()
                ),
            ));
        }

        let tree = &self.tree;
        let modeltime = self.modeltime.as_ref();
        let outcomes: Vec<(String, CarbonResult<PeriodCarbonReport>)> = self
            .leaves
            .par_iter_mut()
            .filter(|leaf| leaf.enabled)
            .map(|leaf| {
                let outcome = tree
                    .conceptual_root_key(leaf.node)
                    .and_then(|key| leaf.calc(key, period, modeltime));
                (leaf.name.clone(), outcome)
            })
            .collect();

        let mut results = PeriodResults::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(report) => results.reports.push(report),
                Err(error) => {
                    warn!(
                        region = %self.region,
                        leaf = %name,
                        period,
                        error = %error,
                        "Carbon calculation failed"
                    );
                    results.failures.push(LeafFailure::new(name, error));
                }
            }
        }
        Ok(results)
    }

    /// Carbon results of `period` aggregated by conceptual root.
    ///
    /// Only enabled leaves contribute, each with the report of its latest calculation of
    /// the period, diagnostics included.
    ///
    /// # Errors
    ///
    /// [`CarbonError::YearOutOfRange`] if an enabled leaf has not calculated the period.
    pub fn summarize(&self, period: usize) -> CarbonResult<CarbonSummary> {
        if period >= self.modeltime.num_periods() {
            return Err(CarbonError::invalid_parameter(
                "period",
                format!("{} is not a model period", period),
            ));
        }
        let year = self.modeltime.period_to_year(period);
        let mut summary = CarbonSummary::new(&self.region, &self.tree, period, year);

        for leaf in self.leaves.iter().filter(|l| l.enabled) {
            let calculated = leaf.carbon.calculated_through();
            if calculated.map_or(true, |last| last < year) {
                return Err(CarbonError::YearOutOfRange {
                    year,
                    start: self.settings.start_year(),
                    end: calculated.unwrap_or(self.settings.start_year()),
                });
            }
            let mut report = leaf
                .reports
                .get(&period)
                .cloned()
                .ok_or_else(|| CarbonError::YearOutOfRange {
                    year,
                    start: self.settings.start_year(),
                    end: calculated.unwrap_or(self.settings.start_year()),
                })?;
            // Conceptual roots may have been re-flagged since the calculation
            report.conceptual_root = self.tree.conceptual_root_key(leaf.node)?;
            summary.add(&report);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon::{BoxCarbonCalc, NoEmissCarbonCalc};
    use approx::assert_relative_eq;

    fn allocator() -> LandAllocator {
        let modeltime = Arc::new(Modeltime::new(vec![1975, 1990, 2005]).unwrap());
        let mut allocator =
            LandAllocator::new("USA", modeltime, Arc::new(CarbonSettings::default()));
        allocator.add_node("USA", "Forest", true).unwrap();
        allocator
            .add_leaf(
                "Forest",
                LandLeaf::new("Hardwood", Box::new(BoxCarbonCalc::default()))
                    .with_land_allocation(vec![1.0, 1.0, 1.0]),
            )
            .unwrap();
        allocator
            .add_leaf(
                "Forest",
                LandLeaf::new("Softwood", Box::new(BoxCarbonCalc::default()))
                    .with_land_allocation(vec![2.0]),
            )
            .unwrap();
        allocator
            .add_leaf(
                "USA",
                LandLeaf::new("Rock", Box::new(NoEmissCarbonCalc::default()))
                    .with_land_allocation(vec![4.0]),
            )
            .unwrap();
        allocator
    }

    #[test]
    fn land_allocation_covers_every_period() {
        let allocator = allocator();
        let leaf = allocator.leaf("Softwood").unwrap();
        assert_eq!(leaf.land_allocation().len(), 3);
        assert_eq!(leaf.land_allocation()[2], 2.0);
    }

    #[test]
    fn leaves_can_not_have_children() {
        let mut allocator = allocator();
        assert!(allocator.add_node("Hardwood", "Oak", false).is_err());
        assert!(matches!(
            allocator.add_node("Nowhere", "Oak", false),
            Err(CarbonError::NullReference(_))
        ));
    }

    #[test]
    fn calc_before_init_reports_failures() {
        let mut allocator = allocator();
        let results = allocator.calc_carbon(0).unwrap();
        assert!(results.reports.is_empty());
        assert_eq!(results.failures.len(), 3);
        assert!(results
            .failures
            .iter()
            .all(|f| matches!(f.source, CarbonError::Uninitialized(_))));
    }

    #[test]
    fn summary_by_conceptual_root() {
        let mut allocator = allocator();
        assert!(allocator.complete_init().unwrap().is_empty());

        for period in 0..3 {
            let results = allocator.calc_carbon(period).unwrap();
            assert_eq!(results.reports.len(), 3);
            assert!(results.failures.is_empty());
        }

        let summary = allocator.summarize(2).unwrap();
        assert_eq!(summary.entries.len(), 2);
        let forest = &summary.entries[1];
        assert_eq!(forest.name, "Forest");
        assert_eq!(forest.leaves, 2);
        assert_relative_eq!(forest.total_stock(), 48.0, max_relative = 1e-9);
        assert_relative_eq!(forest.net_emissions, 0.0, epsilon = 1e-9);
        assert_eq!(summary.entries[0].leaves, 1);
    }

    #[test]
    fn summary_keeps_diagnostics() {
        use crate::parameters::{BoxModelParameters, FlowDefinition, FlowRate};
        use landcarbon_core::carbon_types::{BoxType, FlowType};
        use std::collections::BTreeMap;

        let modeltime = Arc::new(Modeltime::new(vec![1705]).unwrap());
        let mut allocator =
            LandAllocator::new("USA", modeltime, Arc::new(CarbonSettings::default()));
        let parameters = BoxModelParameters {
            densities: BTreeMap::from([(BoxType::Vegetation, 1.0)]),
            flows: vec![FlowDefinition::new(
                BoxType::Vegetation,
                BoxType::Atmosphere,
                FlowType::BoxFlow,
                FlowRate::constant_per_area(5.0),
            )],
        };
        allocator
            .add_leaf(
                "USA",
                LandLeaf::new("Scrub", Box::new(BoxCarbonCalc::from_parameters(parameters)))
                    .with_land_allocation(vec![1.0]),
            )
            .unwrap();
        allocator.complete_init().unwrap();

        let results = allocator.calc_carbon(0).unwrap();
        assert_eq!(results.reports[0].diagnostics.len(), 5);

        let summary = allocator.summarize(0).unwrap();
        let entry = &summary.entries[0];
        assert_eq!(entry.diagnostics, 5);
        assert_relative_eq!(entry.net_emissions, 1.0, max_relative = 1e-9);
        assert_eq!(
            allocator.leaf("Scrub").unwrap().report(0),
            Some(&results.reports[0])
        );
    }

    #[test]
    fn summary_requires_calculated_period() {
        let mut allocator = allocator();
        allocator.complete_init().unwrap();
        allocator.calc_carbon(0).unwrap();

        assert!(allocator.summarize(0).is_ok());
        assert!(matches!(
            allocator.summarize(1),
            Err(CarbonError::YearOutOfRange { year: 1990, end: 1975, .. })
        ));
    }

    #[test]
    fn setting_land_allocation_and_recalculating() {
        let mut allocator = allocator();
        allocator.complete_init().unwrap();
        allocator.calc_carbon(0).unwrap();
        let before = allocator.calc_carbon(1).unwrap();

        allocator.set_land_allocation("Hardwood", 1, 0.5).unwrap();
        let after = allocator.calc_carbon(1).unwrap();
        let hardwood = |results: &PeriodResults| {
            results
                .reports
                .iter()
                .find(|r| r.category == "Hardwood")
                .map(|r| r.net_emissions)
                .unwrap()
        };
        assert!(hardwood(&after) > hardwood(&before));

        assert!(allocator.set_land_allocation("Hardwood", 7, 0.5).is_err());
        assert!(allocator.set_land_allocation("Birch", 1, 0.5).is_err());
    }

    #[test]
    fn invalid_settings_fail_the_whole_init() {
        let modeltime = Arc::new(Modeltime::new(vec![1600]).unwrap());
        let mut allocator =
            LandAllocator::new("USA", modeltime, Arc::new(CarbonSettings::default()));
        assert!(allocator.complete_init().is_err());
    }
}
