//! Per-period carbon results and their aggregation by conceptual root.

use landcarbon_core::carbon_types::{BoxType, FlowType};
use landcarbon_core::land_tree::{ConceptualRootKey, LandTree};
use landcarbon_core::timeseries::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A problem found while calculating a year that did not stop the calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CarbonDiagnostic {
    /// Outflows exceeded the stock of a pool and were scaled down to the available stock
    NegativeStock {
        period: usize,
        year: Year,
        box_type: BoxType,
        requested: FloatValue,
        available: FloatValue,
    },
    /// The total carbon across all pools changed during a year
    ConservationViolation {
        period: usize,
        year: Year,
        before: FloatValue,
        after: FloatValue,
    },
}

impl fmt::Display for CarbonDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarbonDiagnostic::NegativeStock {
                period,
                year,
                box_type,
                requested,
                available,
            } => write!(
                f,
                "period {} year {}: outflows of {} from {} exceed its stock of {}",
                period, year, requested, box_type, available
            ),
            CarbonDiagnostic::ConservationViolation {
                period,
                year,
                before,
                after,
            } => write!(
                f,
                "period {} year {}: total carbon changed from {} to {}",
                period, year, before, after
            ),
        }
    }
}

/// Carbon results of one leaf for one model period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCarbonReport {
    /// Name of the land leaf
    pub category: String,
    pub conceptual_root: ConceptualRootKey,
    pub period: usize,
    /// Calendar year of the period
    pub year: Year,
    /// Stock of every pool at the end of the period year
    pub stocks: BTreeMap<BoxType, FloatValue>,
    /// Net flow into every pool by flow type, summed over the years of the period
    pub flows: BTreeMap<BoxType, BTreeMap<FlowType, FloatValue>>,
    /// Net flow into the atmosphere summed over the years of the period
    pub net_emissions: FloatValue,
    pub diagnostics: Vec<CarbonDiagnostic>,
}

impl PeriodCarbonReport {
    pub fn new(
        category: impl Into<String>,
        conceptual_root: ConceptualRootKey,
        period: usize,
        year: Year,
    ) -> Self {
        Self {
            category: category.into(),
            conceptual_root,
            period,
            year,
            stocks: BTreeMap::new(),
            flows: BTreeMap::new(),
            net_emissions: 0.0,
            diagnostics: Vec::new(),
        }
    }

    /// Reported stock, summing pools for [`BoxType::AnyBox`]
    pub fn stock(&self, box_type: BoxType) -> FloatValue {
        self.stocks
            .iter()
            .filter(|(pool, _)| box_type.matches(**pool))
            .map(|(_, stock)| stock)
            .sum()
    }

    /// Reported net flow, summing matching pools and flow types for wildcards
    pub fn net_flow(&self, box_type: BoxType, flow: FlowType) -> FloatValue {
        self.flows
            .iter()
            .filter(|(pool, _)| box_type.matches(**pool))
            .flat_map(|(_, flows)| flows.iter())
            .filter(|(recorded, _)| flow.matches(**recorded))
            .map(|(_, value)| value)
            .sum()
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Aggregated results of every leaf under one conceptual root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub key: ConceptualRootKey,
    pub name: String,
    /// Number of leaves that contributed
    pub leaves: usize,
    pub stocks: BTreeMap<BoxType, FloatValue>,
    pub net_emissions: FloatValue,
    /// Net flow into the atmosphere from land-use change
    pub luc_emissions: FloatValue,
    pub diagnostics: usize,
}

impl SummaryEntry {
    pub fn total_stock(&self) -> FloatValue {
        self.stocks
            .iter()
            .filter(|(pool, _)| BoxType::AnyBox.matches(**pool))
            .map(|(_, stock)| stock)
            .sum()
    }
}

/// Carbon results of a region for one period, by conceptual root.
///
/// Entries are indexed by [`ConceptualRootKey::index`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonSummary {
    pub region: String,
    pub period: usize,
    pub year: Year,
    pub entries: Vec<SummaryEntry>,
}

impl CarbonSummary {
    /// An empty summary with one entry per conceptual root of `tree`
    pub fn new(region: impl Into<String>, tree: &LandTree, period: usize, year: Year) -> Self {
        let entries = (0..tree.num_conceptual_roots())
            .map(|index| {
                let key = ConceptualRootKey::new(index);
                SummaryEntry {
                    key,
                    name: tree.conceptual_root_name(key).unwrap_or_default().to_string(),
                    leaves: 0,
                    stocks: BTreeMap::new(),
                    net_emissions: 0.0,
                    luc_emissions: 0.0,
                    diagnostics: 0,
                }
            })
            .collect();
        Self {
            region: region.into(),
            period,
            year,
            entries,
        }
    }

    /// Accumulate a leaf report into the entry of its conceptual root.
    ///
    /// Reports with a key unknown to the summary are ignored and `false` returned.
    pub fn add(&mut self, report: &PeriodCarbonReport) -> bool {
        let Some(entry) = self.entries.get_mut(report.conceptual_root.index()) else {
            return false;
        };
        entry.leaves += 1;
        for (pool, stock) in &report.stocks {
            *entry.stocks.entry(*pool).or_default() += stock;
        }
        entry.net_emissions += report.net_emissions;
        entry.luc_emissions += report.net_flow(BoxType::Atmosphere, FlowType::LucFlow);
        entry.diagnostics += report.diagnostics.len();
        true
    }

    pub fn entry(&self, key: ConceptualRootKey) -> Option<&SummaryEntry> {
        self.entries.get(key.index())
    }

    pub fn total_net_emissions(&self) -> FloatValue {
        self.entries.iter().map(|e| e.net_emissions).sum()
    }

    pub fn total_stock(&self, box_type: BoxType) -> FloatValue {
        self.entries
            .iter()
            .flat_map(|e| e.stocks.iter())
            .filter(|(pool, _)| box_type.matches(**pool))
            .map(|(_, stock)| stock)
            .sum()
    }
}
