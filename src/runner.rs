//! Running a scenario over every model period

use landcarbon_components::allocator::LeafFailure;
use landcarbon_components::config::ScenarioConfig;
use landcarbon_components::report::CarbonSummary;
use landcarbon_core::errors::CarbonResult;
use serde::Serialize;
use std::fmt::Write;
use tracing::{debug, info};

/// Results of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub region: String,
    /// One summary per model period
    pub summaries: Vec<CarbonSummary>,
    /// Leaves that could not be loaded, initialised or calculated
    pub failures: Vec<LeafFailure>,
}

/// Load, initialise and calculate every period of a scenario.
///
/// Leaf failures are collected in the output rather than stopping the run.
pub fn run_scenario(config: &ScenarioConfig) -> CarbonResult<RunOutput> {
    let load = config.build()?;
    let mut allocator = load.allocator;
    let mut failures = load.failures;
    failures.extend(allocator.complete_init()?);

    let mut summaries = Vec::with_capacity(allocator.modeltime().num_periods());
    for period in 0..allocator.modeltime().num_periods() {
        let results = allocator.calc_carbon(period)?;
        debug!(
            period,
            reports = results.reports.len(),
            failures = results.failures.len(),
            "Calculated period"
        );
        let year = allocator.modeltime().period_to_year(period);
        let mut summary = CarbonSummary::new(allocator.region(), allocator.tree(), period, year);
        for report in &results.reports {
            summary.add(report);
        }
        failures.extend(results.failures);
        summaries.push(summary);
    }
    info!(
        region = %config.region,
        periods = summaries.len(),
        failures = failures.len(),
        "Finished run"
    );

    Ok(RunOutput {
        region: config.region.clone(),
        summaries,
        failures,
    })
}

/// Load and initialise a scenario without calculating anything.
///
/// Returns every leaf that would not take part in a run.
pub fn validate_scenario(config: &ScenarioConfig) -> CarbonResult<Vec<LeafFailure>> {
    let load = config.build()?;
    let mut allocator = load.allocator;
    let mut failures = load.failures;
    failures.extend(allocator.complete_init()?);
    Ok(failures)
}

/// Plain text table of the summaries, one row per period and conceptual root
pub fn format_table(output: &RunOutput) -> String {
    let mut table = String::new();
    let _ = writeln!(
        table,
        "{:>6} {:>6}  {:<20} {:>6} {:>14} {:>14} {:>14}",
        "period", "year", "category", "leaves", "land stock", "emissions", "luc emissions"
    );
    for summary in &output.summaries {
        for entry in summary.entries.iter().filter(|e| e.leaves > 0) {
            let _ = writeln!(
                table,
                "{:>6} {:>6}  {:<20} {:>6} {:>14.4} {:>14.4} {:>14.4}",
                summary.period,
                summary.year,
                entry.name,
                entry.leaves,
                entry.total_stock(),
                entry.net_emissions,
                entry.luc_emissions
            );
        }
    }
    for failure in &output.failures {
        let _ = writeln!(table, "failed: {}: {}", failure.leaf, failure.error);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
region = "USA"

[modeltime]
years = [1975, 2005]

[[nodes]]
name = "Forest"
conceptual_root = true

[[leaves]]
name = "Hardwood"
parent = "Forest"
land_allocation = [2.0, 1.0]

[[leaves]]
name = "Tundra"
land_allocation = [1.0]

[leaves.carbon]
type = "no-emissions"
densities = { permafrost = 1.0 }
"#;

    #[test]
    fn runs_every_period() {
        let config = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        let output = run_scenario(&config).unwrap();

        assert_eq!(output.summaries.len(), 2);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].leaf, "Tundra");
        assert!(output.summaries[1].entries[1].luc_emissions > 0.0);

        let table = format_table(&output);
        assert!(table.contains("Forest"));
        assert!(table.contains("failed: Tundra"));

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["summaries"][1]["year"], 2005);
    }

    #[test]
    fn validate_reports_failures() {
        let config = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        let failures = validate_scenario(&config).unwrap();
        assert_eq!(failures.len(), 1);
    }
}
