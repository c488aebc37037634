use anyhow::{bail, Context, Result};
use clap::Args;
use landcarbon::config::ScenarioConfig;
use landcarbon::runner::validate_scenario;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ValidateArgs {
    /// Scenario file
    pub scenario: PathBuf,

    /// Fail if any leaf would be left out of a run
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = ScenarioConfig::from_file(&args.scenario)
        .with_context(|| format!("Could not load {}", args.scenario.display()))?;
    let failures = validate_scenario(&config).context("Scenario is invalid")?;

    for failure in &failures {
        println!("{}: {}", failure.leaf, failure.error);
    }
    if args.strict && !failures.is_empty() {
        bail!("{} land leaves are invalid", failures.len());
    }
    info!(region = %config.region, leaves = config.leaves.len(), "Scenario is valid");
    println!("{}: ok", args.scenario.display());
    Ok(())
}
