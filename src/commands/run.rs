use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use landcarbon::config::ScenarioConfig;
use landcarbon::runner::{format_table, run_scenario};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args)]
pub struct RunArgs {
    /// Scenario file
    pub scenario: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let config = ScenarioConfig::from_file(&args.scenario)
        .with_context(|| format!("Could not load {}", args.scenario.display()))?;
    let output = run_scenario(&config).context("Scenario run failed")?;

    match args.format {
        OutputFormat::Table => print!("{}", format_table(&output)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}
