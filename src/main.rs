//! Command line interface for running land carbon scenarios.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Land carbon box-flow accounting
#[derive(Parser)]
#[command(name = "landcarbon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Land carbon box-flow accounting for integrated assessment models", long_about = None)]
struct Cli {
    /// Log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run every period of a scenario and print the summaries
    Run(commands::run::RunArgs),
    /// Load and initialise a scenario without running it
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
