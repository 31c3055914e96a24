//! socflow CLI - run security alerts through the analysis workflow
//!
//! Provides a `socflow` command that submits alert files to the workflow
//! engine, analyses single stage inputs, and shows the effective configuration.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{analyze, config, run};

/// socflow - SOC alert triage and response workflows
///
/// Every alert goes through Triage, then Investigation and Decision unless it
/// is closed as noise, and finally Response when the decision calls for it.
#[derive(Parser, Debug)]
#[command(name = "socflow", author, version, about = "SOC alert workflow engine")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an alert file through the workflow engine
    ///
    /// Accepts a JSON array of alerts, `{"alerts": [...]}` or a single alert.
    /// Streams workflow events and prints metrics when every workflow is done.
    Run {
        /// Path to the alert JSON file
        alerts: PathBuf,

        /// Print events and metrics as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Analyse one stage input
    ///
    /// The stage is inferred from the variables unless given explicitly.
    Analyze {
        /// Path to a JSON object of stage variables
        variables: PathBuf,

        /// Stage to run (triage, investigation, decision, response)
        #[arg(long)]
        stage: Option<String>,
    },

    /// Print the effective configuration with secrets masked
    Config,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    let config_path = args.config.as_deref();
    match args.command {
        Command::Run { alerts, json } => run::execute(config_path, &alerts, json).await,
        Command::Analyze { variables, stage } => {
            analyze::execute(config_path, &variables, stage.as_deref()).await
        }
        Command::Config => config::execute(config_path),
    }
}
