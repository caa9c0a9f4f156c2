//! `change-ctl` — run scripted change-control scenarios.
//!
//! # Usage
//!
//! ```bash
//! change-ctl simulate demos/scenarios/throughput_ramp.toml
//! change-ctl simulate demos/scenarios/upgrade_roi.toml --json
//! CHANGE_REQUIRED_CYCLES=5 change-ctl config --config change.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use change_ctl::{config, scenario};

#[derive(Parser, Debug)]
#[command(name = "change-ctl", about = "Supervised upgrades and dimension ramps", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario against simulated collaborators
    Simulate {
        /// Scenario TOML file
        scenario: PathBuf,
        /// Controller configuration TOML (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the full report as JSON instead of a step log
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate {
            scenario: path,
            config: config_path,
            json,
        } => {
            let config = config::load(config_path.as_deref())?;
            let scenario = scenario::Scenario::load(&path)?;
            let report = scenario::run(scenario, config).await?;
            info!(
                scenario = %report.name,
                refused = report.failed_steps().count(),
                "Scenario finished"
            );

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("serializing report")?
                );
            } else {
                for step in &report.steps {
                    let mark = if step.ok { "ok " } else { "ERR" };
                    println!("[{}] {:>2} {:<18} {}", mark, step.index, step.action, step.detail);
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report.summary).context("serializing summary")?
                );
            }
        }
        Command::Config {
            config: config_path,
        } => {
            let config = config::load(config_path.as_deref())?;
            println!(
                "{}",
                toml::to_string_pretty(&config).context("serializing config")?
            );
        }
    }
    Ok(())
}
