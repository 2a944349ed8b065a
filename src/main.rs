//! CLI for airwatch: collect air-quality and grid carbon-intensity readings.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use airwatch::settings::{PipelineConfig, Secrets};

#[derive(Parser)]
#[command(name = "airwatch")]
#[command(about = "Air-quality and carbon-intensity ingestion pipeline")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll both sources for a fixed duration, then export
    Collect {
        /// Total collection time in seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Re-send the most recent stored readings to the upload endpoint
    Upload {
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Rebuild the feature CSV from stored readings
    Features {
        #[arg(long, default_value = "500")]
        limit: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    airwatch::init_logging();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load(&cli.config)?;
    let secrets = Secrets::from_env();

    match cli.command {
        Commands::Collect { duration, interval } => {
            if let Some(duration) = duration {
                config.collection.total_collection_time_secs = duration;
            }
            if let Some(interval) = interval {
                config.collection.request_interval_secs = interval;
            }
            config.validate()?;

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, finishing current run");
                    trigger.cancel();
                }
            });

            let report = airwatch::run_collect(&config, &secrets, cancel).await?;
            println!(
                "run {}: {} record(s) over {} cycle(s){}",
                report.run_id,
                report.outcome.records.len(),
                report.outcome.cycles,
                if report.outcome.cancelled { " (interrupted)" } else { "" }
            );
            if let Some(path) = &report.features_path {
                println!("features: {}", path.display());
            }
            if let Some(path) = &report.readings_path {
                println!("readings: {}", path.display());
            }
            println!("summary:  {}", report.summary_path.display());
        }
        Commands::Upload { limit } => {
            let sent = airwatch::run_upload(&config, &secrets, limit).await?;
            println!("uploaded {sent} reading(s)");
        }
        Commands::Features { limit } => match airwatch::run_features(&config, limit).await? {
            Some(path) => println!("features: {}", path.display()),
            None => println!("no stored readings"),
        },
    }

    Ok(())
}
