//! Statsync Ingest - land the statistics API in the warehouse

use anyhow::Result;
use clap::Parser;
use statsync_common::logging::{init_logging, LogConfig, LogLevel};
use statsync_ingest::{
    config::IngestConfig,
    driver::{EndpointOutcome, RunDriver},
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "statsync-ingest")]
#[command(author, version, about = "Scheduled batch ingestion of sports statistics")]
struct Cli {
    /// Only run the named endpoint (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,

    /// Log the configured endpoints and exit
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("statsync-ingest")
        .filter_directives("aws_smithy_runtime=warn,aws_config=warn,hyper_util=info")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env()?.restrict_to(&cli.only)?;

    if cli.list {
        for endpoint in &config.endpoints {
            info!(
                name = %endpoint.name,
                path = %endpoint.path,
                table = %endpoint.table_id,
                normalize_keys = endpoint.normalize_keys,
                "Configured endpoint"
            );
        }
        return Ok(());
    }

    info!(
        source = %config.source.base_url,
        dataset = %config.warehouse.dataset_id,
        endpoints = config.endpoints.len(),
        "Starting ingestion run"
    );

    let driver = RunDriver::from_config(Arc::new(config)).await?;
    let summary = driver.run().await;

    for report in &summary.reports {
        match &report.outcome {
            EndpointOutcome::Loaded { rows, locator } => {
                info!(endpoint = %report.name, table = %report.table_id, rows, %locator, "Loaded")
            },
            EndpointOutcome::Empty => {
                warn!(endpoint = %report.name, "No data found from API")
            },
            EndpointOutcome::Failed {
                step,
                kind,
                message,
            } => {
                warn!(endpoint = %report.name, %step, %kind, %message, "Failed")
            },
        }
    }

    Ok(())
}
