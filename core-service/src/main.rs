//! sheet-syncd - keeps SQLite tables in step with a SharePoint workbook

use anyhow::{bail, Context, Result};
use clap::Parser;
use core_runtime::config::load_env_file;
use core_runtime::logging::redact_if_sensitive;
use core_runtime::{init_logging, LogFormat, LoggingConfig, SyncServiceConfig};
use core_service::SyncService;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Incremental spreadsheet-to-SQLite sync daemon
#[derive(Parser, Debug)]
#[command(name = "sheet-syncd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Load environment variables from this file (default: ./.env if present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Log output format: pretty, json or compact
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log filter directives, e.g. "core_sync=debug,sqlx=warn"
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_file = load_env_file(cli.env_file.as_deref())?;

    let mut logging = LoggingConfig::default();
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    if let Some(filter) = cli.log_filter {
        logging = logging.with_filter(filter);
    }
    init_logging(logging)?;

    if let Some(path) = env_file {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = SyncServiceConfig::from_env().context("Invalid configuration")?;
    info!(
        tenant_id = %config.credentials.tenant_id,
        client_id = %config.credentials.client_id,
        client_secret = %redact_if_sensitive("client_secret", &config.credentials.client_secret),
        site = %format!("{}/sites/{}", config.source.site_domain, config.source.site_name),
        file = %config.source.file_name,
        database = %config.database_path.display(),
        interval_secs = config.interval.as_secs(),
        "Loaded configuration"
    );

    let service = SyncService::bootstrap(config)
        .await
        .context("Failed to start sync service")?;

    if cli.once {
        let report = service.run_once().await.context("Sync pass failed")?;
        if report.has_failures() {
            bail!("{} sheet(s) failed to sync", report.failed());
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    service.run(cancel).await;
    Ok(())
}
