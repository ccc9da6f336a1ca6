//! Sync service façade and bootstrap.
//!
//! This crate wires the concrete collaborators into the sync engine: the
//! `reqwest` HTTP client, the client-credentials token provider, the Graph
//! workbook connector and the SQLite sink. The `sheet-syncd` binary is a thin
//! CLI over [`SyncService`].

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::SyncServiceConfig;
pub use core_sync::{PassReport, SheetOutcome};

use bridge_desktop::ReqwestHttpClient;
use bridge_traits::http::HttpClient;
use bridge_traits::source::{DocumentRef, DocumentSource};
use bridge_traits::time::SystemClock;
use core_auth::{ClientCredentialsConfig, ClientCredentialsProvider};
use core_library::{create_pool, DatabaseConfig, SinkWriter, SqliteSinkWriter};
use core_sync::{CheckpointStore, SnapshotStore, SyncOrchestrator, SyncScheduler};
use provider_sharepoint::{GraphSiteConfig, GraphWorkbookConnector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A configured sync engine, ready to run passes.
pub struct SyncService {
    config: SyncServiceConfig,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: SyncScheduler,
}

impl SyncService {
    /// Build the production service from configuration.
    ///
    /// Opens (and creates, if needed) the sink database. No request is made to
    /// the document store until the first pass.
    pub async fn bootstrap(config: SyncServiceConfig) -> Result<Self> {
        config.validate()?;

        let http_client: Arc<dyn HttpClient> = Arc::new(
            ReqwestHttpClient::new()
                .map_err(|e| CoreError::InitializationFailed(e.to_string()))?,
        );

        let credentials = &config.credentials;
        let token_provider = Arc::new(ClientCredentialsProvider::new(
            ClientCredentialsConfig::new(
                config.source.authority.clone(),
                credentials.tenant_id.clone(),
                credentials.client_id.clone(),
                credentials.client_secret.clone(),
            ),
            http_client.clone(),
            Arc::new(SystemClock),
        )?);

        let connector = GraphWorkbookConnector::new(
            http_client,
            token_provider,
            GraphSiteConfig {
                graph_api_base: config.source.graph_api_base.clone(),
                site_domain: config.source.site_domain.clone(),
                site_name: config.source.site_name.clone(),
            },
        );

        if let Some(parent) = config
            .database_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;

        Ok(Self::from_parts(
            config,
            Arc::new(connector),
            Arc::new(SqliteSinkWriter::new(pool)),
        ))
    }

    /// Assemble the service around explicit source and sink implementations.
    pub fn from_parts(
        config: SyncServiceConfig,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn SinkWriter>,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            source,
            sink,
            DocumentRef::new(config.source.folder.clone(), config.source.file_name.clone()),
            config.sheets.clone(),
            SnapshotStore::open(config.snapshot_path()),
            CheckpointStore::open(config.checkpoint_path()),
        ));
        let scheduler =
            SyncScheduler::new(orchestrator.clone(), config.interval, config.pass_timeout);

        info!(
            file = %orchestrator.document().path(),
            sheets = config.sheets.len(),
            state_dir = %config.state_dir.display(),
            "Sync service ready"
        );

        Self {
            config,
            orchestrator,
            scheduler,
        }
    }

    pub fn config(&self) -> &SyncServiceConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Run a single pass, bounded by the configured pass timeout.
    pub async fn run_once(&self) -> Result<PassReport> {
        Ok(self.scheduler.run_once().await?)
    }

    /// Run scheduled passes until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        self.scheduler.run(cancel).await
    }
}
