pub mod api;
pub mod archive; // Soft-delete, restore, purge and audit trail
pub mod config;
pub mod db;
pub mod models;
pub mod patients; // Registration and edits
pub mod search; // Filtered search and dashboard reads

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::archive::{DocumentStorage, LocalDocumentStorage, NoopDocumentStorage};
use crate::config::AppConfig;
use crate::db::sqlite_store::SqliteRecordStore;

/// Initialise logging, open the store and serve the API until Ctrl-C.
pub async fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env().map_err(|e| e.to_string())?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Cannot create data directory {}: {e}", parent.display()))?;
    }
    let store = SqliteRecordStore::open(&config.db_path).map_err(|e| e.to_string())?;
    tracing::info!(db_path = %config.db_path.display(), "Record store opened");

    let documents: Arc<dyn DocumentStorage> = match &config.documents_dir {
        Some(root) => Arc::new(LocalDocumentStorage::new(root)),
        None => {
            tracing::warn!("No documents directory configured; purge will not remove files");
            Arc::new(NoopDocumentStorage)
        }
    };

    let ctx = api::ApiContext::new(Arc::new(store), config.cascade_mode, documents);
    let mut server = api::start_api_server(ctx, config.bind_addr).await?;
    tracing::info!(addr = %server.info.server_addr, "Listening");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {e}"))?;
    server.shutdown();
    Ok(())
}
