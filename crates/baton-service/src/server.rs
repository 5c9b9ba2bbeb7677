//! Server setup and lifecycle management
//!
//! Wires the catalog, the instance store, and the engine together,
//! then serves the REST API until a shutdown signal arrives.

use std::sync::Arc;

use tokio::net::TcpListener;

use baton_catalog::WorkflowCatalog;
use baton_engine::WorkflowEngine;
use baton_store::{InMemoryStore, InstanceStore};

use crate::api::create_router;
use crate::api::rest::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};

/// The workflow daemon server.
pub struct Server {
    config: DaemonConfig,
    engine: Arc<WorkflowEngine>,
}

impl Server {
    /// Loads the catalog, connects storage, and assembles the engine.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let catalog = Arc::new(WorkflowCatalog::load(&config.catalog.path)?);
        for diagnostic in catalog.validate()? {
            tracing::warn!(%diagnostic, "Catalog diagnostic");
        }
        let workflows = catalog.count()?;
        tracing::info!(workflows, path = %config.catalog.path, "Loaded workflow catalog");

        let store = build_store(&config.storage).await?;
        let engine = Arc::new(WorkflowEngine::new(catalog, store));

        Ok(Self { config, engine })
    }

    /// Serves the REST API until SIGINT or SIGTERM.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let state = AppState::new(self.engine.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "batond listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("batond stopped");
        Ok(())
    }
}

async fn build_store(config: &StorageConfig) -> DaemonResult<Arc<dyn InstanceStore>> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory instance store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            tracing::info!(max_connections, "Connecting to PostgreSQL instance store");
            let store =
                baton_store::PostgresStore::new(url, *max_connections, *connect_timeout_secs)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "postgres storage configured but batond was built without the 'postgres' feature"
                .to_string(),
        )),
    }
}

/// Completes when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
