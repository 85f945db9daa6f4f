pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export logic types
pub use logic::{
    ConditionMatcher, ConfigOperations, EnvironmentOperations, EventEmitter, OverrideEvaluator,
    PermissionGate, ProjectOperations, ProposalWorkflow, SchemaValidator,
};

pub use error::{ConfigError, Result};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api::handlers::AppState;
use crate::config::{AppConfig, StorageBackend};

/// Build the store selected by the configuration and serve the API until shutdown
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    match config.storage.backend {
        StorageBackend::Memory => {
            log::warn!("using the in-memory store; data is lost on restart");
            serve(Arc::new(MemoryStore::new()), &config).await
        }
        StorageBackend::Postgres => {
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;
            store.migrate().await?;
            log::info!("database migrations applied");
            serve(Arc::new(store), &config).await
        }
    }
}

async fn serve<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<()> {
    let app = routes::create_router::<S>().with_state(AppState::new(store, config.workflow.clone()));

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("oat-config server running on http://{}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
