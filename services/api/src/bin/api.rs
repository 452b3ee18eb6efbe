//! services/api/src/bin/api.rs

use attendance_api::{
    adapters::PgDocumentStore,
    config::{Config, StoreBackend},
    error::ApiError,
    web::{router, state::AppState},
};
use attendance_core::{DocumentStore, MemoryDocumentStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect_store(config: &Config) -> Result<Arc<dyn DocumentStore>, ApiError> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory document store; attendance is lost on restart.");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await?;
            let store = PgDocumentStore::new(db_pool);
            info!("Running database migrations...");
            store.run_migrations().await?;
            info!("Database migrations complete.");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect the Document Store ---
    let store = connect_store(&config).await?;

    // --- 3. Finish Writes Interrupted by a Previous Crash ---
    let app_state = Arc::new(AppState::new(store, config.clone()));
    match app_state.attendance.replay_pending_jobs().await {
        Ok(0) => {}
        Ok(n) => info!("Replayed {} pending summary jobs.", n),
        Err(e) => warn!("Pending summary jobs could not be replayed at startup: {}", e),
    }

    // --- 4. Create the Web Router ---
    let app = router(app_state)?;

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
