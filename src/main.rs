use anyhow::Context;
use dotenvy::dotenv;
use log::{info, warn};
use std::sync::Arc;

use coursehub::core::config::{AppConfig, StorageBackend};
use coursehub::core::shared::state::AppState;
use coursehub::core::shared::utils::{create_conn, run_migrations};
use coursehub::learn::store::{InMemoryLearnStore, LearnStore, PgLearnStore};
use coursehub::learn::LearnPlatform;
use coursehub::main_module::run_axum_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        "Starting coursehub {} with {:?} storage",
        env!("CARGO_PKG_VERSION"),
        config.storage.backend
    );

    match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = create_conn(&config.database)?;
            if config.database.run_migrations {
                run_migrations(&pool)?;
            }
            serve(Arc::new(PgLearnStore::new(pool)), config).await
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data will not survive a restart");
            serve(Arc::new(InMemoryLearnStore::new()), config).await
        }
    }
}

async fn serve<S: LearnStore>(store: Arc<S>, config: AppConfig) -> anyhow::Result<()> {
    let learn = LearnPlatform::new(store, &config);
    let state = Arc::new(AppState::new(config, learn));
    run_axum_server(state).await.context("HTTP server failed")?;
    Ok(())
}
