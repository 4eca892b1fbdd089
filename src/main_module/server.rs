//! HTTP server initialization and routing

use axum::{routing::get, Router};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::learn::configure_learn_routes;
use crate::learn::store::LearnStore;

use super::{health_check, health_check_simple, shutdown_signal, ExpirySweeper};

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}

pub fn build_router<S: LearnStore>(app_state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(health_check::<S>))
        .route("/healthz", get(health_check_simple))
        .route("/api/health", get(health_check::<S>))
        .merge(configure_learn_routes::<S>())
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_axum_server<S: LearnStore>(app_state: Arc<AppState<S>>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();

    let sweeper_handle = ExpirySweeper::start(
        app_state.learn.enrollments.clone(),
        app_state.config.learn.expiry_sweep_interval_secs,
    );

    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other);

    if let Some(handle) = sweeper_handle {
        handle.abort();
    }
    info!("Server stopped");
    served
}
