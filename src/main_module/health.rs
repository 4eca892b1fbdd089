//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use log::warn;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::learn::store::LearnStore;

pub const SERVICE_NAME: &str = "coursehub";

pub async fn health_check<S: LearnStore>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = match state.learn.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check could not reach storage: {e}");
            false
        }
    };

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok
        })),
    )
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
