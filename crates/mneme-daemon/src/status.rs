//! Handlers for the minimal localhost health/status/flush surface.

use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

pub async fn health(State(_state): State<Arc<AppState>>) -> &'static str {
    "healthy"
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<mneme_core::health::StatusReport>, StatusCode> {
    let scheduler = state.scheduler.lock().await;
    mneme_core::health::build_status_report(&state.storage, &state.config, &scheduler)
        .map(Json)
        .map_err(|e| {
            tracing::error!("status report failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn flush(State(state): State<Arc<AppState>>) -> StatusCode {
    match mneme_core::health::flush(&state.storage) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!("flush failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
