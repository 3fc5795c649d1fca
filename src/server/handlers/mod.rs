//! HTTP 处理器

pub mod agent;
pub mod auth;
pub mod chat;

use crate::server::AppState;
use axum::{extract::State, Json};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "role": state.config.server.role,
        "agent": state.invoker.name(),
    }))
}
