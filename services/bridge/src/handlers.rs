//! Axum handlers for the operational HTTP surface.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Liveness probe. Always answers `{"ok": true}` while the process is up.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}
