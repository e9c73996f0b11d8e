//! Health and version endpoints.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
}

pub(super) async fn health() -> impl IntoResponse {
    Json(HealthData { status: "ok" })
}

pub(super) async fn version(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.version.as_ref().clone())
}
