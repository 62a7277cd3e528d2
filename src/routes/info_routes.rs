use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use serde::Serialize;
use tracing::debug;

use crate::state::app_state::AppState;

pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info_check))
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok".to_owned(),
    })
}

pub async fn info_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("{} info requested", state.config.name);
    Json(state.config.as_ref().clone())
}
