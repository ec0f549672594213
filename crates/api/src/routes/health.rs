use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Liveness payload: which runner build is serving and what language the
/// configured service runs as.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    language: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        language: state.handler.service().language.as_str(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(health_check))
}
