use axum::routing::any;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Every method and every path funnels into the service middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", any(handlers::run::run_service))
        .route("/{*path}", any(handlers::run::run_service))
}
