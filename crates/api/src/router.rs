//! Application router assembly.
//!
//! One builder produces the router for both the binary entrypoint and the
//! integration tests, so a test request crosses the same layers a real one
//! does. The surface is small: a health probe plus the catch-all service
//! route that hands every other method and path to the runner.

use std::time::Duration;

use axum::http::{HeaderName, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

/// Header carrying the per-request id, which the trace span picks up so a
/// service invocation's log lines (including forwarded child stderr) can be
/// correlated with the request that spawned it.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application [`Router`].
///
/// Layer order matters here. The timeout sits outside the run handler and
/// must outlast `SERVICE_MAX_TIMEOUT`: the runner kills its own child and
/// writes a diagnostic on expiry, and a shorter outer timeout would replace
/// that body with a bare 408. Panic recovery wraps everything so a handler
/// bug cannot take the connection down without a response.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::run::router())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors_layer(config))
        .with_state(state)
}

/// CORS for the service route.
///
/// The run route accepts any verb and forwards arbitrary headers into the
/// child's envelope, so methods and headers mirror whatever the preflight
/// asks for rather than enumerating a fixed list. Origins stay an explicit
/// allowlist; a bad `CORS_ORIGINS` entry aborts startup.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut origins = Vec::with_capacity(config.cors_origins.len());
    for raw in &config.cors_origins {
        match raw.parse() {
            Ok(origin) => origins.push(origin),
            Err(err) => panic!("CORS_ORIGINS entry {raw:?} does not parse: {err}"),
        }
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(600))
}
