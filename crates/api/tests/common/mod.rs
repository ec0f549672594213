// All functions in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the item level.
#![allow(dead_code)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use runlet_api::config::ServerConfig;
use runlet_api::router::build_app_router;
use runlet_api::state::AppState;
use runlet_core::runner::ServiceHandler;
use runlet_core::service::ServiceSpec;

/// Build a test `ServerConfig` with safe defaults and the given executor
/// binaries directory.
pub fn test_config(binaries_root: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        service_max_timeout_ms: 10_000,
        binaries_root,
        argv_limit: None,
        timeout_message: runlet_core::config::DEFAULT_TIMEOUT_MESSAGE.to_string(),
        service_env: serde_json::Map::new(),
    }
}

/// Build a service spec for the given language and code.
pub fn service_spec(language: &str, code: &str) -> ServiceSpec {
    ServiceSpec {
        code: Some(code.to_string()),
        language: Some(language.to_string()),
        ..ServiceSpec::default()
    }
}

/// Build the full application router around a freshly-constructed handler.
///
/// Delegates to [`build_app_router`] so integration tests exercise the same
/// middleware stack (CORS, request ID, timeout, tracing, panic recovery)
/// that production uses.
pub fn build_test_app(spec: ServiceSpec, binaries_root: PathBuf) -> Router {
    let config = test_config(binaries_root.clone());
    let handler = ServiceHandler::new(spec, config.runner_config()).expect("build handler");
    build_test_app_with_handler(handler, config)
}

/// Build the test app around a pre-configured handler (custom transpilers,
/// caches).
pub fn build_test_app_with_handler(handler: ServiceHandler, config: ServerConfig) -> Router {
    let state = AppState {
        handler: Arc::new(handler),
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// Write an executable script into `dir` under `name`.
pub fn write_executor(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create executor");
    writeln!(file, "#!/bin/bash").expect("write shebang");
    write!(file, "{body}").expect("write body");
    drop(file);
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

/// Install a `bash` executor that hands the code argument (`$2`) to the real
/// shell, passing the envelope JSON (`$4`) along as `$1`.
pub fn install_bash_executor(dir: &Path) {
    write_executor(dir, "bash", "exec /bin/bash -c \"$2\" bash \"$4\"\n");
}

/// Install a stub `javascript` executor (shared by the node family) that
/// prints the code argument it was handed.
pub fn install_code_echo_javascript_executor(dir: &Path) {
    write_executor(dir, "javascript", "printf '%s' \"$2\"\n");
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `String`.
pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// GET the given URI and return the response.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// GET the given URI with an extra header.
pub async fn get_with_header(
    app: Router,
    uri: &str,
    name: &str,
    value: &str,
) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(name, value)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a raw body to the given URI and return the response.
pub async fn post_body(app: Router, uri: &str, body: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Assert the response is 200 OK, with context on failure.
pub fn assert_ok(response: &axum::response::Response) {
    assert_eq!(response.status(), StatusCode::OK);
}
