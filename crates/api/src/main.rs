use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runlet_api::config::ServerConfig;
use runlet_api::router::build_app_router;
use runlet_api::state::AppState;
use runlet_core::runner::ServiceHandler;
use runlet_core::service::ServiceSpec;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runlet_api=debug,runlet_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Service handler ---
    let spec = load_service_spec();
    let handler =
        ServiceHandler::new(spec, config.runner_config()).expect("Invalid service definition");
    tracing::info!(
        language = %handler.service().language,
        binaries_root = %handler.config().binaries_root.display(),
        "Service handler constructed"
    );

    // --- App state & router ---
    let state = AppState {
        handler: Arc::new(handler),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Load the service definition from the environment: `SERVICE_FILE` names a
/// JSON descriptor (legacy field aliases accepted), or `SERVICE_CODE` plus
/// `SERVICE_LANGUAGE` define it inline.
fn load_service_spec() -> ServiceSpec {
    if let Ok(path) = std::env::var("SERVICE_FILE") {
        let raw = std::fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("Failed to read SERVICE_FILE '{path}': {err}"));
        serde_json::from_str(&raw)
            .unwrap_or_else(|err| panic!("Invalid service descriptor in '{path}': {err}"))
    } else {
        ServiceSpec {
            code: std::env::var("SERVICE_CODE").ok(),
            language: std::env::var("SERVICE_LANGUAGE").ok(),
            ..ServiceSpec::default()
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
