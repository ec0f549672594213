use std::sync::Arc;

use runlet_core::runner::ServiceHandler;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable; the service handler is immutable after construction
/// and shared across concurrent requests.
#[derive(Clone)]
pub struct AppState {
    /// The service handler every request runs through.
    pub handler: Arc<ServiceHandler>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
