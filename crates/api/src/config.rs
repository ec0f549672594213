use std::path::PathBuf;
use std::time::Duration;

use runlet_core::config::{RunnerConfig, DEFAULT_TIMEOUT_MESSAGE};
use serde_json::{Map, Value};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// Outer HTTP request timeout in seconds (default: `300`). Must exceed
    /// the service timeout, which governs executor runtime.
    pub request_timeout_secs: u64,
    /// Default per-service execution timeout in milliseconds.
    pub service_max_timeout_ms: u64,
    /// Directory holding the executor binaries.
    pub binaries_root: PathBuf,
    /// Optional override for the argv byte limit; the platform `ARG_MAX`
    /// applies when unset.
    pub argv_limit: Option<usize>,
    /// Timeout body template; `{seconds}` is substituted.
    pub timeout_message: String,
    /// Default environment map injected into every envelope's `env`.
    pub service_env: Map<String, Value>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `3000`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `300`                   |
    /// | `SERVICE_MAX_TIMEOUT`    | `10000` (ms)            |
    /// | `BINARIES_ROOT`          | `bin/binaries`          |
    /// | `ARGV_LIMIT`             | platform `ARG_MAX`      |
    /// | `SERVICE_TIMEOUT_MESSAGE`| built-in template       |
    /// | `SERVICE_ENV`            | `{}` (JSON object)      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let service_max_timeout_ms: u64 = std::env::var("SERVICE_MAX_TIMEOUT")
            .unwrap_or_else(|_| "10000".into())
            .parse()
            .expect("SERVICE_MAX_TIMEOUT must be a valid u64 in milliseconds");

        let binaries_root =
            PathBuf::from(std::env::var("BINARIES_ROOT").unwrap_or_else(|_| "bin/binaries".into()));

        let argv_limit = std::env::var("ARGV_LIMIT")
            .ok()
            .map(|raw| raw.parse().expect("ARGV_LIMIT must be a valid usize"));

        let timeout_message = std::env::var("SERVICE_TIMEOUT_MESSAGE")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_MESSAGE.into());

        let service_env: Map<String, Value> = std::env::var("SERVICE_ENV")
            .ok()
            .map(|raw| serde_json::from_str(&raw).expect("SERVICE_ENV must be a JSON object"))
            .unwrap_or_default();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            service_max_timeout_ms,
            binaries_root,
            argv_limit,
            timeout_message,
            service_env,
        }
    }

    /// Build the core runner configuration from server settings.
    pub fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.service_max_timeout = Duration::from_millis(self.service_max_timeout_ms);
        config.binaries_root = self.binaries_root.clone();
        if let Some(limit) = self.argv_limit {
            config.argv_limit = limit;
        }
        config.messages.service_execution_timeout = self.timeout_message.clone();
        config.env = self.service_env.clone();
        config
    }
}
