//! Runner configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};

/// Default per-request timeout when neither the service nor the host
/// overrides it (10 seconds).
pub const DEFAULT_SERVICE_MAX_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default body written when a service times out. `{seconds}` is replaced
/// with the elapsed limit.
pub const DEFAULT_TIMEOUT_MESSAGE: &str =
    "Service exceeded maximum execution time of {seconds} seconds and was terminated\n";

/// Handler-wide runner settings. Per-service `config` overrides and
/// per-request `customTimeout` values refine these.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Default per-request timeout (`SERVICE_MAX_TIMEOUT`).
    pub service_max_timeout: Duration,
    /// Directory holding the executor binaries.
    pub binaries_root: PathBuf,
    /// Upper bound on total argv bytes handed to an executor.
    pub argv_limit: usize,
    /// Default environment map injected into the envelope's `env`.
    pub env: Map<String, Value>,
    /// Client-visible message templates.
    pub messages: Messages,
}

impl Default for RunnerConfig {
    fn default() -> RunnerConfig {
        RunnerConfig {
            service_max_timeout: DEFAULT_SERVICE_MAX_TIMEOUT,
            binaries_root: PathBuf::from("bin/binaries"),
            argv_limit: default_argv_limit(),
            env: Map::new(),
            messages: Messages::default(),
        }
    }
}

/// Message templates for bodies the coordinator writes itself.
#[derive(Debug, Clone)]
pub struct Messages {
    /// Timeout body template; `{seconds}` is substituted.
    pub service_execution_timeout: String,
}

impl Default for Messages {
    fn default() -> Messages {
        Messages {
            service_execution_timeout: DEFAULT_TIMEOUT_MESSAGE.to_string(),
        }
    }
}

impl Messages {
    /// Render the timeout body for the given limit in seconds.
    pub fn timeout_body(&self, seconds: f64) -> String {
        let rendered = if seconds.fract() == 0.0 {
            format!("{}", seconds as u64)
        } else {
            format!("{seconds}")
        };
        self.service_execution_timeout
            .replace("{seconds}", &rendered)
    }
}

/// Platform argv limit: `sysconf(_SC_ARG_MAX)` where available, with a 2 MiB
/// fallback.
pub fn default_argv_limit() -> usize {
    #[cfg(unix)]
    {
        let limit = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
        if limit > 0 {
            return limit as usize;
        }
    }
    2 * 1024 * 1024
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
