#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Invalid service configuration: {0}")]
    Configuration(String),

    #[error("Transpile failed: {0}")]
    Transpile(String),

    #[error("Argument list too large: {size} bytes exceeds limit of {limit}")]
    ArgvTooLarge { size: usize, limit: usize },

    #[error("Failed to spawn executor: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Convenience alias for runner results.
pub type RunnerResult<T> = Result<T, RunnerError>;
