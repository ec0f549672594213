//! Per-invocation lifecycle flags.

/// Observable state of one invocation. Every field starts false and
/// transitions to true at most once; the coordinator's guards read these
/// bits to decide which event may terminate the response.
#[derive(Debug, Default, Clone)]
pub struct Status {
    /// The response outcome has been decided; no further body bytes.
    pub ended: bool,
    /// The child exited non-zero or on a signal; stdout still drains.
    pub erroring: bool,
    /// A stderr-driven registry install is in flight; completion is
    /// deferred. Only stderr handlers set or clear this.
    pub checking_registry: bool,
    /// Child stdout reached EOF.
    pub stdout_ended: bool,
    /// `end_response` has run.
    pub service_ended: bool,
    /// The child process exited.
    pub vm_closed: bool,
    /// The child failed to start, exited non-zero, or died on a signal.
    pub vm_error: bool,
    /// A write to child stdin failed. Recorded, never terminal.
    pub stdin_error: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_flags_start_false() {
        let status = Status::default();
        assert!(!status.ended);
        assert!(!status.erroring);
        assert!(!status.checking_registry);
        assert!(!status.stdout_ended);
        assert!(!status.service_ended);
        assert!(!status.vm_closed);
        assert!(!status.vm_error);
        assert!(!status.stdin_error);
    }
}
