//! Process-tree termination.
//!
//! Executors for some languages fork further processes, so termination
//! signals the child's entire process group, not just the direct child.
//! The child was spawned with `process_group(0)`, making its pid the group
//! id.

/// SIGKILL the process group led by `pid`. `ESRCH` means the group is
/// already gone; any other failure is logged and never blocks response
/// termination.
pub fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    {
        let rc = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(pid, error = %err, "process group kill failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
