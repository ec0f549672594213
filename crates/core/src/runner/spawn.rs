//! Executor spawn control.
//!
//! Resolves the binary path for a language and launches the child with its
//! generated argv. No shell interpolation: the binary is invoked directly
//! and arguments pass through as-is.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::RunnerError;
use crate::language::Language;

/// Resolve the executor binary for a language under the binaries root.
pub fn resolve_binary(root: &Path, language: Language) -> PathBuf {
    normalize(&root.join(language.binary_name()))
}

/// Lexically normalize a path, collapsing `.` and `..` components without
/// touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// Spawn the executor. All three stdio streams are piped; on unix the child
/// leads its own process group so the tree terminator can signal every
/// descendant at once. `kill_on_drop` backstops reaping if the coordinator
/// is dropped mid-flight.
pub fn spawn(binary: &Path, argv: &[String]) -> Result<Child, RunnerError> {
    let mut cmd = Command::new(binary);
    cmd.args(argv)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn().map_err(RunnerError::Spawn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
