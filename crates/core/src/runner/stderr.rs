//! The stderr control channel.
//!
//! Child stderr is not part of the response body: it is an out-of-band
//! channel the executor uses for logging and control messages. The framing
//! and interpretation live in [`StderrHandler`] implementations supplied by
//! the embedder; the coordinator only guarantees that handler-requested
//! actions apply before the next event, which keeps stderr-driven effects
//! ordered with stdout.

use bytes::Bytes;

use super::status::Status;

/// Capability handed to a stderr handler for one chunk. Actions are queued
/// and applied by the coordinator on its own loop.
#[derive(Debug, Default)]
pub struct Controller {
    headers: Vec<(String, String)>,
    writes: Vec<Bytes>,
    terminate: bool,
}

impl Controller {
    /// Set a response header. Ignored by the adapter once body bytes have
    /// been flushed.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Write bytes into the response body.
    pub fn write(&mut self, chunk: impl Into<Bytes>) {
        self.writes.push(chunk.into());
    }

    /// Ask the coordinator to end the response after this chunk.
    pub fn terminate(&mut self) {
        self.terminate = true;
    }

    pub(crate) fn into_parts(self) -> (Vec<(String, String)>, Vec<Bytes>, bool) {
        (self.headers, self.writes, self.terminate)
    }
}

/// Interpreter for child stderr chunks.
///
/// Handlers may log, set response headers, toggle
/// [`Status::checking_registry`] around missing-module install sequences,
/// or request termination.
pub trait StderrHandler: Send {
    fn on_chunk(&mut self, chunk: &[u8], status: &mut Status, ctl: &mut Controller);
}

/// Default handler: forwards complete stderr lines to the log and holds
/// partial lines until their newline arrives.
#[derive(Debug, Default)]
pub struct LogStderr {
    pending: Vec<u8>,
}

impl StderrHandler for LogStderr {
    fn on_chunk(&mut self, chunk: &[u8], _status: &mut Status, _ctl: &mut Controller) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if !line.is_empty() {
                tracing::info!(target: "runlet::service", "{line}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
