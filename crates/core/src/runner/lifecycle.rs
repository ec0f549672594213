//! The per-request lifecycle coordinator.
//!
//! Six independent sources can advance one invocation: the timeout timer,
//! child stdout, child stderr, stdin write failures, child exit, and spawn
//! errors. They are merged into a single tagged event stream consumed by one
//! loop, so stderr control actions and stdout bytes are never reordered
//! relative to the child's writes and the response is terminated exactly
//! once.
//!
//! The one ordering rule that shapes everything: stdout must drain before
//! the response closes. A failing child usually writes its error stack last,
//! so `Exit` never ends the response on its own; it waits for `StdoutEnd`.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;

use crate::envelope::BodyStream;

use super::kill;
use super::status::Status;
use super::stderr::{Controller, StderrHandler};

/// Outcome string reported on completion.
pub const RESPONSE_ENDED: &str = "response ended";

/// Read buffer size for child stdout/stderr.
const READ_CHUNK: usize = 8 * 1024;

/// A tagged event from one of the per-request sources.
#[derive(Debug)]
pub enum Event {
    StdoutChunk(Bytes),
    StdoutEnd,
    StderrChunk(Bytes),
    StderrEnd,
    StdinErr(std::io::Error),
    Exit {
        code: Option<i32>,
        signal: Option<i32>,
    },
    SpawnErr(String),
    Timeout,
}

/// Where response bytes and headers go. The HTTP adapter implements this
/// over its response channel; tests collect into memory.
pub trait ResponseSink: Send {
    fn write(&mut self, chunk: Bytes);
    fn set_header(&mut self, name: &str, value: &str);
    fn end(&mut self);
    fn finished(&self) -> bool;
}

/// Final state of one invocation.
#[derive(Debug)]
pub struct Completion {
    pub status: Status,
    pub outcome: &'static str,
}

/// Drives one invocation from spawn to a single terminated response.
pub struct Coordinator<S: ResponseSink> {
    sink: S,
    handler: Box<dyn StderrHandler>,
    timeout: Duration,
    timeout_body: String,
}

impl<S: ResponseSink> Coordinator<S> {
    pub fn new(
        sink: S,
        handler: Box<dyn StderrHandler>,
        timeout: Duration,
        timeout_body: String,
    ) -> Coordinator<S> {
        Coordinator {
            sink,
            handler,
            timeout,
            timeout_body,
        }
    }

    /// Terminal path for failures before a child exists (transpile, argv)
    /// or at spawn. Writes the diagnostic as the response body and ends.
    /// `vm_error` marks spawn failures, mirroring a child error event.
    pub fn fail(mut self, message: &str, vm_error: bool) -> Completion {
        let mut status = Status {
            vm_error,
            ended: true,
            ..Status::default()
        };
        let mut timer_armed = false;
        self.sink.write(Bytes::copy_from_slice(message.as_bytes()));
        end_response(&mut status, &mut self.sink, &mut timer_armed, None);
        Completion {
            status,
            outcome: RESPONSE_ENDED,
        }
    }

    /// Run the event loop until the response is terminated.
    pub async fn run(mut self, mut child: Child, body: Option<BodyStream>) -> Completion {
        let pid = child.id();
        let mut status = Status::default();

        // Stdin pump: request body bytes pipe in verbatim. A write failure
        // is reported as an event, not an outcome; the child may close its
        // input early on purpose.
        let (stdin_err_tx, mut stdin_err_rx) = mpsc::channel::<std::io::Error>(1);
        match (child.stdin.take(), body) {
            (Some(stdin), Some(body)) => {
                tokio::spawn(pump_stdin(stdin, body, stdin_err_tx));
            }
            _ => drop(stdin_err_tx),
        }

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut exit: Option<(Option<i32>, Option<i32>)> = None;
        let mut stdin_open = true;
        let mut timer_armed = true;

        let timer = tokio::time::sleep(self.timeout);
        tokio::pin!(timer);

        loop {
            let event = tokio::select! {
                _ = timer.as_mut(), if timer_armed => Event::Timeout,
                chunk = read_opt(&mut stdout), if stdout.is_some() => match chunk {
                    Some(bytes) => Event::StdoutChunk(bytes),
                    None => Event::StdoutEnd,
                },
                chunk = read_opt(&mut stderr), if stderr.is_some() => match chunk {
                    Some(bytes) => Event::StderrChunk(bytes),
                    None => Event::StderrEnd,
                },
                result = child.wait(), if exit.is_none() => match result {
                    Ok(exit_status) => Event::Exit {
                        code: exit_status.code(),
                        signal: exit_signal(&exit_status),
                    },
                    Err(err) => Event::SpawnErr(err.to_string()),
                },
                err = stdin_err_rx.recv(), if stdin_open => match err {
                    Some(err) => Event::StdinErr(err),
                    None => {
                        stdin_open = false;
                        continue;
                    }
                },
                else => {
                    // Every source is exhausted and nothing terminated the
                    // response (a handler left `checking_registry` set).
                    tracing::debug!("event sources exhausted before termination");
                    if !status.ended {
                        status.ended = true;
                        end_response(&mut status, &mut self.sink, &mut timer_armed, None);
                    }
                    break;
                }
            };

            match event {
                Event::Timeout => {
                    // One timeout per invocation.
                    timer_armed = false;
                    if !status.service_ended && !status.ended && !status.checking_registry {
                        status.ended = true;
                        self.sink.write(Bytes::from(self.timeout_body.clone()));
                        if let Some(pid) = pid {
                            kill::kill_process_group(pid);
                        }
                        end_response(&mut status, &mut self.sink, &mut timer_armed, None);
                        break;
                    }
                }

                Event::StdoutChunk(chunk) => {
                    if !status.ended && !self.sink.finished() {
                        self.sink.write(chunk);
                    }
                }

                Event::StdoutEnd => {
                    status.stdout_ended = true;
                    let kill_pid = if exit.is_none() { pid } else { None };
                    if !status.checking_registry && !status.ended && !status.erroring {
                        status.ended = true;
                        end_response(&mut status, &mut self.sink, &mut timer_armed, kill_pid);
                        break;
                    }
                    if status.vm_closed && !status.ended {
                        status.ended = true;
                        end_response(&mut status, &mut self.sink, &mut timer_armed, kill_pid);
                        break;
                    }
                }

                Event::StderrChunk(chunk) => {
                    let mut ctl = Controller::default();
                    self.handler.on_chunk(&chunk, &mut status, &mut ctl);
                    let (headers, writes, terminate) = ctl.into_parts();
                    for (name, value) in headers {
                        self.sink.set_header(&name, &value);
                    }
                    for bytes in writes {
                        if !status.ended && !self.sink.finished() {
                            self.sink.write(bytes);
                        }
                    }
                    if terminate && !status.ended {
                        status.ended = true;
                        let kill_pid = if exit.is_none() { pid } else { None };
                        end_response(&mut status, &mut self.sink, &mut timer_armed, kill_pid);
                        break;
                    }
                }

                Event::StderrEnd => {}

                Event::StdinErr(err) => {
                    status.stdin_error = true;
                    tracing::debug!(error = %err, "stdin write failed; child closed its input");
                }

                Event::SpawnErr(message) => {
                    status.vm_error = true;
                    if !status.ended {
                        status.ended = true;
                        self.sink.write(Bytes::from(message));
                        let kill_pid = if exit.is_none() { pid } else { None };
                        end_response(&mut status, &mut self.sink, &mut timer_armed, kill_pid);
                        break;
                    }
                }

                Event::Exit { code, signal } => {
                    exit = Some((code, signal));
                    status.vm_closed = true;
                    if !status.checking_registry && !status.ended && !status.stdout_ended {
                        let failed = signal.is_some() || matches!(code, Some(c) if c != 0);
                        if failed {
                            // Code 1 is a generic child error, higher codes
                            // are unknown errors, a signal means killed. In
                            // every case the child's own output is the
                            // diagnostic; nothing is written here, and the
                            // response stays open until stdout drains.
                            status.erroring = true;
                            status.vm_error = true;
                        }
                    }
                    if status.stdout_ended && !status.ended {
                        status.ended = true;
                        end_response(&mut status, &mut self.sink, &mut timer_armed, None);
                        break;
                    }
                }
            }
        }

        // Reap without blocking completion; the group has already been
        // signalled if the child had not exited.
        if exit.is_none() {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }

        Completion {
            status,
            outcome: RESPONSE_ENDED,
        }
    }
}

/// The single terminator. Disarms the timer, kills the child's process
/// group when it has not already exited, marks the service completed, and
/// ends the sink.
fn end_response<S: ResponseSink>(
    status: &mut Status,
    sink: &mut S,
    timer_armed: &mut bool,
    kill_pid: Option<u32>,
) {
    *timer_armed = false;
    if let Some(pid) = kill_pid {
        kill::kill_process_group(pid);
    }
    status.service_ended = true;
    sink.end();
}

/// Read one chunk from an optional stream, clearing the slot at EOF or on a
/// read error so the select guard disables the arm.
async fn read_opt<R: AsyncRead + Unpin>(slot: &mut Option<R>) -> Option<Bytes> {
    let Some(reader) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let mut buf = vec![0u8; READ_CHUNK];
    match reader.read(&mut buf).await {
        Ok(0) => {
            *slot = None;
            None
        }
        Ok(n) => {
            buf.truncate(n);
            Some(Bytes::from(buf))
        }
        Err(err) => {
            tracing::debug!(error = %err, "child stream read failed");
            *slot = None;
            None
        }
    }
}

async fn pump_stdin(
    mut stdin: ChildStdin,
    mut body: BodyStream,
    err_tx: mpsc::Sender<std::io::Error>,
) {
    use futures::StreamExt;

    while let Some(next) = body.next().await {
        match next {
            Ok(chunk) => {
                if let Err(err) = stdin.write_all(&chunk).await {
                    let _ = err_tx.send(err).await;
                    return;
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "request body stream failed");
                break;
            }
        }
    }
    // Dropping after shutdown closes the child's stdin.
    let _ = stdin.shutdown().await;
}

fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
