//! Worker process supervision and line-protocol I/O.
//!
//! Each session owns exactly one worker process (the external assembler and
//! cycle-level simulator). The handle spawns the process with piped
//! stdin/stdout/stderr, attaches background readers on both output streams,
//! and watches for process exit. Readers forward everything they see onto a
//! single event channel; [`WorkerHandle::request`] consumes that channel for
//! one command at a time.
//!
//! Framing: the worker writes exactly one JSON object per response on one
//! line of stdout, so a pending request completes the instant that line
//! arrives; the configured timeout is only an upper bound. The worker
//! protocol has no request tagging, so callers must never have two
//! commands in flight on one handle (the session command lock enforces
//! this).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::Command;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command as ProcessCommand};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Everything the background tasks can observe on a worker.
#[derive(Debug)]
enum WorkerEvent {
    /// One line of primary output.
    Stdout(String),
    /// One line of diagnostic output.
    Diag(String),
    /// The process exited; carries a human-readable status.
    Exited(String),
}

/// Owns one spawned worker process and its I/O plumbing.
pub struct WorkerHandle {
    stdin: Mutex<ChildStdin>,
    events: Mutex<mpsc::UnboundedReceiver<WorkerEvent>>,
    dead: Arc<AtomicBool>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    pid: Option<u32>,
}

impl WorkerHandle {
    /// Start a worker process. Reader and exit-watcher tasks are detached;
    /// none of them ever blocks the caller.
    pub fn spawn(config: &Config) -> Result<Self> {
        let mut child = ProcessCommand::new(&config.worker_path)
            .args(&config.worker_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                Error::unavailable(format!(
                    "failed to spawn {}: {err}",
                    config.worker_path.display()
                ))
            })?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::unavailable("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::unavailable("worker stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::unavailable("worker stderr not captured"))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let dead = Arc::new(AtomicBool::new(false));

        let stdout_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                if stdout_tx.send(WorkerEvent::Stdout(line)).is_err() {
                    break;
                }
            }
        });

        let stderr_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stderr_tx.send(WorkerEvent::Diag(line)).is_err() {
                    break;
                }
            }
        });

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let exit_dead = Arc::clone(&dead);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => format!("worker {status}"),
                    Err(err) => format!("wait on worker failed: {err}"),
                },
                _ = &mut kill_rx => {
                    let _ = child.start_kill();
                    match child.wait().await {
                        Ok(status) => format!("worker killed ({status})"),
                        Err(err) => format!("kill of worker failed: {err}"),
                    }
                }
            };
            exit_dead.store(true, Ordering::SeqCst);
            tracing::debug!(pid, %status, "worker process exited");
            let _ = event_tx.send(WorkerEvent::Exited(status));
        });

        tracing::debug!(pid, path = %config.worker_path.display(), "spawned worker");

        Ok(Self {
            stdin: Mutex::new(stdin),
            events: Mutex::new(event_rx),
            dead,
            kill_tx: Mutex::new(Some(kill_tx)),
            pid,
        })
    }

    /// Whether the process has been observed to exit.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the exit watcher to kill the process. Idempotent.
    pub async fn kill(&self) {
        if let Some(tx) = self.kill_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    /// Issue one command and wait for its single JSON response.
    ///
    /// Stale output left over from a previously timed-out command is
    /// discarded first. Diagnostic-stream output during the wait is an
    /// error signal: after the first diagnostic line a short grace window
    /// (`diag_grace`) lets the rest of a multi-line message arrive, then
    /// the whole text is surfaced as [`Error::WorkerReported`].
    pub async fn request(
        &self,
        command: &Command<'_>,
        timeout: Duration,
        diag_grace: Duration,
    ) -> Result<Value> {
        let wire = command.encode()?;

        let mut events = self.events.lock().await;
        while let Ok(stale) = events.try_recv() {
            tracing::debug!(pid = self.pid, ?stale, "discarding stale worker output");
        }

        if self.is_dead() {
            return Err(Error::unavailable("worker process has exited"));
        }

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(wire.as_bytes()).await.map_err(|err| {
                Error::unavailable(format!("write to worker failed: {err}"))
            })?;
            stdin.flush().await.map_err(|err| {
                Error::unavailable(format!("flush to worker failed: {err}"))
            })?;
        }

        let deadline = Instant::now() + timeout;
        let mut diag = String::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let mut wait = deadline - now;
            if !diag.is_empty() {
                wait = wait.min(diag_grace);
            }

            match tokio::time::timeout(wait, events.recv()).await {
                Ok(Some(WorkerEvent::Stdout(line))) => {
                    if !diag.is_empty() {
                        return Err(Error::worker_reported(diag.trim_end().to_string()));
                    }
                    return serde_json::from_str(&line).map_err(|_| Error::protocol(line));
                }
                Ok(Some(WorkerEvent::Diag(line))) => {
                    diag.push_str(&line);
                    diag.push('\n');
                }
                Ok(Some(WorkerEvent::Exited(status))) => {
                    return Err(if diag.is_empty() {
                        Error::crashed(status)
                    } else {
                        Error::crashed(format!("{status}: {}", diag.trim_end()))
                    });
                }
                Ok(None) => {
                    return Err(Error::crashed("worker output channel closed"));
                }
                Err(_elapsed) => {
                    if !diag.is_empty() {
                        return Err(Error::worker_reported(diag.trim_end().to_string()));
                    }
                    tracing::warn!(pid = self.pid, ?timeout, "worker response timed out");
                    return Err(Error::WorkerTimeout(timeout));
                }
            }
        }

        if !diag.is_empty() {
            return Err(Error::worker_reported(diag.trim_end().to_string()));
        }
        Err(Error::WorkerTimeout(timeout))
    }
}
