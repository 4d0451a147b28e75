//! Owns the lifecycle of the `r2box-broker` child process on behalf of
//! a host UI or the CLI. Spawns the broker, discovers its ephemeral
//! port from its first stdout line, and fans out status transitions
//! and log lines to any number of subscribers.
//!
//! The broker is spawned and reaped directly (`tokio::process::Command`
//! with piped stdio, a dedicated reader task per stream) rather than
//! handed to an externally-managed service unit, since this process is
//! supervisor-owned end to end.

pub mod error;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use error::SupervisorError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{info, warn};

/// How long `start()` waits for the `LISTENING PORT=` line before giving
/// up and killing the half-started process.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the exit watcher polls the child process for termination.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Lifecycle states broadcast to status subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Starting,
    Running { port: u16 },
    Stopping,
    Stopped,
    Crashed { code: Option<i32> },
}

struct RunningBroker {
    child: Child,
    port: u16,
}

struct State {
    status: DaemonStatus,
    running: Option<RunningBroker>,
}

struct Inner {
    broker_path: PathBuf,
    /// Extra arguments passed to the broker process. Empty in production
    /// (the real binary takes none); tests use this to point `sh -c` at a
    /// stand-in script instead of spawning the real broker.
    broker_args: Vec<String>,
    config_path: Option<PathBuf>,
    shutdown_timeout: Duration,
    status_tx: broadcast::Sender<DaemonStatus>,
    log_tx: broadcast::Sender<String>,
    state: Mutex<State>,
    http: reqwest::Client,
}

/// Handle to the supervised broker process. Cheap to clone; every clone
/// shares the same child process and subscriber channels.
#[derive(Clone)]
pub struct Supervisor(Arc<Inner>);

impl Supervisor {
    /// `broker_path` is the path to the `r2box-broker` binary.
    /// `config_path`, if set, is passed to the broker via `R2BOX_CONFIG`
    /// so the supervised process reads the same configuration the CLI
    /// resolved rather than re-deriving its own default path.
    #[must_use]
    pub fn new(
        broker_path: PathBuf,
        config_path: Option<PathBuf>,
        shutdown_timeout: Duration,
        log_buffer_lines: usize,
    ) -> Self {
        Self::with_args(broker_path, Vec::new(), config_path, shutdown_timeout, log_buffer_lines)
    }

    /// As [`Self::new`], but with extra arguments forwarded to the spawned
    /// process. Exposed for tests that stand in a shell script for the
    /// real broker binary; production callers use [`Self::new`].
    #[must_use]
    pub fn with_args(
        broker_path: PathBuf,
        broker_args: Vec<String>,
        config_path: Option<PathBuf>,
        shutdown_timeout: Duration,
        log_buffer_lines: usize,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        let (log_tx, _) = broadcast::channel(log_buffer_lines.max(1));

        Self(Arc::new(Inner {
            broker_path,
            broker_args,
            config_path,
            shutdown_timeout,
            status_tx,
            log_tx,
            state: Mutex::new(State {
                status: DaemonStatus::Stopped,
                running: None,
            }),
            http: reqwest::Client::new(),
        }))
    }

    /// Subscribes to lifecycle transitions. Dropping the receiver is the
    /// entire unsubscribe contract.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<DaemonStatus> {
        self.0.status_tx.subscribe()
    }

    /// Subscribes to broker stdout/stderr lines. A slow subscriber loses
    /// its oldest buffered lines rather than stalling the supervisor,
    /// matching the bounded `broadcast` channel's own overflow behavior.
    #[must_use]
    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.0.log_tx.subscribe()
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> DaemonStatus {
        self.0.state.lock().await.status
    }

    /// The broker's bound port, if currently running.
    pub async fn port(&self) -> Option<u16> {
        match self.0.state.lock().await.status {
            DaemonStatus::Running { port } => Some(port),
            _ => None,
        }
    }

    fn set_status(&self, state: &mut State, status: DaemonStatus) {
        state.status = status;
        let _ = self.0.status_tx.send(status);
    }

    /// Spawns the broker and waits for its `LISTENING PORT=` line.
    /// Returns the bound port on success.
    pub async fn start(&self) -> Result<u16, SupervisorError> {
        let mut guard = self.0.state.lock().await;
        if let DaemonStatus::Running { port } = guard.status {
            return Err(SupervisorError::AlreadyRunning(port));
        }

        self.set_status(&mut guard, DaemonStatus::Starting);

        let mut command = Command::new(&self.0.broker_path);
        command
            .args(&self.0.broker_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(config_path) = &self.0.config_path {
            command.env("R2BOX_CONFIG", config_path);
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            path: self.0.broker_path.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let (port_tx, port_rx) = tokio::sync::oneshot::channel();
        let log_tx = self.0.log_tx.clone();
        tokio::spawn(read_stdout(stdout, log_tx.clone(), port_tx));
        tokio::spawn(read_stderr(stderr, log_tx));

        let port = match timeout(STARTUP_TIMEOUT, port_rx).await {
            Ok(Ok(Some(port))) => port,
            Ok(Ok(None)) | Ok(Err(_)) => {
                let _ = child.start_kill();
                self.set_status(&mut guard, DaemonStatus::Stopped);
                return Err(SupervisorError::NoListeningLine);
            }
            Err(_) => {
                let _ = child.start_kill();
                self.set_status(&mut guard, DaemonStatus::Stopped);
                return Err(SupervisorError::NoListeningLine);
            }
        };

        info!(port, "broker started");
        guard.running = Some(RunningBroker { child, port });
        self.set_status(&mut guard, DaemonStatus::Running { port });
        drop(guard);

        self.spawn_exit_watcher();

        Ok(port)
    }

    /// Polls the child with `try_wait()` so the lock is never held across
    /// an `.await`, and transitions to `Crashed` if the process exits on
    /// its own rather than through `stop()` (which takes `running` out of
    /// state first, so the watcher sees `None` and exits quietly).
    fn spawn_exit_watcher(&self) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;

                let mut guard = supervisor.0.state.lock().await;
                let Some(running) = guard.running.as_mut() else {
                    return;
                };

                match running.child.try_wait() {
                    Ok(Some(status)) => {
                        warn!(code = ?status.code(), "broker process exited unexpectedly");
                        guard.running = None;
                        supervisor.set_status(&mut guard, DaemonStatus::Crashed { code: status.code() });
                        return;
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(error = %err, "error polling broker process status");
                        return;
                    }
                }
            }
        });
    }

    /// Requests a graceful shutdown via `POST /shutdown`, waits up to the
    /// configured timeout, then falls back to a hard kill.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut guard = self.0.state.lock().await;
        let mut running = guard.running.take().ok_or(SupervisorError::NotRunning)?;
        self.set_status(&mut guard, DaemonStatus::Stopping);

        let url = format!("http://127.0.0.1:{}/shutdown", running.port);
        if let Err(err) = self.0.http.post(&url).send().await {
            warn!(error = %err, "shutdown request failed, falling back to hard kill");
        }

        let exited = timeout(self.0.shutdown_timeout, running.child.wait()).await;
        match exited {
            Ok(Ok(_status)) => {}
            Ok(Err(err)) => warn!(error = %err, "error waiting for broker exit"),
            Err(_) => {
                warn!("broker did not exit within shutdown timeout, killing");
                let _ = running.child.start_kill();
                let _ = running.child.wait().await;
            }
        }

        self.set_status(&mut guard, DaemonStatus::Stopped);
        Ok(())
    }

    /// Stops then starts the broker, returning the new port.
    pub async fn restart(&self) -> Result<u16, SupervisorError> {
        if matches!(self.status().await, DaemonStatus::Running { .. }) {
            self.stop().await?;
        }
        self.start().await
    }
}

async fn read_stdout(
    stdout: tokio::process::ChildStdout,
    log_tx: broadcast::Sender<String>,
    port_tx: tokio::sync::oneshot::Sender<Option<u16>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut port_tx = Some(port_tx);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if port_tx.is_some() {
                    if let Some(port) = parse_listening_line(&line) {
                        if let Some(tx) = port_tx.take() {
                            let _ = tx.send(Some(port));
                        }
                        continue;
                    }
                }
                let _ = log_tx.send(line);
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "error reading broker stdout");
                break;
            }
        }
    }

    if let Some(tx) = port_tx.take() {
        let _ = tx.send(None);
    }
}

async fn read_stderr(stderr: tokio::process::ChildStderr, log_tx: broadcast::Sender<String>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let _ = log_tx.send(format!("[stderr] {line}"));
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "error reading broker stderr");
                break;
            }
        }
    }
}

/// Parses a `LISTENING PORT=<n>` line, requiring an exact prefix match
/// and a clean trailing integer.
fn parse_listening_line(line: &str) -> Option<u16> {
    line.strip_prefix("LISTENING PORT=")?.trim().parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_listening_line() {
        assert_eq!(parse_listening_line("LISTENING PORT=54321"), Some(54321));
    }

    #[test]
    fn rejects_lines_without_the_exact_prefix() {
        assert_eq!(parse_listening_line("listening port=1234"), None);
        assert_eq!(parse_listening_line("some other log line"), None);
    }

    #[test]
    fn rejects_non_numeric_suffix() {
        assert_eq!(parse_listening_line("LISTENING PORT=abc"), None);
    }
}
