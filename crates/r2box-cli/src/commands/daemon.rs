//! `r2box daemon` — controls the lifecycle of a detached `r2box-broker`
//! process, for a one-shot CLI invocation rather than a long-lived host
//! UI.
//!
//! `start` spawns the broker and returns immediately, persisting its
//! port/pid to [`crate::daemon_state`] so later invocations of this CLI
//! can find it again; `start --foreground` instead hands the broker's
//! whole lifecycle to [`r2box_supervisor::Supervisor`] for the duration
//! of this process and blocks until Ctrl+C.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use r2box_supervisor::Supervisor;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::client::BrokerClient;
use crate::daemon_state::{self, DaemonState};
use crate::output::{get_formatter, OutputFormat};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the broker, if it isn't already running
    Start {
        /// Stay attached, streaming logs, until Ctrl+C
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the running broker
    Stop,
    /// Stop then start the broker
    Restart,
    /// Show whether the broker is running and on which port
    Status,
}

impl DaemonCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        match self {
            Self::Start { foreground } if *foreground => run_foreground().await,
            Self::Start { .. } => start_detached(formatter.as_ref()).await,
            Self::Stop => stop(formatter.as_ref()).await,
            Self::Restart => {
                let _ = stop(formatter.as_ref()).await;
                start_detached(formatter.as_ref()).await
            }
            Self::Status => status(format).await,
        }
    }
}

fn resolve_broker_path() -> PathBuf {
    let exe_name = if cfg!(windows) { "r2box-broker.exe" } else { "r2box-broker" };
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(exe_name)))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(exe_name))
}

async fn start_detached(formatter: &dyn crate::output::OutputFormatter) -> Result<()> {
    if let Some(state) = daemon_state::load()? {
        if BrokerClient::new(state.port).health().await.is_ok() {
            formatter.info(&format!("broker already running on port {}", state.port));
            return Ok(());
        }
    }

    let broker_path = resolve_broker_path();
    let log_path = broker_log_path();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let log_file = std::fs::File::create(&log_path).with_context(|| format!("failed to create {}", log_path.display()))?;

    let mut command = Command::new(&broker_path);
    command.stdout(Stdio::piped()).stderr(Stdio::from(log_file));

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn broker at {}", broker_path.display()))?;
    let pid = child.id().context("spawned broker process has no pid")?;

    let stdout = child.stdout.take().expect("stdout piped at spawn");
    let port = tokio::time::timeout(STARTUP_TIMEOUT, read_listening_port(stdout))
        .await
        .context("timed out waiting for broker to report its listening port")??;

    // `child` is dropped here without `kill_on_drop` set, so the process
    // keeps running as an orphan once this CLI invocation exits — the
    // detachment the default (non-foreground) mode is for.
    drop(child);

    let state = DaemonState { pid, port };
    daemon_state::save(&state)?;
    formatter.success(&format!("broker started on port {port} (pid {pid})"));
    Ok(())
}

async fn read_listening_port(stdout: tokio::process::ChildStdout) -> Result<u16> {
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await.context("error reading broker stdout")? {
        if let Some(port) = line.strip_prefix("LISTENING PORT=").and_then(|s| s.trim().parse().ok()) {
            return Ok(port);
        }
    }
    bail!("broker exited before printing its listening port")
}

async fn run_foreground() -> Result<()> {
    let broker_path = resolve_broker_path();
    let supervisor = Supervisor::new(broker_path, None, SHUTDOWN_TIMEOUT, 1000);
    let mut logs = supervisor.subscribe_logs();

    let port = supervisor.start().await.context("failed to start broker")?;
    println!("broker started on port {port}; press Ctrl+C to stop");

    let log_task = tokio::spawn(async move {
        while let Ok(line) = logs.recv().await {
            println!("{line}");
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    supervisor.stop().await.context("failed to stop broker")?;
    log_task.abort();
    Ok(())
}

async fn stop(formatter: &dyn crate::output::OutputFormatter) -> Result<()> {
    let Some(state) = daemon_state::load()? else {
        formatter.info("broker is not running");
        return Ok(());
    };

    let client = BrokerClient::new(state.port);
    if client.shutdown().await.is_err() {
        formatter.warn("shutdown request failed; broker may already be stopped");
    }

    let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if client.health().await.is_err() {
            break;
        }
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }

    daemon_state::clear()?;
    formatter.success("broker stopped");
    Ok(())
}

async fn status(format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    match daemon_state::load()? {
        None => {
            formatter.info("stopped");
            formatter.print_json(&serde_json::json!({ "running": false }));
        }
        Some(state) => {
            let running = BrokerClient::new(state.port).health().await.is_ok();
            if running {
                formatter.success(&format!("running on port {} (pid {})", state.port, state.pid));
            } else {
                formatter.warn(&format!("stale daemon state (pid {}, port {}); broker is not responding", state.pid, state.port));
            }
            formatter.print_json(&serde_json::json!({
                "running": running,
                "port": state.port,
                "pid": state.pid,
            }));
        }
    }
    Ok(())
}

fn broker_log_path() -> std::path::PathBuf {
    r2box_core::config::Config::default_path()
        .parent()
        .map(|dir| dir.join("broker.log"))
        .unwrap_or_else(|| Path::new("broker.log").to_path_buf())
}
