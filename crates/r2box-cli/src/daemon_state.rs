//! Persists the running broker's port/pid across CLI invocations.
//!
//! The CLI is a short-lived process: `r2box daemon start` spawns a
//! long-running `r2box-broker` that outlives it, and every later
//! invocation (`r2box buckets`, `r2box ls`, ...) needs to rediscover which
//! port that broker bound to. `tokio::process::Child` orphans rather than
//! kills its child on drop when `kill_on_drop` isn't set, which is exactly
//! the daemonization this file's state record depends on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub port: u16,
}

#[must_use]
pub fn state_path() -> PathBuf {
    r2box_core::config::Config::default_path()
        .parent()
        .map(|dir| dir.join("daemon.json"))
        .unwrap_or_else(|| PathBuf::from("daemon.json"))
}

pub fn load() -> Result<Option<DaemonState>> {
    let path = state_path();
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let state = serde_json::from_str(&content)
                .with_context(|| format!("corrupt daemon state file at {}", path.display()))?;
            Ok(Some(state))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub fn save(state: &DaemonState) -> Result<()> {
    let path = state_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let content = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))
}

pub fn clear() -> Result<()> {
    let path = state_path();
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Returns the live broker's port, erring with an operator-actionable
/// message if no daemon state is recorded or the process it names is gone.
pub async fn require_running_port() -> Result<u16> {
    let Some(state) = load()? else {
        anyhow::bail!("broker is not running; start it with `r2box daemon start`");
    };
    if !process_alive(state.pid) {
        clear()?;
        anyhow::bail!("broker is not running (stale daemon state cleared); start it with `r2box daemon start`");
    }
    Ok(state.port)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still validates the pid exists and is
    // visible to this user, per kill(2).
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}
