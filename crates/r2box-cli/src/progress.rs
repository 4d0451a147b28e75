//! Shared polling loop for commands that enqueue a Transfer Engine task
//! (`cp`, `get`, `rmdir --async`) and need to report progress until it
//! reaches a terminal status. A Ctrl+C during the wait requests
//! cancellation on the broker rather than killing the CLI process outright,
//! so the engine's cooperative-cancel path (spec.md §4.4) actually runs.

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::client::BrokerClient;
use crate::output::OutputFormatter;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Polls `GET /transfers/{id}` until the task reaches COMPLETED, FAILED,
/// or CANCELLED, printing progress lines as it goes. Returns the task's
/// final JSON body on COMPLETED; bails with the task's error otherwise.
pub async fn wait_for_task(
    client: &BrokerClient,
    id: &str,
    label: &str,
    formatter: &dyn OutputFormatter,
) -> Result<Value> {
    let mut cancel_requested = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                formatter.warn(&format!("cancelling {label}..."));
                let _ = client.cancel_transfer_task(id).await;
            }
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let task = client.get_transfer_task(id).await?;
        let status = task["status"].as_str().unwrap_or("");
        match status {
            "COMPLETED" => return Ok(task),
            "FAILED" => {
                let reason = task["error"].as_str().unwrap_or("unknown error");
                bail!("{label} failed: {reason}");
            }
            "CANCELLED" => bail!("{label} cancelled"),
            _ => {
                let transferred = task["transferred"].as_u64().unwrap_or(0);
                let total = task["total"].as_u64().unwrap_or(0);
                formatter.info(&format!("{label}: {transferred}/{total} ({status})"));
            }
        }
    }
}
