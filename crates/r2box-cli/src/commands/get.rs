//! `r2box get <bucket>/<key> <local>` — enqueues a download on the
//! broker's Transfer Engine and polls it to completion; Ctrl+C during the
//! wait cancels the task cooperatively rather than leaving a partial file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::client::BrokerClient;
use crate::daemon_state::require_running_port;
use crate::output::{get_formatter, OutputFormat};
use crate::progress::wait_for_task;

#[derive(Debug, Args)]
pub struct GetCommand {
    /// `<bucket>/<key>` source
    pub source: String,
    pub local_path: PathBuf,
}

impl GetCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let (bucket, key) = split_source(&self.source)?;
        let port = require_running_port().await?;

        let local_path = absolute_path(&self.local_path)?;
        let client = BrokerClient::new(port);
        let enqueued = client.enqueue_download(bucket, key, &local_path.to_string_lossy()).await?;
        let id = enqueued["id"].as_str().context("broker response missing task id")?;

        let label = format!("download {bucket}/{key}");
        let task = wait_for_task(&client, id, &label, formatter.as_ref()).await?;

        let bytes = task["transferred"].as_u64().unwrap_or(0);
        formatter.success(&format!("downloaded {bytes} byte(s) to {}", local_path.display()));
        formatter.print_json(&task);
        Ok(())
    }
}

fn split_source(source: &str) -> Result<(&str, &str)> {
    match source.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => bail!("source must be in `<bucket>/<key>` form, got `{source}`"),
    }
}

/// The Transfer Engine's download worker opens its destination relative to
/// the broker process's own working directory, so a relative CLI argument
/// must be resolved against the CLI's `cwd` before being sent over the wire.
fn absolute_path(path: &std::path::Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
