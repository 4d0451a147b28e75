//! `r2box cp <local> <bucket>/<key>` — enqueues an upload on the broker's
//! Transfer Engine and polls it to completion, so a large file gets the
//! same bounded-concurrency, progress, and cancel semantics any other
//! front-end gets from the same engine.

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::client::BrokerClient;
use crate::daemon_state::require_running_port;
use crate::output::{get_formatter, OutputFormat};
use crate::progress::wait_for_task;

#[derive(Debug, Args)]
pub struct CpCommand {
    pub local_path: std::path::PathBuf,
    /// `<bucket>/<key>` destination
    pub destination: String,
}

impl CpCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let (bucket, key) = split_destination(&self.destination)?;
        let port = require_running_port().await?;

        let local_path = tokio::fs::canonicalize(&self.local_path)
            .await
            .with_context(|| format!("failed to open {}", self.local_path.display()))?;
        let content_length = tokio::fs::metadata(&local_path).await?.len();

        let client = BrokerClient::new(port);
        let enqueued = client
            .enqueue_upload(bucket, key, &local_path.to_string_lossy(), content_length)
            .await?;
        let id = enqueued["id"].as_str().context("broker response missing task id")?;

        let label = format!("upload {bucket}/{key}");
        let task = wait_for_task(&client, id, &label, formatter.as_ref()).await?;

        formatter.success(&format!("uploaded {content_length} byte(s) to {bucket}/{key}"));
        formatter.print_json(&task);
        Ok(())
    }
}

fn split_destination(destination: &str) -> Result<(&str, &str)> {
    match destination.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => bail!("destination must be in `<bucket>/<key>` form, got `{destination}`"),
    }
}
