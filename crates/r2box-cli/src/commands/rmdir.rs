//! `r2box rmdir <bucket>/<prefix>` — recursive delete of everything under
//! a prefix, enqueued on the broker's Transfer Engine so it gets the same
//! paginate-then-chunked-delete worker, progress, and cancel semantics as
//! every other bulk operation (spec.md §4.4).

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::client::BrokerClient;
use crate::daemon_state::require_running_port;
use crate::output::{get_formatter, OutputFormat};
use crate::progress::wait_for_task;

#[derive(Debug, Args)]
pub struct RmdirCommand {
    /// `<bucket>/<prefix>` to delete recursively
    pub target: String,
}

impl RmdirCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let (bucket, prefix) = match self.target.split_once('/') {
            Some((bucket, prefix)) if !bucket.is_empty() => (bucket, prefix),
            _ => bail!("target must be in `<bucket>/<prefix>` form, got `{}`", self.target),
        };

        let port = require_running_port().await?;
        let client = BrokerClient::new(port);

        let enqueued = client.enqueue_delete(bucket, prefix).await?;
        let id = enqueued["id"].as_str().context("broker response missing task id")?;

        let label = format!("delete {bucket}/{prefix}");
        let task = wait_for_task(&client, id, &label, formatter.as_ref()).await?;

        let deleted = task["transferred"].as_u64().unwrap_or(0);
        formatter.success(&format!("deleted {deleted} object(s) under {bucket}/{prefix}"));
        formatter.print_json(&task);
        Ok(())
    }
}
