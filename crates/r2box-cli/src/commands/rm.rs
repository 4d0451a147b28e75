//! `r2box rm <bucket>/<key>` — deletes a single object.

use anyhow::{bail, Result};
use clap::Args;

use crate::client::BrokerClient;
use crate::daemon_state::require_running_port;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct RmCommand {
    /// `<bucket>/<key>` to delete
    pub target: String,
}

impl RmCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let (bucket, key) = match self.target.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => (bucket, key),
            _ => bail!("target must be in `<bucket>/<key>` form, got `{}`", self.target),
        };

        let port = require_running_port().await?;
        let data = BrokerClient::new(port).delete_object(bucket, key).await?;

        formatter.success(&format!("deleted {bucket}/{key}"));
        formatter.print_json(&data);
        Ok(())
    }
}
