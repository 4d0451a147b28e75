//! `r2box buckets` — lists buckets visible to the saved credentials.

use anyhow::Result;
use clap::Args;

use crate::client::BrokerClient;
use crate::daemon_state::require_running_port;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct BucketsCommand;

impl BucketsCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let port = require_running_port().await?;
        let client = BrokerClient::new(port);

        let data = client.list_buckets().await?;
        let count = data.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
        formatter.info(&format!("{count} bucket(s)"));
        if let Some(buckets) = data.get("buckets").and_then(|v| v.as_array()) {
            for bucket in buckets {
                if let Some(name) = bucket.get("name").and_then(|v| v.as_str()) {
                    formatter.info(name);
                }
            }
        }
        formatter.print_json(&data);
        Ok(())
    }
}
