//! `r2box ls <bucket> [prefix]` — one hierarchical listing page (the
//! Folder Cache's prefix-keyed view, via the broker).

use anyhow::Result;
use clap::Args;

use crate::client::BrokerClient;
use crate::daemon_state::require_running_port;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct LsCommand {
    pub bucket: String,
    /// Prefix to list under; omit for the bucket root
    pub prefix: Option<String>,
    #[arg(long, default_value = "1000")]
    pub max_keys: u32,
    #[arg(long)]
    pub continuation_token: Option<String>,
    /// Recursive flat listing instead of one hierarchy level
    #[arg(long)]
    pub recursive: bool,
}

impl LsCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let port = require_running_port().await?;
        let client = BrokerClient::new(port);

        let delimiter = if self.recursive { "" } else { "/" };
        let data = client
            .list_objects(
                &self.bucket,
                self.prefix.as_deref(),
                delimiter,
                self.max_keys,
                self.continuation_token.as_deref(),
            )
            .await?;

        if let Some(prefixes) = data
            .get("pagination")
            .and_then(|p| p.get("commonPrefixes"))
            .and_then(|v| v.as_array())
        {
            for prefix in prefixes {
                if let Some(s) = prefix.as_str() {
                    formatter.info(&format!("{s}/"));
                }
            }
        }
        if let Some(objects) = data.get("objects").and_then(|v| v.as_array()) {
            for object in objects {
                let key = object.get("key").and_then(|v| v.as_str()).unwrap_or("?");
                let size = object.get("size").and_then(|v| v.as_u64()).unwrap_or(0);
                formatter.info(&format!("{size:>12}  {key}"));
            }
        }
        formatter.print_json(&data);
        Ok(())
    }
}
