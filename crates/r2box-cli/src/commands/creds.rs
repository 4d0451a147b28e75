//! `r2box creds` — operates on the Credential Store directly; no
//! broker needs to be running.

use anyhow::Result;
use clap::Subcommand;
use r2box_core::domain::credentials::RedactedCredentials;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CredsCommand {
    /// Save R2 credentials, deriving the account's endpoint
    Save {
        #[arg(long)]
        account_id: String,
        #[arg(long)]
        access_key_id: String,
        #[arg(long)]
        secret_access_key: String,
    },
    /// Show the currently saved credentials (secret redacted)
    Show,
    /// Delete the saved credentials
    Clear,
}

impl CredsCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let store = crate::credential_store();

        match self {
            Self::Save { account_id, access_key_id, secret_access_key } => {
                let creds = store.save(account_id.clone(), access_key_id.clone(), secret_access_key.clone())?;
                let redacted = RedactedCredentials::from(&creds);
                formatter.success(&format!("credentials saved for account {}", redacted.account_id));
                formatter.print_json(&serde_json::to_value(&redacted)?);
            }
            Self::Show => match store.load()? {
                Some(creds) => {
                    let redacted = RedactedCredentials::from(&creds);
                    formatter.info(&format!(
                        "account {} @ {} (updated {})",
                        redacted.account_id, redacted.endpoint, redacted.last_updated
                    ));
                    formatter.print_json(&serde_json::to_value(&redacted)?);
                }
                None => {
                    formatter.info("no credentials saved");
                    formatter.print_json(&serde_json::json!({ "saved": false }));
                }
            },
            Self::Clear => {
                store.clear()?;
                formatter.success("credentials cleared");
            }
        }
        Ok(())
    }
}
