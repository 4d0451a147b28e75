//! r2box CLI - operator command-line client for r2box
//!
//! A thin process/HTTP client over the same contract the three platform
//! front-ends speak: the Credential Store directly for `creds`, the
//! broker's loopback HTTP surface for everything else, and a detached
//! `r2box-broker` child process for `daemon`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use r2box_core::config::Config;
use r2box_credentials::CredentialStore;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod daemon_state;
mod output;
mod progress;

use commands::buckets::BucketsCommand;
use commands::completions::CompletionsCommand;
use commands::cp::CpCommand;
use commands::creds::CredsCommand;
use commands::daemon::DaemonCommand;
use commands::get::GetCommand;
use commands::ls::LsCommand;
use commands::rm::RmCommand;
use commands::rmdir::RmdirCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "r2box", version, about = "Operator CLI for the r2box local broker and credential store")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage saved R2 credentials
    #[command(subcommand)]
    Creds(CredsCommand),
    /// Control the broker's lifecycle
    #[command(subcommand)]
    Daemon(DaemonCommand),
    /// List buckets
    Buckets(BucketsCommand),
    /// List objects under a prefix
    Ls(LsCommand),
    /// Upload a local file to a bucket/key
    Cp(CpCommand),
    /// Download an object to a local file
    Get(GetCommand),
    /// Delete a single object
    Rm(RmCommand),
    /// Recursively delete everything under a prefix
    Rmdir(RmdirCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Opens the Credential Store at the configured path, preferring the OS
/// keychain when the loaded config asks for it.
#[must_use]
pub fn credential_store() -> CredentialStore {
    let config = Config::load_or_default(&Config::default_path());
    CredentialStore::detect(config.credentials.store_path, config.credentials.prefer_keychain)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };

    match cli.command {
        Commands::Creds(cmd) => cmd.execute(format).await,
        Commands::Daemon(cmd) => cmd.execute(format).await,
        Commands::Buckets(cmd) => cmd.execute(format).await,
        Commands::Ls(cmd) => cmd.execute(format).await,
        Commands::Cp(cmd) => cmd.execute(format).await,
        Commands::Get(cmd) => cmd.execute(format).await,
        Commands::Rm(cmd) => cmd.execute(format).await,
        Commands::Rmdir(cmd) => cmd.execute(format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
