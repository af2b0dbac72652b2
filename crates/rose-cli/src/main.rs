//! rose - keep local folders in sync with RoseStudio scenarios
//!
//! # Configuration
//!
//! Settings are read from a TOML file given with `--config` or `ROSE_CONFIG`;
//! a missing file means defaults.
//!
//! # Environment Variables
//!
//! - `ROSE_CONFIG`: settings file
//! - `ROSE_SERVER_URL`: overrides `server.api_url`
//! - `RUST_LOG`: log filter when `--debug` is not given
//! - `EDITOR`: editor used by `edit-config` (default `vi`)

mod cli;
mod commands;
mod editor;
mod prompt;
mod table;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use rose_sync::SyncError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    match commands::run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<SyncError>() {
            Some(sync) if !sync.is_failure() => {
                eprintln!("{} {sync}", "note:".yellow().bold());
                Ok(())
            }
            _ => Err(err),
        },
    }
}

/// Log to stderr; stdout carries command output only
fn init_tracing(debug: bool, json: bool) {
    let filter = if debug {
        EnvFilter::new("debug,hyper=warn,h2=warn,reqwest=warn,rustls=warn,tokio=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
