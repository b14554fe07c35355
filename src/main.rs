//! outlook-mcp-rs: Outlook automation MCP server over stdio
//!
//! This server provides read-only access to the mail, calendar and contacts
//! of an Outlook profile via the Model Context Protocol (MCP) over stdio.
//! Folder paths are resolved once and cached, and item listings read a
//! restricted, sorted collection by position instead of counting or walking
//! whole folders.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment-driven configuration for limits and exclusions
//! - [`errors`]: Application error model with MCP error mapping
//! - [`host`]: Automation host abstraction (stores, folders, items)
//! - [`memory_host`]: Profile snapshot host with call accounting
//! - [`stores`]: Store enumeration with exclusion filtering
//! - [`resolver`]: Path resolution and folder tree listing
//! - [`folder_cache`]: Path to folder handle cache with hit/miss counters
//! - [`filter`]: Restriction predicates with local evaluation
//! - [`enumerate`]: Time-windowed, index-based item enumeration
//! - [`materialize`]: Item to record conversion
//! - [`worker`]: Single-thread host worker with call timeouts
//! - [`server`]: MCP tool handlers with validation and business orchestration
//! - [`models`]: Input/output DTOs and schema-bearing types

mod config;
mod enumerate;
mod errors;
mod filter;
mod folder_cache;
mod host;
mod materialize;
mod memory_host;
mod models;
mod resolver;
mod server;
mod stores;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{CliOverrides, ServerConfig};
use host::AutomationHost;
use memory_host::InMemoryHost;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;
use worker::HostWorker;

/// Command-line flags; each overrides its environment variable
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Profile snapshot to serve (overrides OUTLOOK_MCP_PROFILE_PATH)
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Store display name to hide; repeatable (overrides OUTLOOK_MCP_EXCLUDED_STORES)
    #[arg(long = "exclude-store", value_name = "NAME")]
    exclude_store: Vec<String>,
}

/// Application entry point
///
/// Initializes tracing from environment, loads config, starts the host
/// worker, and serves the MCP server over stdio. This process expects to be
/// spawned by an MCP client via `stdio` transport.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// OUTLOOK_MCP_PROFILE_PATH=profile.json \
/// OUTLOOK_MCP_EXCLUDED_STORES="Public Folders" \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load_from_env(CliOverrides {
        profile: cli.profile,
        excluded_stores: cli.exclude_store,
    })?;

    let profile = config.profile_path.clone();
    let worker = HostWorker::spawn(
        move || {
            InMemoryHost::load(&profile).map(|host| Box::new(host) as Box<dyn AutomationHost>)
        },
        config.exclusions(),
        Duration::from_millis(config.call_timeout_ms),
    )?;
    tracing::info!(
        profile = %config.profile_path.display(),
        excluded = config.excluded_stores.len(),
        "serving outlook profile"
    );

    let service = server::OutlookServer::new(config, worker)
        .serve(stdio())
        .await?;
    tokio::select! {
        quit = service.waiting() => {
            quit?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; shutting down");
        }
    }
    Ok(())
}
