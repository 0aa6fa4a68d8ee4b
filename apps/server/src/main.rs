//! Dropgate - limited-download static file server
//!
//! Serves a directory over HTTP while capping how many times each file may
//! be downloaded. All accounting lives in `dropgate-core`; this binary is
//! configuration, logging, and the serve loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dropgate_core::{AccessTracker, DownloadGate};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides `--bind-address` when set to a valid
/// host:port pair.
const BIND_ADDRESS_ENV: &str = "BIND_ADDRESS";

/// Dropgate - limited-download static file server
#[derive(Parser)]
#[command(name = "dropgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address and port the server should listen on. Can also be set using
    /// the BIND_ADDRESS environment variable.
    #[arg(long, default_value = "localhost:8080")]
    bind_address: String,

    /// Path to the directory with files to be served
    #[arg(long, default_value = "files")]
    file_dir: PathBuf,

    /// Max times to allow download of a particular file
    #[arg(long, default_value_t = 1)]
    max_times: u64,

    /// Files to block from download entirely at startup
    #[arg(long = "disallow", value_name = "PATH", default_values_t = [String::from("README.md")])]
    disallow: Vec<String>,
}

/// Resolve the effective bind address.
///
/// The BIND_ADDRESS environment variable wins over the flag, but only when
/// it parses as host:port with a port in range; anything else falls back to
/// the flag value.
fn resolve_bind_address(flag_address: &str) -> String {
    let env_address = std::env::var(BIND_ADDRESS_ENV).unwrap_or_default();

    let parts: Vec<&str> = env_address.split(':').collect();
    if parts.len() == 2 {
        if let Ok(port) = parts[1].parse::<u32>() {
            if port > 0 && port < 65535 {
                return env_address;
            }
        }
    }
    flag_address.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let tracker = Arc::new(AccessTracker::new(cli.file_dir, cli.max_times)?);
    info!(
        "Serving {} with a limit of {} downloads per file",
        tracker.root().display(),
        tracker.quota()
    );

    let gate = DownloadGate::new(tracker);
    for path in &cli.disallow {
        if gate.disallow_access(path) {
            info!("Blocked {} from download", path);
        } else {
            warn!("Cannot block {}: not a servable file", path);
        }
    }

    let app = gate.into_router().layer(TraceLayer::new_for_http());

    let address = resolve_bind_address(&cli.bind_address);
    let listener = tokio::net::TcpListener::bind(address.as_str()).await?;
    info!("Starting server on {}...", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
