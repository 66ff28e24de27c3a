//! # Hydra Coordinator
//!
//! Drives a set of local Hydra head nodes, one per party: head lifecycle commands,
//! transaction build/sign/submit and snapshot queries behind one HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod state;

use config::CoordinatorConfig;
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "hydra-coord", version, about = "Coordinator for local Hydra head nodes")]
struct Cli {
    /// Path to the coordinator configuration file.
    #[arg(long, env = "HYDRA_COORD_CONFIG", default_value = "hydra-coord.json")]
    config: PathBuf,

    /// Address the HTTP API listens on.
    #[arg(long, env = "HYDRA_COORD_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
}

/// Run the coordinator server.
pub async fn run_server(config: CoordinatorConfig, addr: SocketAddr) -> anyhow::Result<()> {
    info!(
        parties = config.parties.len(),
        key_store = %config.key_store.display(),
        "Hydra coordinator starting"
    );

    let state = AppState::from_config(config);
    let app = api::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = CoordinatorConfig::load(&cli.config)?;
    run_server(config, cli.listen).await
}
