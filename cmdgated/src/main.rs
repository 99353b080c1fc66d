// ABOUTME: runs the gateway daemon that mediates between chat clients and the agent.
// ABOUTME: proposes shell commands, runs approved ones in scratch dirs, and returns results.

mod actions;
mod agent;
mod audit;
mod batch;
mod chat;
mod config;
mod policy;
mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let args = config::Args::parse();
    let config = config::Config::try_from(args)?;
    server::run(config).await
}
