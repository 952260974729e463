//! Scheduling optimizer HTTP server.
//!
//! # Usage
//!
//! ```text
//! prodsched-server --config prodsched.toml --port 5000
//! prodsched-server --print-config > prodsched.toml
//! ```
//!
//! # Environment Variables
//!
//! - `PRODSCHED_HOST`: Server host (default: 0.0.0.0)
//! - `PRODSCHED_PORT`: Server port (default: 5000)
//! - `RUST_LOG`: Log filter (default: info)

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prodsched::{build_router, OptimizerService, ServiceConfig};

#[derive(Parser)]
#[command(name = "prodsched-server", about = "Production scheduling optimizer")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind, overrides the config file.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overrides the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let addr = config.bind_addr()?;
    let app = build_router(OptimizerService::new(config));

    info!(%addr, "prodsched server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
