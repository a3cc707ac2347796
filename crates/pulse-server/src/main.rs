//! # Pulse Server
//!
//! WebSocket server exposing Pulse routes.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! pulse
//!
//! # Run with custom config
//! pulse --config /path/to/pulse.toml
//!
//! # Run with environment variables
//! PULSE_PORT=8080 PULSE_HOST=0.0.0.0 PULSE_AUTH_TOKEN=secret pulse
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(about = "WebSocket server exposing Pulse routes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (default: pulse.toml, /etc/pulse/pulse.toml, ~/.config/pulse/pulse.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse=debug,tenvis_pulse_server=debug,tenvis_pulse_routes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load(cli.config.as_deref())?;

    tracing::info!("Starting Pulse server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
