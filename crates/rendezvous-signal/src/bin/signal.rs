//! Rendezvous Signal Server
//!
//! WebSocket signaling relay pairing operators with participants.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, or the per-user config file if present
//! rendezvous-signal --port 8080
//!
//! # Explicit config file
//! rendezvous-signal --config /etc/rendezvous/signal.toml
//!
//! # Print a commented sample config
//! rendezvous-signal --print-config
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rendezvous_core::Config;
use rendezvous_signal::SignalServer;

#[derive(Parser, Debug)]
#[command(name = "rendezvous-signal")]
#[command(about = "Rendezvous signaling relay for operator/participant pairing")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "RENDEZVOUS_PORT")]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long, env = "RENDEZVOUS_BIND")]
    bind: Option<IpAddr>,

    /// Config file path (defaults to the per-user config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a sample config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::sample());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Config::load_from(path)?
        }
        None => Config::load(),
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    let addr = SocketAddr::new(config.server.bind, config.server.port);

    info!("Starting Rendezvous Signal Server");
    info!(
        "Pending sessions live {}s, claims capped at {} per {}s per address",
        config.sessions.ttl_secs, config.rate_limit.max_attempts, config.rate_limit.window_secs
    );

    let server = SignalServer::new(&config);
    server.serve(addr).await?;

    Ok(())
}
