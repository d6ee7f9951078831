//! Forward HTTP proxy binary.
//!
//! Accepts client connections, tunnels `CONNECT` traffic to its destination
//! and re-issues plain requests to the origin, streaming the response back
//! with an accumulated `Via` chain. Runs in the foreground until
//! interrupted.

use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::loader::{load_config, ConfigError};
use forward_proxy::config::validation::validate_config;
use forward_proxy::net::Listener;
use forward_proxy::{ProxyConfig, ProxyServer, Shutdown};

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP proxy with CONNECT tunneling", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long)]
    binding: Option<String>,

    /// Maximum concurrently handled connections
    #[arg(short = 'c', long = "threads")]
    threads: Option<usize>,

    /// Per-connection timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Load the config file (or defaults) and apply flag overrides.
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(binding) = self.binding {
            config.listener.bind_address = binding;
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(threads) = self.threads {
            config.listener.workers = threads;
        }
        if let Some(timeout) = self.timeout {
            config.timeouts.request_secs = timeout;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    forward_proxy::observability::logging::init(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        port = config.listener.port,
        workers = config.listener.workers,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        forward_proxy::lifecycle::signals::wait_for_interrupt().await;
        shutdown.trigger();
    });

    let server = ProxyServer::new(config);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
