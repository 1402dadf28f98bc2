//! vhost-proxy
//!
//! A virtual-host reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                   VHOST PROXY                     │
//!                        │                                                   │
//!     Client Request     │  ┌─────────┐    ┌─────────┐    ┌──────────────┐   │
//!     ───────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │   │
//!                        │  │listener │    │ server  │    │ host + path  │   │
//!                        │  │ + tls   │    └─────────┘    └──────┬───────┘   │
//!                        │  └─────────┘                          ▼           │
//!                        │                               ┌──────────────┐    │
//!                        │                               │   security   │    │
//!                        │                               │  allow/deny  │    │
//!                        │                               └──────┬───────┘    │
//!                        │                                      ▼            │
//!     Client Response    │  ┌─────────┐    ┌─────────────────────────────┐   │
//!     ◀──────────────────┼──│response │◀───│ task: proxy  │  redirect    │◀──┼── Backend
//!                        │  │ upgrade │    └─────────────────────────────┘   │
//!                        │  └─────────┘                                      │
//!                        │  config · lifecycle · observability               │
//!                        └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use vhost_proxy::config::{create_default_config, load_config, load_routes};
use vhost_proxy::lifecycle::{spawn_signal_handler, ProxyServer, Shutdown};
use vhost_proxy::observability::{logging, metrics};
use vhost_proxy::routing::{RegexCache, Router};

#[derive(Debug, Parser)]
#[command(name = "vhost-proxy", version, about = "Virtual-host reverse proxy")]
struct Cli {
    /// Path to the config file. Created with defaults when missing.
    #[arg(long, env = "PROXY_CONFIG", default_value = "/etc/reverseproxy/config.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, env = "PROXY_DEBUG")]
    debug: bool,

    /// Force colored log output.
    #[arg(long, env = "PROXY_FORCE_COLORS")]
    force_colors: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug, cli.force_colors);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vhost-proxy starting");

    if create_default_config(&cli.config)? {
        tracing::info!(
            path = %cli.config.display(),
            "Default configuration written, edit it and restart"
        );
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    tracing::info!(
        path = %cli.config.display(),
        listen_addresses = config.listen_addresses.len(),
        route_files = config.route_files.len(),
        "Configuration loaded"
    );

    let base_dir = cli.config.parent().unwrap_or_else(|| Path::new("."));
    let routes = load_routes(&config, base_dir)?;
    if routes.is_empty() {
        tracing::error!("No usable routes, refusing to start");
        return Err("no routes configured".into());
    }
    let router = Router::new(routes, std::sync::Arc::new(RegexCache::new()));
    tracing::info!(routes = router.len(), "Routes loaded");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Signals during startup must already request a graceful stop.
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    ProxyServer::new(config, router).run(&shutdown).await?;
    Ok(())
}
