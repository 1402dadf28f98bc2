//! Startup orchestration.
//!
//! # Responsibilities
//! - Build one listener per listen address, bound to the routes that
//!   reference it
//! - Load certificates for SSL addresses
//! - Start every listener concurrently and wait until they are bound
//! - Wait for all listeners to drain after shutdown
//!
//! # Design Decisions
//! - Fail fast: missing certificates or an empty route table abort startup
//! - One address failing to bind does not stop the others
//! - Startup fails only when no listener with routes came up

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::shutdown::{Shutdown, DEFAULT_GRACE_PERIOD};
use crate::config::ProxyConfig;
use crate::http::{upstream_client, AppState, HttpServer};
use crate::net::listener::{ListenAddress, Listener, ListenerError};
use crate::net::tls::{self, TlsError};
use crate::routing::Router;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to build upstream client: {0}")]
    Client(#[source] rustls::Error),

    #[error("no routes loaded")]
    NoRoutes,

    #[error("no listener with routes could be started")]
    NoListeners,
}

/// Owns the listeners of the process.
pub struct ProxyServer {
    config: ProxyConfig,
    router: Arc<Router>,
    grace_period: Duration,
}

/// A listener task that has started serving.
struct RunningListener {
    name: String,
    local_addr: SocketAddr,
    task: JoinHandle<Result<(), ListenerError>>,
}

/// Listeners that are up and serving.
pub struct RunningServer {
    listeners: Vec<RunningListener>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, router: Router) -> Self {
        Self {
            config,
            router: Arc::new(router),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override how long in-flight requests may run after shutdown starts.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Port of the first SSL listen address, used for HTTPS upgrades.
    fn ssl_port(&self) -> Option<u16> {
        self.config
            .listen_addresses
            .iter()
            .find(|a| a.ssl)
            .and_then(|a| a.address.parse::<SocketAddr>().ok())
            .map(|a| a.port())
    }

    fn build_listeners(&self) -> Result<Vec<(Listener, bool)>, StartupError> {
        let client = upstream_client().map_err(StartupError::Client)?;
        let provider = tls::crypto_provider();
        let ssl_port = self.ssl_port();

        let mut listeners = Vec::with_capacity(self.config.listen_addresses.len());
        for config in &self.config.listen_addresses {
            let address = ListenAddress::from_config(config)?;
            let routes = self.router.for_interface(&address.name);
            if routes.is_empty() {
                tracing::warn!(address = %address.name, "No routes bound to listen address");
            }

            let tls = if address.ssl {
                let index = tls::bind_certificates(&address.name, routes.routes(), &provider)?;
                tracing::info!(
                    address = %address.name,
                    names = ?index.names().collect::<Vec<_>>(),
                    "Certificates loaded"
                );
                Some(tls::server_config(index, provider.clone())?)
            } else {
                None
            };

            let has_routes = !routes.is_empty();
            let state = AppState {
                router: Arc::new(routes),
                all_routes: self.router.clone(),
                task: address.task.clone(),
                client: client.clone(),
                ssl_port,
            };
            let app = HttpServer::new(state, &self.config.server).into_router();
            listeners.push((Listener::new(address, app, tls, self.config.server.clone()), has_routes));
        }

        Ok(listeners)
    }

    /// Start every listener and wait until each has bound or failed.
    pub async fn start(self, shutdown: &Shutdown) -> Result<RunningServer, StartupError> {
        if self.router.is_empty() {
            return Err(StartupError::NoRoutes);
        }

        let listeners = self.build_listeners()?;

        let mut pending = Vec::with_capacity(listeners.len());
        for (listener, has_routes) in listeners {
            let name = listener.address().name.clone();
            let handle = listener.handle();
            let task = listener.spawn(shutdown.subscribe(), self.grace_period);
            pending.push((name, handle, task, has_routes));
        }

        let mut running = Vec::with_capacity(pending.len());
        let mut serving_routes = 0;
        for (name, handle, task, has_routes) in pending {
            match handle.listening().await {
                Some(local_addr) => {
                    tracing::info!(address = %name, local_addr = %local_addr, "Listener started");
                    if has_routes {
                        serving_routes += 1;
                    }
                    running.push(RunningListener {
                        name,
                        local_addr,
                        task,
                    });
                }
                None => match task.await {
                    Ok(Err(e)) => tracing::error!(address = %name, error = %e, "Listener failed to start"),
                    Ok(Ok(())) => tracing::error!(address = %name, "Listener exited before binding"),
                    Err(e) => tracing::error!(address = %name, error = %e, "Listener task panicked"),
                },
            }
        }

        if serving_routes == 0 {
            shutdown.trigger();
            return Err(StartupError::NoListeners);
        }

        Ok(RunningServer { listeners: running })
    }

    /// Start, then serve until `shutdown` fires and every listener has drained.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        self.start(shutdown).await?.wait().await;
        Ok(())
    }
}

impl RunningServer {
    /// Bound socket address of the listener configured as `name`.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.local_addr)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Wait for every listener to stop.
    pub async fn wait(self) {
        for listener in self.listeners {
            match listener.task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(address = %listener.name, error = %e, "Listener error"),
                Err(e) => tracing::error!(address = %listener.name, error = %e, "Listener task panicked"),
            }
        }
        tracing::info!("Shutdown complete");
    }
}
