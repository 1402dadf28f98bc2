//! Listen addresses and the per-address server.
//!
//! # Responsibilities
//! - Turn listen address config into a typed bind target and task
//! - Serve one axum app per address, plain or TLS
//! - Apply header size and read timeout limits
//! - Stop accepting on shutdown and drain within a deadline

use axum::http::StatusCode;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::schema::{ListenAddressConfig, RedirectConfig, ServerConfig, TaskKind};
use crate::lifecycle::triggered;

/// Smallest read buffer hyper accepts.
const MIN_HEADER_BUFFER: usize = 8192;

pub const DEFAULT_REDIRECT_BODY: &str = "Moved permanently";

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("failed to serve on {address}: {source}")]
    Serve {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Synthesized redirect response settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTask {
    pub status: StatusCode,
    pub body: String,
}

impl From<&RedirectConfig> for RedirectTask {
    fn from(config: &RedirectConfig) -> Self {
        let body = if config.body.is_empty() {
            DEFAULT_REDIRECT_BODY.to_string()
        } else {
            config.body.clone()
        };
        let status = StatusCode::from_u16(config.http_code).unwrap_or(StatusCode::MOVED_PERMANENTLY);
        Self { status, body }
    }
}

/// What a listener does with a request once its location is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Proxy,
    Redirect(RedirectTask),
}

/// A validated listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    /// Identifier used by routes, exactly as configured.
    pub name: String,
    pub addr: SocketAddr,
    pub ssl: bool,
    pub task: Task,
}

impl ListenAddress {
    pub fn from_config(config: &ListenAddressConfig) -> Result<Self, ListenerError> {
        let addr = config
            .address
            .parse()
            .map_err(|_| ListenerError::InvalidAddress(config.address.clone()))?;
        let task = match config.task {
            TaskKind::Proxy => Task::Proxy,
            TaskKind::Redirect => Task::Redirect(RedirectTask::from(&config.redirect)),
        };
        Ok(Self {
            name: config.address.clone(),
            addr,
            ssl: config.ssl,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// A listener ready to be started.
pub struct Listener {
    address: ListenAddress,
    app: axum::Router,
    tls: Option<RustlsConfig>,
    limits: ServerConfig,
    handle: Handle,
}

impl Listener {
    pub fn new(address: ListenAddress, app: axum::Router, tls: Option<RustlsConfig>, limits: ServerConfig) -> Self {
        Self {
            address,
            app,
            tls,
            limits,
            handle: Handle::new(),
        }
    }

    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Handle for observing when the socket is bound.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Serve until `shutdown` fires, then drain for at most `grace_period`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>, grace_period: Duration) -> JoinHandle<Result<(), ListenerError>> {
        let handle = self.handle.clone();
        let name = self.address.name.clone();
        tokio::spawn(async move {
            triggered(shutdown).await;
            tracing::info!(address = %name, connections = handle.connection_count(), "Listener stopping");
            handle.graceful_shutdown(Some(grace_period));
        });

        tokio::spawn(self.serve())
    }

    async fn serve(self) -> Result<(), ListenerError> {
        let addr = self.address.addr;
        let header_buffer = self.limits.max_header_size.max(MIN_HEADER_BUFFER);
        let read_timeout = Duration::from_secs(self.limits.read_timeout_secs);
        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();

        let result = match self.tls {
            Some(tls) => {
                let mut server = axum_server::bind_rustls(addr, tls).handle(self.handle);
                server
                    .http_builder()
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(read_timeout)
                    .max_buf_size(header_buffer);
                tracing::info!(address = %addr, tls = true, "Listener starting");
                server.serve(app).await
            }
            None => {
                let mut server = axum_server::bind(addr).handle(self.handle);
                server
                    .http_builder()
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(read_timeout)
                    .max_buf_size(header_buffer);
                tracing::info!(address = %addr, tls = false, "Listener starting");
                server.serve(app).await
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(address = %addr, "Listener stopped");
                Ok(())
            }
            Err(source) => {
                tracing::error!(address = %addr, error = %source, "Listener failed");
                Err(ListenerError::Serve { address: addr, source })
            }
        }
    }
}
