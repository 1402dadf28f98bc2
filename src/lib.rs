//! Virtual-host reverse proxy library.
//!
//! Routes requests by host name and path prefix to upstream destinations,
//! with per-location allow/deny rules, SNI-selected certificates and
//! HTTP→HTTPS redirect listeners.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{ProxyServer, Shutdown};
pub use routing::Router;
