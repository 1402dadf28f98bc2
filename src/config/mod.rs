//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml
//!     → loader.rs (parse & deserialize, default file generation)
//!     → validation.rs (listen address checks)
//!     → ProxyConfig
//!
//! route files (listed in config.toml)
//!     → loader.rs (parse, drop routes with unknown interfaces)
//!     → routing::Route (destinations and access rules parsed)
//!     → validation.rs (TLS pairs, request loops)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{create_default_config, load_config, load_routes, ConfigError};
pub use schema::{
    ListenAddressConfig, LocationConfig, ObservabilityConfig, ProxyConfig, RedirectConfig,
    RouteConfig, ServerConfig, TaskKind, TlsKeyCertConfig,
};
pub use validation::ValidationError;
