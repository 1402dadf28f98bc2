//! Configuration schema definitions.
//!
//! Two file kinds are described here: the main config file (server limits,
//! listen addresses, route file list) and the per-route files it references.
//! All types derive Serde traits for (de)serialization from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Serving-layer limits shared by every listener.
    pub server: ServerConfig,

    /// Addresses to listen on. One listener is started per entry.
    pub listen_addresses: Vec<ListenAddressConfig>,

    /// Route files to load, relative to the config file's directory.
    pub route_files: Vec<String>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Look up a listen address by its `host:port` identifier.
    pub fn listen_address(&self, address: &str) -> Option<&ListenAddressConfig> {
        self.listen_addresses.iter().find(|a| a.address == address)
    }
}

/// Limits applied to every listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum size of the request head in bytes.
    pub max_header_size: usize,

    /// Time allowed to read the request head, in seconds.
    pub read_timeout_secs: u64,

    /// Time allowed to produce a full response, in seconds.
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_header_size: 16 * 1024,
            read_timeout_secs: 10,
            write_timeout_secs: 10,
        }
    }
}

/// Kind of work a listen address performs for matched requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Proxy,
    #[serde(alias = "httpredirect")]
    Redirect,
}

/// A bind target plus its TLS and task settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenAddressConfig {
    /// Bind address (e.g., "0.0.0.0:443"). Also the identifier routes use.
    pub address: String,

    /// Serve TLS on this address.
    #[serde(default)]
    pub ssl: bool,

    #[serde(default)]
    pub task: TaskKind,

    /// Only used when `task = "redirect"`.
    #[serde(default)]
    pub redirect: RedirectConfig,
}

/// Response settings for redirect listeners.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Response body. Empty means "Moved permanently".
    pub body: String,

    /// Response status. 0 or an invalid code means 301.
    pub http_code: u16,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            body: String::new(),
            http_code: 301,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A route file: virtual host names, the interfaces it is served on and its locations.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouteConfig {
    /// Host names this route answers for.
    pub server_names: Vec<String>,

    /// Listen address identifiers (`host:port`) this route is bound to.
    pub interfaces: Vec<String>,

    /// Certificate and key, required when any interface uses SSL.
    pub ssl: Option<TlsKeyCertConfig>,

    #[serde(rename = "location")]
    pub locations: Vec<LocationConfig>,
}

/// Paths to a PEM certificate chain and private key.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TlsKeyCertConfig {
    pub cert: String,
    pub key: String,
}

impl TlsKeyCertConfig {
    pub fn is_empty(&self) -> bool {
        self.cert.is_empty() || self.key.is_empty()
    }
}

/// A path prefix mapped to a destination URL.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LocationConfig {
    /// Path pattern, e.g. `/api/{v[0-9]+}/`.
    pub location: String,

    /// Absolute destination URL.
    pub destination: String,

    /// IP literals or CIDR ranges exempt from `deny`.
    pub allow: Vec<String>,

    /// `all` to deny every caller not listed in `allow`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<String>,

    /// Header carrying the caller address instead of the peer address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_ip_header: Option<String>,
}
