//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Listen addresses must be `ip:port` and unique
//! - Routes on SSL addresses must carry an existing cert/key pair
//! - Reject destinations that loop back into the proxy itself
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::routing::Route;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listen address '{0}' is not a valid ip:port")]
    InvalidListenAddress(String),

    #[error("listen address '{0}' is configured more than once")]
    DuplicateListenAddress(String),

    #[error("route '{route}' is served over SSL but has no cert/key configured")]
    MissingTlsPair { route: String },

    #[error("route '{route}': {kind} file '{path}' not found")]
    TlsFileNotFound {
        route: String,
        kind: &'static str,
        path: String,
    },

    #[error("route '{route}': destination '{destination}' points back at this proxy")]
    RequestLoop { route: String, destination: String },
}

/// Check listen addresses.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for address in &config.listen_addresses {
        if address.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidListenAddress(address.address.clone()));
        }
        if !seen.insert(address.address.as_str()) {
            errors.push(ValidationError::DuplicateListenAddress(address.address.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a loaded route against the listen addresses it is bound to.
pub fn validate_route(route: &Route, config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addresses: Vec<_> = route
        .interfaces
        .iter()
        .filter_map(|i| config.listen_address(i))
        .collect();

    if addresses.iter().any(|a| a.ssl) {
        match &route.tls {
            None => errors.push(ValidationError::MissingTlsPair {
                route: route.name.clone(),
            }),
            Some(pair) => {
                for (kind, path) in [("cert", &pair.cert), ("key", &pair.key)] {
                    if !path.exists() {
                        errors.push(ValidationError::TlsFileNotFound {
                            route: route.name.clone(),
                            kind,
                            path: path.display().to_string(),
                        });
                    }
                }
            }
        }
    }

    let listen_ports: Vec<u16> = addresses
        .iter()
        .filter_map(|a| a.address.parse::<SocketAddr>().ok())
        .map(|a| a.port())
        .collect();

    for location in &route.locations {
        let destination = &location.destination;
        let port = destination.port_or_known_default();
        let local = destination.host_str().map(is_local_host).unwrap_or(false);
        if local && port.map(|p| listen_ports.contains(&p)).unwrap_or(false) {
            errors.push(ValidationError::RequestLoop {
                route: route.name.clone(),
                destination: destination.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| ip.is_loopback() || ip.is_unspecified())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ListenAddressConfig, LocationConfig, RouteConfig, TaskKind};
    use crate::routing::RouteId;

    fn listen(address: &str, ssl: bool) -> ListenAddressConfig {
        ListenAddressConfig {
            address: address.into(),
            ssl,
            task: TaskKind::Proxy,
            redirect: Default::default(),
        }
    }

    fn route(interfaces: &[&str], destination: &str) -> Route {
        let config = RouteConfig {
            server_names: vec!["h".into()],
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            ssl: None,
            locations: vec![LocationConfig {
                location: "/".into(),
                destination: destination.into(),
                ..Default::default()
            }],
        };
        Route::from_config(RouteId(0), "test.toml", &config).unwrap()
    }

    #[test]
    fn rejects_bad_and_duplicate_addresses() {
        let config = ProxyConfig {
            listen_addresses: vec![listen("nope", false), listen("127.0.0.1:80", false), listen("127.0.0.1:80", false)],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn ssl_route_requires_pair() {
        let config = ProxyConfig {
            listen_addresses: vec![listen("127.0.0.1:443", true)],
            ..Default::default()
        };
        let errors = validate_route(&route(&["127.0.0.1:443"], "http://10.0.0.1/"), &config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::MissingTlsPair { .. }));
    }

    #[test]
    fn detects_request_loop() {
        let config = ProxyConfig {
            listen_addresses: vec![listen("0.0.0.0:8080", false)],
            ..Default::default()
        };
        let looped = route(&["0.0.0.0:8080"], "http://127.0.0.1:8080/");
        assert!(matches!(
            validate_route(&looped, &config).unwrap_err()[0],
            ValidationError::RequestLoop { .. }
        ));

        let fine = route(&["0.0.0.0:8080"], "http://127.0.0.1:9000/");
        assert!(validate_route(&fine, &config).is_ok());
    }
}
