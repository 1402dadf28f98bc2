//! Route lookup.
//!
//! # Responsibilities
//! - Hold the loaded routes and their locations
//! - Look up the location for a (host, path) pair
//! - Return the matched location or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction, shared via `Arc`
//! - Routes are searched in load order, locations in declaration order
//! - First match wins, not longest match: specific locations must be
//!   declared before general ones
//! - `/` is only used as the fallback when no other location matches

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::config::schema::{LocationConfig, RouteConfig};
use crate::routing::matcher::{normalize_host, split_segments, PathPattern};
use crate::routing::regex_cache::RegexCache;
use crate::security::access_control::{AccessPolicy, AccessPolicyError};

/// Index of a route in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(pub usize);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("location '{location}' has an invalid destination '{destination}': {reason}")]
    InvalidDestination {
        location: String,
        destination: String,
        reason: String,
    },

    #[error("location '{location}': {source}")]
    Access {
        location: String,
        #[source]
        source: AccessPolicyError,
    },
}

/// Certificate and key file paths for a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsKeyPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// A path pattern mapped to a destination.
#[derive(Debug, Clone)]
pub struct Location {
    pub pattern: PathPattern,
    pub destination: Url,
    pub access: AccessPolicy,
}

impl Location {
    pub fn from_config(config: &LocationConfig) -> Result<Self, RouteError> {
        let invalid = |reason: String| RouteError::InvalidDestination {
            location: config.location.clone(),
            destination: config.destination.clone(),
            reason,
        };

        let destination = Url::parse(config.destination.trim()).map_err(|e| invalid(e.to_string()))?;
        if destination.cannot_be_a_base() || destination.host_str().is_none() {
            return Err(invalid("destination must be an absolute URL with a host".to_string()));
        }

        let access = AccessPolicy::from_config(
            &config.allow,
            config.deny.as_deref(),
            config.src_ip_header.as_deref(),
        )
        .map_err(|source| RouteError::Access {
            location: config.location.clone(),
            source,
        })?;

        Ok(Self {
            pattern: PathPattern::parse(&config.location),
            destination,
            access,
        })
    }
}

/// A virtual host: its names, interfaces, certificate and locations.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: RouteId,
    /// Source of the route, usually the route file name.
    pub name: String,
    /// Lowercased host names.
    pub server_names: Vec<String>,
    /// Listen address identifiers.
    pub interfaces: Vec<String>,
    pub tls: Option<TlsKeyPair>,
    pub locations: Vec<Location>,
    default_location: Option<usize>,
}

impl Route {
    pub fn from_config(
        id: RouteId,
        name: impl Into<String>,
        config: &RouteConfig,
    ) -> Result<Self, RouteError> {
        let locations = config
            .locations
            .iter()
            .map(Location::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let default_location = locations.iter().position(|l| l.pattern.is_root());

        let tls = config
            .ssl
            .as_ref()
            .filter(|pair| !pair.is_empty())
            .map(|pair| TlsKeyPair {
                cert: PathBuf::from(&pair.cert),
                key: PathBuf::from(&pair.key),
            });

        Ok(Self {
            id,
            name: name.into(),
            server_names: config.server_names.iter().map(|n| n.trim().to_lowercase()).collect(),
            interfaces: config.interfaces.clone(),
            tls,
            locations,
            default_location,
        })
    }

    pub fn default_location(&self) -> Option<&Location> {
        self.default_location.map(|i| &self.locations[i])
    }

    pub fn serves_host(&self, host: &str) -> bool {
        self.server_names.iter().any(|n| n == host)
    }

    pub fn has_interface(&self, address: &str) -> bool {
        self.interfaces.iter().any(|i| i == address)
    }

    /// Find the first location whose segments are all satisfied by `path`,
    /// falling back to the `/` location.
    fn find_location(&self, path: &[&str], cache: &RegexCache) -> Option<LocationMatch<'_>> {
        self.locations
            .iter()
            .filter(|l| !l.pattern.is_root())
            .find(|l| l.pattern.matches(path, cache))
            .or_else(|| self.default_location())
            .map(|location| LocationMatch {
                route: self,
                depth: location.pattern.segments().len(),
                location,
            })
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy)]
pub struct LocationMatch<'a> {
    pub route: &'a Route,
    pub location: &'a Location,
    /// Number of leading request path segments consumed by the location.
    pub depth: usize,
}

/// Immutable route table.
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<Arc<Route>>,
    regex_cache: Arc<RegexCache>,
}

impl Router {
    /// Create a router and compile every regex segment up front.
    pub fn new(routes: Vec<Route>, regex_cache: Arc<RegexCache>) -> Self {
        for pattern in routes
            .iter()
            .flat_map(|r| r.locations.iter())
            .flat_map(|l| l.pattern.regex_sources())
        {
            regex_cache.get(pattern);
        }

        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
            regex_cache,
        }
    }

    /// Subset of this router bound to one listen address.
    pub fn for_interface(&self, address: &str) -> Router {
        Router {
            routes: self
                .routes
                .iter()
                .filter(|r| r.has_interface(address))
                .cloned()
                .collect(),
            regex_cache: self.regex_cache.clone(),
        }
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Look up the location serving `host` and `path`.
    pub fn find_location(&self, host: &str, path: &str) -> Option<LocationMatch<'_>> {
        let host = normalize_host(host);
        let segments = split_segments(path);

        self.routes
            .iter()
            .filter(|r| r.serves_host(&host))
            .find_map(|r| r.find_location(&segments, &self.regex_cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(pattern: &str, destination: &str) -> LocationConfig {
        LocationConfig {
            location: pattern.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    fn route(names: &[&str], locations: Vec<LocationConfig>) -> RouteConfig {
        RouteConfig {
            server_names: names.iter().map(|s| s.to_string()).collect(),
            interfaces: vec!["127.0.0.1:80".into()],
            ssl: None,
            locations,
        }
    }

    fn router(configs: Vec<RouteConfig>) -> Router {
        let routes = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Route::from_config(RouteId(i), format!("r{}", i), c).unwrap())
            .collect();
        Router::new(routes, Arc::new(RegexCache::new()))
    }

    fn destination_of(router: &Router, host: &str, path: &str) -> Option<String> {
        router
            .find_location(host, path)
            .map(|m| m.location.destination.to_string())
    }

    #[test]
    fn host_match_is_case_insensitive() {
        let r = router(vec![route(&["Example.com"], vec![location("/", "http://a/")])]);
        assert_eq!(destination_of(&r, "EXAMPLE.com:8080", "/x"), Some("http://a/".into()));
        assert_eq!(destination_of(&r, "other.com", "/x"), None);
    }

    #[test]
    fn first_declared_match_wins() {
        let r = router(vec![route(
            &["h"],
            vec![
                location("/api", "http://general/"),
                location("/api/v1", "http://specific/"),
                location("/", "http://root/"),
            ],
        )]);
        assert_eq!(destination_of(&r, "h", "/api/v1/users"), Some("http://general/".into()));
        assert_eq!(destination_of(&r, "h", "/other"), Some("http://root/".into()));
    }

    #[test]
    fn falls_back_to_default_then_none() {
        let r = router(vec![route(&["h"], vec![location("/api", "http://api/")])]);
        assert_eq!(destination_of(&r, "h", "/api"), Some("http://api/".into()));
        assert_eq!(destination_of(&r, "h", "/"), None);
        assert_eq!(destination_of(&r, "h", "/ap"), None);
    }

    #[test]
    fn root_declared_first_is_only_a_fallback() {
        let r = router(vec![route(
            &["h"],
            vec![location("/", "http://root/"), location("/a", "http://a/")],
        )]);
        assert_eq!(destination_of(&r, "h", "/a/b"), Some("http://a/".into()));
    }

    #[test]
    fn invalid_regex_excludes_location() {
        let r = router(vec![route(
            &["h"],
            vec![
                location("/u/{([}", "http://broken/"),
                location("/u/{^[0-9]+$}", "http://numeric/"),
                location("/", "http://root/"),
            ],
        )]);
        assert_eq!(destination_of(&r, "h", "/u/12"), Some("http://numeric/".into()));
        assert_eq!(destination_of(&r, "h", "/u/ab"), Some("http://root/".into()));
    }

    #[test]
    fn later_route_used_when_earlier_has_no_match() {
        let r = router(vec![
            route(&["h"], vec![location("/only", "http://first/")]),
            route(&["h"], vec![location("/", "http://second/")]),
        ]);
        assert_eq!(destination_of(&r, "h", "/only"), Some("http://first/".into()));
        assert_eq!(destination_of(&r, "h", "/else"), Some("http://second/".into()));
    }

    #[test]
    fn match_reports_owner_and_depth() {
        let r = router(vec![route(&["h"], vec![location("/a/b/", "http://x/")])]);
        let m = r.find_location("h", "/a/b/c").unwrap();
        assert_eq!(m.route.id, RouteId(0));
        assert_eq!(m.depth, 2);
    }

    #[test]
    fn for_interface_filters_routes() {
        let mut other = route(&["o"], vec![location("/", "http://o/")]);
        other.interfaces = vec!["127.0.0.1:443".into()];
        let r = router(vec![route(&["h"], vec![location("/", "http://h/")]), other]);
        assert_eq!(r.for_interface("127.0.0.1:80").len(), 1);
        assert_eq!(r.for_interface("127.0.0.1:443").len(), 1);
        assert!(r.for_interface("0.0.0.0:1").is_empty());
    }

    #[test]
    fn rejects_relative_destination() {
        let config = route(&["h"], vec![location("/", "not a url")]);
        assert!(matches!(
            Route::from_config(RouteId(0), "bad", &config),
            Err(RouteError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn regexes_are_compiled_at_load() {
        let cache = Arc::new(RegexCache::new());
        let config = route(&["h"], vec![location("/{^a}/{^b}", "http://x/")]);
        let routes = vec![Route::from_config(RouteId(0), "r", &config).unwrap()];
        let _router = Router::new(routes, cache.clone());
        assert_eq!(cache.len(), 2);
    }
}
