//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{
    ListenAddressConfig, LocationConfig, ProxyConfig, RouteConfig, TaskKind,
};
use crate::config::validation::{validate_config, validate_route, ValidationError};
use crate::routing::{Route, RouteError, RouteId};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode default config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid route '{path}': {source}")]
    Route {
        path: PathBuf,
        #[source]
        source: RouteError,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, content: &str) -> Result<(), ConfigError> {
    let io = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, content).map_err(io)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = read(path)?;
    let config: ProxyConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load every route file listed in the config.
///
/// Relative route file paths are resolved against `base_dir`. A route that
/// references an unknown interface is skipped with a warning; any other
/// problem fails the whole load.
pub fn load_routes(config: &ProxyConfig, base_dir: &Path) -> Result<Vec<Route>, ConfigError> {
    let mut routes = Vec::new();

    for file in &config.route_files {
        let path = base_dir.join(file);
        let content = read(&path)?;
        let route_config: RouteConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.clone());

        let unknown: Vec<&String> = route_config
            .interfaces
            .iter()
            .filter(|i| config.listen_address(i).is_none())
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(
                route = %name,
                interfaces = ?unknown,
                "Route references unknown listen addresses, skipping it"
            );
            continue;
        }

        let route = Route::from_config(RouteId(routes.len()), name, &route_config)
            .map_err(|source| ConfigError::Route {
                path: path.clone(),
                source,
            })?;

        validate_route(&route, config).map_err(ConfigError::Validation)?;

        tracing::debug!(
            route = %route.name,
            server_names = ?route.server_names,
            locations = route.locations.len(),
            "Route loaded"
        );
        routes.push(route);
    }

    Ok(routes)
}

/// Write a default config and example route if `path` is missing or empty.
///
/// Returns `true` when files were created.
pub fn create_default_config(path: &Path) -> Result<bool, ConfigError> {
    if fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
        return Ok(false);
    }

    let example_route = "routes/route1.toml";
    let config = ProxyConfig {
        listen_addresses: vec![
            ListenAddressConfig {
                address: "127.0.0.1:80".to_string(),
                ssl: false,
                task: TaskKind::Proxy,
                redirect: Default::default(),
            },
            ListenAddressConfig {
                address: "127.0.0.1:443".to_string(),
                ssl: true,
                task: TaskKind::Proxy,
                redirect: Default::default(),
            },
        ],
        route_files: vec![example_route.to_string()],
        ..Default::default()
    };

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let route_path = base_dir.join(example_route);
    if !fs::metadata(&route_path).map(|m| m.len() > 0).unwrap_or(false) {
        write(&route_path, &toml::to_string_pretty(&example_route_config())?)?;
    }

    write(path, &toml::to_string_pretty(&config)?)?;
    Ok(true)
}

fn example_route_config() -> RouteConfig {
    RouteConfig {
        server_names: vec!["localhost".into(), "127.0.0.1".into()],
        interfaces: vec!["127.0.0.1:80".into(), "127.0.0.1:443".into()],
        ssl: Some(crate::config::schema::TlsKeyCertConfig {
            cert: "/etc/reverseproxy/certs/localhost.crt".into(),
            key: "/etc/reverseproxy/certs/localhost.key".into(),
        }),
        locations: vec![
            LocationConfig {
                location: "/".into(),
                destination: "http://127.0.0.1:8080/".into(),
                ..Default::default()
            },
            LocationConfig {
                location: "/subroute".into(),
                destination: "http://127.0.0.1:8080/index.html".into(),
                allow: vec!["127.0.0.1".into(), "10.0.0.0/8".into()],
                deny: Some("all".into()),
                src_ip_header: None,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(create_default_config(&path).unwrap());
        assert!(!create_default_config(&path).unwrap());

        let config = load_config(&path).unwrap();
        assert_eq!(config.listen_addresses.len(), 2);
        assert!(dir.path().join("routes/route1.toml").exists());
    }

    #[test]
    fn skips_routes_with_unknown_interfaces() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("good.toml"),
            r#"
            server_names = ["Good.example"]
            interfaces = ["127.0.0.1:8080"]
            [[location]]
            location = "/"
            destination = "http://10.0.0.1:9000/"
            "#,
        )
        .unwrap();
        fs::write(
            dir.path().join("orphan.toml"),
            r#"
            server_names = ["orphan.example"]
            interfaces = ["127.0.0.1:9999"]
            [[location]]
            location = "/"
            destination = "http://10.0.0.1:9000/"
            "#,
        )
        .unwrap();

        let config: ProxyConfig = toml::from_str(
            r#"
            route_files = ["good.toml", "orphan.toml"]
            [[listen_addresses]]
            address = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        let routes = load_routes(&config, dir.path()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "good.toml");
        assert_eq!(routes[0].server_names, vec!["good.example"]);
    }

    #[test]
    fn invalid_destination_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.toml"),
            r#"
            server_names = ["h"]
            interfaces = ["127.0.0.1:8080"]
            [[location]]
            location = "/"
            destination = "::not a url::"
            "#,
        )
        .unwrap();

        let config: ProxyConfig = toml::from_str(
            r#"
            route_files = ["bad.toml"]
            [[listen_addresses]]
            address = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        assert!(matches!(
            load_routes(&config, dir.path()),
            Err(ConfigError::Route { .. })
        ));
    }
}
