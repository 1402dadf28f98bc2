//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use vhost_proxy::config::{
    ListenAddressConfig, LocationConfig, ProxyConfig, RouteConfig, TaskKind, TlsKeyCertConfig,
};
use vhost_proxy::lifecycle::{ProxyServer, RunningServer, Shutdown, StartupError};
use vhost_proxy::routing::{RegexCache, Route, RouteId, Router};

/// Reserve a local port that is currently free.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Read the request head (up to and including the blank line).
async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a backend that answers every request with `respond(request_head)`,
/// a complete raw HTTP response.
pub async fn start_raw_backend<F>(addr: SocketAddr, delay: Duration, respond: F)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let respond = respond.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        tokio::time::sleep(delay).await;
                        let response = respond(&head);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, body: &'static str) {
    start_raw_backend(addr, Duration::ZERO, move |_| ok_response(body)).await;
}

/// Start a backend that echoes the request head it received as the body.
pub async fn start_echo_backend(addr: SocketAddr) {
    start_raw_backend(addr, Duration::ZERO, ok_response).await;
}

/// Start a backend that waits `delay` before answering.
pub async fn start_slow_backend(addr: SocketAddr, delay: Duration, body: &'static str) {
    start_raw_backend(addr, delay, move |_| ok_response(body)).await;
}

/// Start a backend that answers with a permanent redirect to `location`.
pub async fn start_redirecting_backend(addr: SocketAddr, location: String) {
    start_raw_backend(addr, Duration::ZERO, move |_| {
        format!(
            "HTTP/1.1 301 Moved Permanently\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            location
        )
    })
    .await;
}

pub fn listen(addr: SocketAddr, ssl: bool, task: TaskKind) -> ListenAddressConfig {
    ListenAddressConfig {
        address: addr.to_string(),
        ssl,
        task,
        redirect: Default::default(),
    }
}

pub fn location(pattern: &str, destination: &str) -> LocationConfig {
    LocationConfig {
        location: pattern.into(),
        destination: destination.into(),
        ..Default::default()
    }
}

pub fn route(interfaces: &[SocketAddr], locations: Vec<LocationConfig>) -> RouteConfig {
    RouteConfig {
        server_names: vec!["127.0.0.1".into(), "localhost".into()],
        interfaces: interfaces.iter().map(|a| a.to_string()).collect(),
        ssl: None,
        locations,
    }
}

/// Write a self-signed certificate for localhost into `dir`.
pub fn self_signed(dir: &Path) -> TlsKeyCertConfig {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .unwrap();
    let cert_path = dir.join("localhost.crt");
    let key_path = dir.join("localhost.key");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    TlsKeyCertConfig {
        cert: cert_path.display().to_string(),
        key: key_path.display().to_string(),
    }
}

pub fn build_router(routes: &[RouteConfig]) -> Router {
    let routes = routes
        .iter()
        .enumerate()
        .map(|(i, r)| Route::from_config(RouteId(i), format!("route{}", i), r).unwrap())
        .collect();
    Router::new(routes, Arc::new(RegexCache::new()))
}

/// Start a proxy for `listen_addresses` and `routes`.
pub async fn try_start_proxy(
    listen_addresses: Vec<ListenAddressConfig>,
    routes: &[RouteConfig],
    grace_period: Duration,
) -> Result<(Shutdown, RunningServer), StartupError> {
    let config = ProxyConfig {
        listen_addresses,
        ..Default::default()
    };
    let shutdown = Shutdown::new();
    let running = ProxyServer::new(config, build_router(routes))
        .with_grace_period(grace_period)
        .start(&shutdown)
        .await?;
    Ok((shutdown, running))
}

pub async fn start_proxy(
    listen_addresses: Vec<ListenAddressConfig>,
    routes: &[RouteConfig],
) -> (Shutdown, RunningServer) {
    try_start_proxy(listen_addresses, routes, Duration::from_secs(2))
        .await
        .unwrap()
}

/// Test client that never follows redirects and trusts any certificate.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
