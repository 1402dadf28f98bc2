//! Per-listener request dispatch.
//!
//! # Responsibilities
//! - Build the axum app for one listen address
//! - Resolve the location for each request (host + path)
//! - Enforce the location's access rules
//! - Run the listener's task: proxy upstream or synthesize a redirect
//! - Upgrade backend permanent redirects to HTTPS on the way back
//!
//! ```text
//! START → RESOLVE_ROUTE ──none──→ [NO_ROUTE] 404
//!              │
//!              ▼
//!         CHECK_ACCESS ──deny──→ [FORBIDDEN] 403
//!              │
//!              ▼
//!         SELECT_TASK ──proxy────→ [PROXIED]
//!                     └─redirect─→ [REDIRECTED]
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::HOST, HeaderName, Request, Response, Uri, Version},
    routing::any,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::ServerConfig;
use crate::http::request::{rewrite_uri, suppress_default_user_agent, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response;
use crate::net::listener::{RedirectTask, Task};
use crate::net::tls::crypto_provider;
use crate::observability::metrics;
use crate::routing::matcher::residual_path;
use crate::routing::{LocationMatch, Router};

/// One-shot upstream client for http and https destinations.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the upstream client.
pub fn upstream_client() -> Result<UpstreamClient, rustls::Error> {
    let connector = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(crypto_provider())?
        .https_or_http()
        .enable_http1()
        .build();
    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    /// Routes bound to this listener.
    pub router: Arc<Router>,
    /// Every route this process serves, used for redirect upgrades.
    pub all_routes: Arc<Router>,
    pub task: Task,
    pub client: UpstreamClient,
    /// Port of the preferred SSL listener, if any.
    pub ssl_port: Option<u16>,
}

/// HTTP app for one listen address.
pub struct HttpServer {
    router: axum::Router,
}

impl HttpServer {
    pub fn new(state: AppState, limits: &ServerConfig) -> Self {
        let router = Self::build_router(state, limits);
        Self { router }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, limits: &ServerConfig) -> axum::Router {
        axum::Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID)))
                    .layer(TimeoutLayer::new(Duration::from_secs(limits.write_timeout_secs))),
            )
    }

    pub fn into_router(self) -> axum::Router {
        self.router
    }
}

/// Host the request was addressed to, from the `Host` header or the URI authority.
fn request_host(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
}

fn task_label(task: &Task) -> &'static str {
    match task {
        Task::Proxy => "proxy",
        Task::Redirect(_) => "redirect",
    }
}

/// Main handler: route, check access, run the task.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let start_time = Instant::now();
    let task = task_label(&state.task);
    let host = request_host(&request).unwrap_or_default();
    let path = request.uri().path().to_string();

    // 1. Resolve location
    let Some(matched) = state.router.find_location(&host, &path) else {
        tracing::warn!(host = %host, path = %path, "No matching route found");
        metrics::record_route_miss();
        metrics::record_request(task, 404, start_time);
        return response::not_found();
    };

    // 2. Access control
    if !matched.location.access.is_allowed(remote_addr, request.headers()) {
        tracing::debug!(
            remote_addr = %remote_addr,
            route = %matched.route.name,
            location = %matched.location.pattern.as_str(),
            "Caller is not allowed"
        );
        metrics::record_access_denied();
        metrics::record_request(task, 403, start_time);
        return response::forbidden();
    }

    // 3. Task
    let response = match &state.task {
        Task::Proxy => proxy_task(&state, matched, request).await,
        Task::Redirect(redirect) => redirect_task(&state, redirect, &host, request.uri()),
    };

    tracing::debug!(
        host = %host,
        path = %path,
        status = response.status().as_u16(),
        elapsed = ?start_time.elapsed(),
        "Request handled"
    );
    metrics::record_request(task, response.status().as_u16(), start_time);
    response
}

/// Forward the request to the location's destination.
async fn proxy_task(state: &AppState, matched: LocationMatch<'_>, request: Request<Body>) -> Response<Body> {
    let (mut parts, body) = request.into_parts();

    let residual = residual_path(parts.uri.path(), matched.depth);
    let uri = match rewrite_uri(&matched.location.destination, residual, parts.uri.query()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(destination = %matched.location.destination, error = %e, "Failed to build upstream URI");
            return response::bad_gateway();
        }
    };
    tracing::debug!(destination = %uri, "Forwarding request");

    parts.uri = uri;
    parts.version = Version::HTTP_11;
    suppress_default_user_agent(&mut parts.headers);

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(upstream) => {
            let (parts, body) = upstream.into_parts();
            response::secure_redirect(Response::from_parts(parts, Body::new(body)), &state.all_routes, state.ssl_port)
        }
        Err(e) => {
            tracing::error!(destination = %matched.location.destination, error = %e, "Upstream error");
            response::bad_gateway()
        }
    }
}

/// Answer with a redirect to the HTTPS form of the requested URL.
fn redirect_task(state: &AppState, redirect: &RedirectTask, host: &str, uri: &Uri) -> Response<Body> {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    match Url::parse(&format!("http://{}{}", host, path_and_query)) {
        Ok(mut target) => {
            response::upgrade_to_tls(&mut target, state.ssl_port);
            response::redirect(redirect.status, &redirect.body, &target)
        }
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "Cannot build redirect target");
            response::not_found()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LocationConfig, RouteConfig};
    use crate::routing::{RegexCache, Route, RouteId};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn router() -> Arc<Router> {
        let config = RouteConfig {
            server_names: vec!["example.com".into()],
            interfaces: vec!["127.0.0.1:80".into()],
            ssl: None,
            locations: vec![
                LocationConfig {
                    location: "/private".into(),
                    // Never contacted: access is denied first.
                    destination: "http://10.255.255.1/".into(),
                    allow: vec!["10.0.0.0/24".into()],
                    deny: Some("all".into()),
                    src_ip_header: None,
                },
                LocationConfig {
                    location: "/".into(),
                    destination: "http://10.255.255.1/".into(),
                    ..Default::default()
                },
            ],
        };
        let route = Route::from_config(RouteId(0), "r", &config).unwrap();
        Arc::new(Router::new(vec![route], Arc::new(RegexCache::new())))
    }

    fn app(task: Task, ssl_port: Option<u16>) -> axum::Router {
        let routes = router();
        let state = AppState {
            router: routes.clone(),
            all_routes: routes,
            task,
            client: upstream_client().unwrap(),
            ssl_port,
        };
        HttpServer::new(state, &ServerConfig::default()).into_router()
    }

    fn request(host: &str, path: &str, peer: &str) -> Request<Body> {
        let mut request = Request::builder()
            .uri(path)
            .header(HOST, host)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>(peer.parse().unwrap()));
        request
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unknown_host_is_not_found() {
        let response = app(Task::Proxy, None)
            .oneshot(request("other.com", "/", "127.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn denied_caller_gets_forbidden() {
        let response = app(Task::Proxy, None)
            .oneshot(request("example.com", "/private/x", "10.0.1.5:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(response).await, "403 Forbidden");
    }

    #[tokio::test]
    async fn redirect_task_points_at_https() {
        let task = Task::Redirect(RedirectTask {
            status: StatusCode::MOVED_PERMANENTLY,
            body: "Moved permanently".into(),
        });
        let response = app(task, Some(8443))
            .oneshot(request("Example.com:8080", "/a/b?c=d", "127.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://example.com:8443/a/b?c=d"
        );
        assert_eq!(body_string(response).await, "Moved permanently");
    }

    #[tokio::test]
    async fn redirect_task_still_checks_access() {
        let task = Task::Redirect(RedirectTask {
            status: StatusCode::MOVED_PERMANENTLY,
            body: "Moved permanently".into(),
        });
        let response = app(task, None)
            .oneshot(request("example.com", "/private", "192.168.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
