//! Response construction and transformation.
//!
//! # Responsibilities
//! - Build the synthesized responses (403, 404, 502, redirects)
//! - Upgrade backend-issued permanent redirects to HTTPS when this proxy
//!   serves the target and has an SSL listener

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use url::Url;

use crate::routing::Router;

fn plain_text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

pub fn forbidden() -> Response<Body> {
    plain_text(StatusCode::FORBIDDEN, "403 Forbidden")
}

pub fn not_found() -> Response<Body> {
    plain_text(StatusCode::NOT_FOUND, "404 Not Found")
}

pub fn bad_gateway() -> Response<Body> {
    plain_text(StatusCode::BAD_GATEWAY, "502 Bad Gateway")
}

pub fn redirect(status: StatusCode, body: &str, target: &Url) -> Response<Body> {
    let mut response = plain_text(status, body);
    match HeaderValue::from_str(target.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect target").into_response(),
    }
}

/// Switch `url` to `https`, pointing at `ssl_port` (omitted when it is 443).
pub fn upgrade_to_tls(url: &mut Url, ssl_port: Option<u16>) {
    if url.set_scheme("https").is_err() {
        return;
    }
    // `set_port` drops the port when it equals the scheme default.
    let _ = url.set_port(ssl_port);
}

/// Rewrite a backend's `301` to the HTTPS listener when possible.
///
/// Only applies when the redirect target is plain HTTP, the process has an
/// SSL listener (`ssl_port`) and `routes` serve the target host and path.
pub fn secure_redirect(mut response: Response<Body>, routes: &Router, ssl_port: Option<u16>) -> Response<Body> {
    if response.status() != StatusCode::MOVED_PERMANENTLY {
        return response;
    }
    let Some(ssl_port) = ssl_port else {
        return response;
    };

    let target = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok());
    let Some(mut target) = target else {
        return response;
    };

    if target.scheme() != "http" {
        return response;
    }
    let Some(host) = target.host_str() else {
        return response;
    };
    if routes.find_location(host, target.path()).is_none() {
        return response;
    }

    upgrade_to_tls(&mut target, Some(ssl_port));
    if let Ok(value) = HeaderValue::from_str(target.as_str()) {
        tracing::debug!(location = %target, "Upgraded redirect to HTTPS");
        response.headers_mut().insert(LOCATION, value);
    }
    response
}
