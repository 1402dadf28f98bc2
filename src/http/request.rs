//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID for tracing
//! - Rewrite the request URI onto a location's destination
//! - Keep the upstream client from adding its own `User-Agent`

use axum::http::header::USER_AGENT;
use axum::http::uri::InvalidUri;
use axum::http::{HeaderMap, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Join a destination path and the residual request path with exactly one slash.
pub fn join_path(base: &str, residual: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        residual.trim_start_matches('/')
    )
}

/// Combine destination and request queries as `dest&request`.
pub fn merge_query(destination: Option<&str>, request: Option<&str>) -> Option<String> {
    match (
        destination.filter(|q| !q.is_empty()),
        request.filter(|q| !q.is_empty()),
    ) {
        (Some(d), Some(r)) => Some(format!("{}&{}", d, r)),
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (None, None) => None,
    }
}

/// Build the upstream URI for a request.
///
/// A destination path ending in `/` gets the residual request path
/// appended; any other destination path replaces the request path.
pub fn rewrite_uri(destination: &Url, residual: &str, request_query: Option<&str>) -> Result<Uri, InvalidUri> {
    let path = if destination.path().ends_with('/') {
        join_path(destination.path(), residual)
    } else {
        destination.path().to_string()
    };

    let host = destination.host_str().unwrap_or_default();
    let authority = match destination.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut uri = format!("{}://{}{}", destination.scheme(), authority, path);
    if let Some(query) = merge_query(destination.query(), request_query) {
        uri.push('?');
        uri.push_str(&query);
    }
    uri.parse()
}

/// Send an explicitly empty `User-Agent` when the client sent none.
pub fn suppress_default_user_agent(headers: &mut HeaderMap) {
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(""));
    }
}
