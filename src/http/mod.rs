//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (net::listener)
//!     → server.rs (axum app, request ID, tracing, timeout)
//!     → routing (host + path → location)
//!     → security (allow/deny)
//!     → request.rs (URI rewrite, User-Agent handling) → upstream
//!       or response.rs (synthesized redirect)
//!     → response.rs (HTTPS upgrade of backend 301s)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{upstream_client, AppState, HttpServer, UpstreamClient};
