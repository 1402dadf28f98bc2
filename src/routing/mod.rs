//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (routes serving the host, in load order)
//!     → matcher.rs (segment-wise match of each location)
//!     → regex_cache.rs (compiled `{...}` segments)
//!     → Return: matched Location or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse destinations and access rules
//!     → Split location patterns into segments
//!     → Pre-compile regex segments
//!     → Freeze as immutable Router
//! ```

pub mod matcher;
pub mod regex_cache;
pub mod router;

pub use regex_cache::RegexCache;
pub use router::{Location, LocationMatch, Route, RouteError, RouteId, Router, TlsKeyPair};
