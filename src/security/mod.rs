//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Matched location:
//!     → access_control.rs (deny/allow evaluation against the caller)
//!     → 403 Forbidden, or continue to the task
//! ```
//!
//! # Design Decisions
//! - Fail closed: a configured source header that is missing denies
//! - Allow lists are parsed at load time, never per request

pub mod access_control;

pub use access_control::{AccessPolicy, AccessPolicyError, AllowEntry};
