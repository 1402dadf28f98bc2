//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Routes → Per-address listeners (+ certificates) → Start concurrently
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when certificates are loaded)
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has a deadline: connections are closed after the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{triggered, Shutdown, DEFAULT_GRACE_PERIOD};
pub use signals::{spawn_signal_handler, wait_for_termination};
pub use startup::{ProxyServer, RunningServer, StartupError};
