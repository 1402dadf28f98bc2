//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listen address config
//!     → listener.rs (bind, header limits, graceful drain)
//!     → tls.rs (SNI certificate index for SSL addresses)
//!     → Hand off to HTTP layer
//! ```

pub mod listener;
pub mod tls;

pub use listener::{ListenAddress, Listener, ListenerError, RedirectTask, Task};
pub use tls::{crypto_provider, CertificateIndex, TlsError};
