//! Structured logging.
//!
//! Uses `tracing` everywhere; the subscriber is installed once by the binary.
//! `RUST_LOG` overrides the default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for the given verbosity.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "vhost_proxy=debug,tower_http=debug"
    } else {
        "vhost_proxy=info,tower_http=info"
    }
}

/// Install the global subscriber.
pub fn init_logging(debug: bool, force_colors: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(debug).into());

    let fmt = tracing_subscriber::fmt::layer();
    let fmt = if force_colors { fmt.with_ansi(true) } else { fmt };

    tracing_subscriber::registry().with(filter).with(fmt).init();
}
