//! Tracing setup for programs embedding beadmem.
//!
//! The library crates only emit events; installing a subscriber is left to
//! the host, and [`init_tracing`] is the default way to do it.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. With `json`, events are written as
/// newline-delimited JSON. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json()).try_init().ok();
    } else {
        registry.with(fmt::layer()).try_init().ok();
    }
}
