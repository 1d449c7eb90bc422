//! JSON logging for the dispatcher sidecar.
//!
//! No span export here: the dispatcher sits beside the calling application
//! and each relayed call already gets a request span from `TraceLayer`.
//! Events carry solution ids, key-ids and status codes, never bodies.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `log_level` when set.
///
/// # Errors
///
/// Fails on an unparsable `log_level` or if a subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .with_context(|| format!("invalid LOG_LEVEL {log_level:?}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true).with_span_list(false))
        .try_init()
        .context("failed to initialise dispatcher tracing subscriber")
}
