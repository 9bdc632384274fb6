//! Log output setup for embedding applications.
//!
//! The engine emits `tracing` events with structured fields (`tx_id` on
//! the transaction lifecycle, `index` on DDL, bag sizes on storage
//! conversions) but never installs a subscriber on its own. An embedder
//! opts in through one of the initializers here, or wires the events into
//! its own subscriber and ignores this module entirely.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{EngineError, Result};

fn parse_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| {
        EngineError::InvalidArgument(format!("invalid log filter '{directives}': {e}"))
    })
}

/// Installs a human-readable global subscriber filtered by `directives`
/// (env-filter syntax, e.g. `"umbra=debug"`).
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(directives: &str) -> Result<()> {
    fmt()
        .with_env_filter(parse_filter(directives)?)
        .with_target(true)
        .try_init()
        .map_err(|_| {
            EngineError::InvalidArgument(
                "a global tracing subscriber is already installed".into(),
            )
        })
}

/// Installs a JSON-lines global subscriber, one event object per line,
/// for machine-readable log collection.
///
/// Fails if a global subscriber is already installed.
pub fn init_json_logging(directives: &str) -> Result<()> {
    fmt()
        .json()
        .with_current_span(false)
        .with_env_filter(parse_filter(directives)?)
        .with_target(true)
        .try_init()
        .map_err(|_| {
            EngineError::InvalidArgument(
                "a global tracing subscriber is already installed".into(),
            )
        })
}
