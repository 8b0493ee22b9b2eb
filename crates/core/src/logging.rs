//! Structured logging setup for GeoProof binaries.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install a human-readable subscriber. Later calls are no-ops.
///
/// Level comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
///
/// # Example
/// ```no_run
/// use geoproof_core::logging;
///
/// logging::init();
/// tracing::info!("Application started");
/// ```
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

/// Install a JSON subscriber for log shipping. Later calls are no-ops.
///
/// # Example
/// ```no_run
/// use geoproof_core::logging;
///
/// logging::init_json();
/// tracing::info!(service = "relay", "Service started");
/// ```
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_current_span(true))
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Pick the JSON format when `GEOPROOF_LOG_JSON` is `1` or `true`.
pub fn init_from_env() {
    if json_requested(std::env::var("GEOPROOF_LOG_JSON").ok().as_deref()) {
        init_json();
    } else {
        init();
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}
