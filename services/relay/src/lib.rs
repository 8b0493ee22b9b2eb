//! Off-chain relay: accepts proof-backed reviews and serves them by geohash prefix.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

pub use config::RelayServiceConfig;
pub use error::RelayError;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/label",
            post(handlers::submit_label).get(handlers::list_labels),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Background task removing expired reviews every `config.prune_interval`.
pub fn spawn_pruner(state: Arc<AppState>) -> JoinHandle<()> {
    let period = state.config.prune_interval;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.prune_expired(chrono::Utc::now().timestamp()).await {
                Ok(pruned) => debug!(pruned, "Expiry sweep finished"),
                Err(e) => error!(error = %e, "Expiry sweep failed"),
            }
        }
    })
}
