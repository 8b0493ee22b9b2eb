use chrono::{DateTime, Utc};
use geoproof_ledger::{Result, SubmissionLedger};
use tokio::sync::Mutex;

use crate::config::RelayServiceConfig;

pub struct AppState {
    pub config: RelayServiceConfig,
    /// Single writer; held only for the duration of one store call
    pub ledger: Mutex<SubmissionLedger>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: RelayServiceConfig) -> Result<Self> {
        let ledger = SubmissionLedger::open(&config.ledger.path, &config.ledger)?;
        Ok(Self::with_ledger(config, ledger))
    }

    pub fn with_ledger(config: RelayServiceConfig, ledger: SubmissionLedger) -> Self {
        AppState {
            config,
            ledger: Mutex::new(ledger),
            started_at: Utc::now(),
        }
    }

    /// Drop reviews whose expiry has passed at `now_unix`.
    pub async fn prune_expired(&self, now_unix: i64) -> Result<usize> {
        self.ledger.lock().await.prune_expired(now_unix)
    }
}
