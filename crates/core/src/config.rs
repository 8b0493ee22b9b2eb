//! Configuration management for GeoProof.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
#[cfg(feature = "toml")]
use tracing::{debug, warn};

use crate::geocell::MAX_PRECISION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "toml")]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub location: LocationConfig,
    pub proof: ProofConfig,
    pub ledger: LedgerConfig,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub fix_timeout_ms: u64,
    pub prompt_timeout_ms: u64,
    pub escalate_to_always: bool,
    pub full_accuracy_purpose_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    pub circuit_path: PathBuf,
    #[serde(default)]
    pub srs_path: Option<PathBuf>,
    #[serde(default = "default_on_chain")]
    pub on_chain: bool,
    #[serde(default = "default_prove_timeout_ms")]
    pub prove_timeout_ms: u64,
    /// Defaults to `!on_chain` when absent
    #[serde(default)]
    pub verify_locally: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: PathBuf,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_precision")]
    pub geo_cell_precision: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub max_body_bytes: usize,
    /// How often expired reviews are removed from the ledger
    pub prune_interval_secs: u64,
}

fn default_on_chain() -> bool {
    true
}

fn default_prove_timeout_ms() -> u64 {
    120_000
}

fn default_dedup_window_secs() -> u64 {
    86_400
}

fn default_precision() -> usize {
    crate::geocell::DEFAULT_PRECISION
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fix_timeout_ms: 30_000,
            prompt_timeout_ms: 120_000,
            escalate_to_always: true,
            full_accuracy_purpose_key: "ProofOfPresence".to_string(),
        }
    }
}

impl LocationConfig {
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }
}

impl ProofConfig {
    pub fn prove_timeout(&self) -> Duration {
        Duration::from_millis(self.prove_timeout_ms)
    }

    pub fn verify_locally(&self) -> bool {
        self.verify_locally.unwrap_or(!self.on_chain)
    }
}

impl LedgerConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8090".to_string(),
            max_body_bytes: 65_536,
            prune_interval_secs: 60,
        }
    }
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if let Err(e) = config.validate() {
            warn!(path = %path.display(), error = %e, "Rejected configuration");
            return Err(e);
        }
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            location: LocationConfig::default(),
            proof: ProofConfig {
                circuit_path: PathBuf::from("circuits/geofence.json"),
                srs_path: Some(PathBuf::from("circuits/geofence.srs")),
                on_chain: default_on_chain(),
                prove_timeout_ms: default_prove_timeout_ms(),
                verify_locally: None,
            },
            ledger: LedgerConfig {
                path: PathBuf::from("data/submissions.db"),
                dedup_window_secs: default_dedup_window_secs(),
                geo_cell_precision: default_precision(),
            },
            registry: RegistryConfig {
                path: PathBuf::from("data/registry.db"),
            },
            relay: RelayConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.fix_timeout_ms == 0 {
            return Err(invalid("location.fix_timeout_ms", "must be positive"));
        }
        if self.location.prompt_timeout_ms == 0 {
            return Err(invalid("location.prompt_timeout_ms", "must be positive"));
        }
        if self.proof.prove_timeout_ms == 0 {
            return Err(invalid("proof.prove_timeout_ms", "must be positive"));
        }
        if self.ledger.dedup_window_secs == 0 {
            return Err(invalid("ledger.dedup_window_secs", "must be positive"));
        }
        let precision = self.ledger.geo_cell_precision;
        if precision == 0 || precision > MAX_PRECISION {
            return Err(invalid(
                "ledger.geo_cell_precision",
                format!("must be between 1 and {}, got {}", MAX_PRECISION, precision),
            ));
        }
        if self.relay.max_body_bytes == 0 {
            return Err(invalid("relay.max_body_bytes", "must be positive"));
        }
        if self.relay.prune_interval_secs == 0 {
            return Err(invalid("relay.prune_interval_secs", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
