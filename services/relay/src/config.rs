use geoproof_core::{Config, ConfigError, LedgerConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayServiceConfig {
    pub bind_addr: String,
    pub max_body_bytes: usize,
    pub prune_interval: Duration,
    pub ledger: LedgerConfig,
}

impl RelayServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve from `GEOPROOF_CONFIG` (TOML) or defaults, then apply
    /// `PORT` and `GEOPROOF_LEDGER_PATH` overrides.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = match lookup("GEOPROOF_CONFIG") {
            Some(path) => Config::from_file(path)?,
            None => Config::default_config(),
        };

        let mut bind_addr = base.relay.bind_addr;
        if let Some(port) = lookup("PORT") {
            let port: u16 = port.parse().map_err(|_| ConfigError::Invalid {
                field: "PORT",
                reason: format!("not a port number: {port}"),
            })?;
            let host = bind_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            bind_addr = format!("{host}:{port}");
        }

        let mut ledger = base.ledger;
        if let Some(path) = lookup("GEOPROOF_LEDGER_PATH") {
            ledger.path = PathBuf::from(path);
        }

        Ok(Self {
            bind_addr,
            max_body_bytes: base.relay.max_body_bytes,
            prune_interval: Duration::from_secs(base.relay.prune_interval_secs),
            ledger,
        })
    }
}
