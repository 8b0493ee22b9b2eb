use anyhow::Context;
use geoproof_relay::{router, spawn_pruner, AppState, RelayServiceConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    geoproof_core::logging::init_from_env();

    let config = RelayServiceConfig::from_env().context("loading relay config")?;
    let state = AppState::new(config.clone())
        .with_context(|| format!("opening ledger at {}", config.ledger.path.display()))?;
    let state = Arc::new(state);
    spawn_pruner(state.clone());
    let app = router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "GeoProof relay listening");

    axum::serve(listener, app).await?;
    Ok(())
}
