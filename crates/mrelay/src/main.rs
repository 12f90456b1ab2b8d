use std::sync::Arc;

use mrelay_core::{checkpoint::CheckpointStore, config::Config, engine::RelayEngine};
use mrelay_gateway::GatewayClient;

mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mrelay_core::logging::init("mrelay")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        gateway = %cfg.gateway_url,
        destination = cfg.target_channel,
        checkpoints = %cfg.checkpoint_file.display(),
        "configuration loaded"
    );

    let gateway = Arc::new(GatewayClient::from_config(&cfg)?);
    let store = Arc::new(CheckpointStore::load(cfg.checkpoint_file.clone()));
    let engine = RelayEngine::new(gateway.clone(), gateway, store, cfg.tuning);
    engine.resume_monitors().await;

    let port = cfg.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port).await {
            tracing::error!(port, "health server failed: {e}");
        }
    });

    mrelay_telegram::router::run_polling(cfg, engine).await
}
