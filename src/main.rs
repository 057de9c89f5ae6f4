use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use portal_lib::api::ApiService;
use portal_lib::config::PortalConfig;
use portal_lib::storage::PortalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PortalConfig::load().context("invalid PORTAL_* configuration")?;
    portal_lib::logging::init(config.log_json).context("failed to install log subscriber")?;

    let store = PortalStore::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open store {}", config.store_path.display()))?;
    let facade = portal_lib::build_facade(&config, &store);
    info!(
        store = %store.path().display(),
        support_group = %facade.config().support_group_email,
        "portal starting"
    );

    Arc::new(ApiService::new(facade))
        .start_server(&config.socket_addr())
        .await
        .context("server stopped")?;
    Ok(())
}
