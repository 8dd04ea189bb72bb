use std::sync::Arc;

use anyhow::Context;

use cavastock_api::app::{build_app, services::AppServices};
use cavastock_infra::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cavastock_observability::init();

    let config = LedgerConfig::from_env();
    tracing::info!(
        facility = %config.facility,
        snapshot = %config.snapshot_path().display(),
        paged_capacity = config.paged_capacity,
        sync = config.sync_dir.is_some(),
        "starting cavastock"
    );

    let services = Arc::new(AppServices::from_config(&config)?);
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
