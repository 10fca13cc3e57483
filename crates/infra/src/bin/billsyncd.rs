//! BillSync daemon: runs the health monitor and retry worker until Ctrl-C.

use anyhow::Context;
use billsync_infra::config;
use billsync_infra::observability::init_tracing;
use billsync_infra::runtime::SyncRuntime;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load().context("failed to load configuration")?;
    init_tracing(&config.logging).context("failed to initialise logging")?;

    let runtime = SyncRuntime::init(config).await.context("failed to start sync runtime")?;
    info!(platforms = ?runtime.engine().platforms(), "billsyncd running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    runtime.shutdown().await.context("unclean shutdown")?;
    Ok(())
}
