use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use tierscale_core::{TierscaleConfig, WorkerId};
use tierscale_rpc::{HttpClient, RemoteDirectory, RemoteHarness, RemoteStore};
use tierscale_worker::{WorkerContext, run_worker};

/// Bound on backing-store calls. Harness calls are long polls and unbounded.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(
    config: TierscaleConfig,
    harness_addr: String,
    harness_port: u16,
    worker_id: WorkerId,
) -> anyhow::Result<()> {
    let coordinator_port = harness_port
        .checked_add(config.fleet.port_offset)
        .context("coordinator port out of range")?;
    let harness_endpoint = format!("{harness_addr}:{harness_port}");
    info!(
        worker_id,
        harness = %harness_endpoint,
        coordinator_port,
        "worker starting"
    );

    let (stop_tx, stop_rx) = crate::shutdown_signal();
    let directory = Arc::new(RemoteDirectory::new(
        harness_addr,
        coordinator_port,
        stop_rx.clone(),
    ));
    let ctx = WorkerContext {
        config,
        harness: Arc::new(RemoteHarness::new(HttpClient::new(harness_endpoint.clone()))),
        backing: Arc::new(RemoteStore::backing(
            HttpClient::new(harness_endpoint).with_timeout(STORE_TIMEOUT),
        )),
        directory: directory.clone(),
        shutdown: stop_rx,
    };

    let exit = run_worker(worker_id, ctx).await;
    stop_tx.send_replace(true);
    directory.join().await;

    let exit = exit?;
    info!(worker_id, ?exit, "worker stopped");
    Ok(())
}
