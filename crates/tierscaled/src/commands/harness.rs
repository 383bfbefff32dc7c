use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use tierscale_core::TierscaleConfig;
use tierscale_rpc::{harness_service, serve};
use tierscale_sim::{ProcessLauncher, SimCloud, SimConfig, VmLauncher, Workload};

pub async fn run(
    config: TierscaleConfig,
    config_path: Option<PathBuf>,
    port: u16,
    advertise: String,
    sim: SimConfig,
    duration_secs: Option<u64>,
) -> anyhow::Result<()> {
    let program = std::env::current_exe().context("cannot locate the tierscaled binary")?;
    let hour = sim.hour();
    let rate = sim.arrival_rate(hour, &config);
    let (backing, catalog) = sim.backing_store();

    let (stop_tx, mut stop_rx) = crate::shutdown_signal();
    let launcher = Arc::new(ProcessLauncher::new(program, advertise, port, config_path));
    let cloud = SimCloud::new(hour, launcher.clone());

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind harness port {port}"))?;
    let server = tokio::spawn(serve(
        listener,
        harness_service(cloud.clone(), backing),
        stop_rx.clone(),
    ));

    launcher
        .launch(config.fleet.coordinator_id, cloud.clone())
        .context("failed to boot the coordinator")?;
    let workload = cloud.spawn_workload(
        Workload::new(catalog, sim.purchase_ratio, sim.seed),
        rate,
        stop_rx.clone(),
    );
    info!(port, hour, rate, "harness running");

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = stop_rx.wait_for(|stop| *stop) => {}
            }
        }
        None => {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        }
    }
    stop_tx.send_replace(true);

    // Long polls hold server connections open until their workers are gone.
    launcher.stop_all().await;
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "harness server failed"),
        Err(e) => error!(error = %e, "harness server task panicked"),
    }
    if let Err(e) = workload.await {
        error!(error = %e, "workload task panicked");
    }

    let report = cloud.report();
    info!(%report, "harness stopped");
    Ok(())
}
