//! One whole fleet in one process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use tierscale_cache::MemoryStore;
use tierscale_core::clock::epoch_millis;
use tierscale_core::TierscaleConfig;
use tierscale_worker::{LocalDirectory, run_worker};

use crate::cloud::SimCloud;
use crate::launcher::InProcessLauncher;
use crate::report::SimReport;
use crate::workload::{Catalog, Workload};

/// Workload and catalog knobs for a simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Requests per second at an hourly multiplier of 1.0.
    pub base_rps: f64,
    pub purchase_ratio: f64,
    /// Hour of day; the current UTC hour when absent.
    pub hour: Option<u8>,
    pub seed: Option<u64>,
    pub items: usize,
    pub stock: u32,
    /// Token the backing store requires for writes.
    pub auth: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_rps: 5.0,
            purchase_ratio: 0.3,
            hour: None,
            seed: None,
            items: 32,
            stock: 1_000,
            auth: "tierscale".to_string(),
        }
    }
}

impl SimConfig {
    pub fn hour(&self) -> u8 {
        self.hour
            .unwrap_or_else(|| ((epoch_millis() / 3_600_000) % 24) as u8)
            % 24
    }

    /// Arrival rate for `hour` under the configured hourly table.
    pub fn arrival_rate(&self, hour: u8, config: &TierscaleConfig) -> f64 {
        let rates = &config.fleet.hourly_arrival_rates;
        let multiplier = if rates.is_empty() {
            1.0
        } else {
            rates[hour as usize % rates.len()]
        };
        self.base_rps * multiplier
    }

    /// A fresh backing store stocked with the generated catalog.
    pub fn backing_store(&self) -> (Arc<MemoryStore>, Catalog) {
        let catalog = Catalog::generate(self.items, self.stock);
        let store = Arc::new(MemoryStore::new(self.auth.clone()));
        catalog.seed(&store);
        (store, catalog)
    }
}

/// Run a coordinator, its workers and the workload for `duration`, then
/// shut everything down and report.
pub async fn run_in_process(
    config: TierscaleConfig,
    sim: SimConfig,
    duration: Duration,
) -> anyhow::Result<SimReport> {
    config.validate().context("invalid configuration")?;

    let hour = sim.hour();
    let rate = sim.arrival_rate(hour, &config);
    let (backing, catalog) = sim.backing_store();
    let (stop_tx, stop_rx) = watch::channel(false);

    let directory = Arc::new(LocalDirectory::new());
    let launcher = Arc::new(InProcessLauncher::new(
        config.clone(),
        backing.clone(),
        directory,
        stop_rx.clone(),
    ));
    let cloud = SimCloud::new(hour, launcher.clone());
    info!(
        hour,
        rate,
        items = catalog.len(),
        duration_ms = duration.as_millis() as u64,
        "simulation starting"
    );

    let primary = tokio::spawn(run_worker(
        config.fleet.coordinator_id,
        launcher.context(cloud.clone()),
    ));
    let workload = cloud.spawn_workload(
        Workload::new(catalog, sim.purchase_ratio, sim.seed),
        rate,
        stop_rx,
    );

    tokio::time::sleep(duration).await;
    stop_tx.send_replace(true);

    let exit = primary.await.context("coordinator task panicked")??;
    info!(?exit, "coordinator exited");
    launcher.join_all().await;
    workload.await.context("workload task panicked")?;

    let report = cloud.report();
    info!(%report, running = cloud.running_vms(), "simulation finished");
    Ok(report)
}
