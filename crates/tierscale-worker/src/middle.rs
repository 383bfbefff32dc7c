//! Mid-tier loop: fetch, check staleness, serve or shed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tierscale_autoscale::{IdleThresholds, IdleWindow};
use tierscale_core::clock::{as_millis, epoch_millis};
use tierscale_core::{
    CloudHarness, CoordinatorOps, OpsError, OpsResult, QueuedRequest, Role, TierscaleConfig,
    WorkerId,
};

use crate::admission::{Admission, StalenessPolicy};
use crate::launch::{WorkerExit, is_shutdown, shutdown_requested};
use crate::serve::RequestRouter;

/// A mid-tier worker draining the coordinator's queue.
///
/// The idle gap is the time since this worker last finished a request.
/// Every fetch pushes that gap into the window, so a worker that keeps
/// finding nothing accumulates a run of growing idle samples.
pub struct MidTier {
    id: WorkerId,
    coordinator: Arc<dyn CoordinatorOps>,
    harness: Arc<dyn CloudHarness>,
    router: RequestRouter,
    policy: StalenessPolicy,
    thresholds: IdleThresholds,
    window: IdleWindow,
    poll_interval: Duration,
}

impl MidTier {
    pub fn new(
        id: WorkerId,
        coordinator: Arc<dyn CoordinatorOps>,
        harness: Arc<dyn CloudHarness>,
        router: RequestRouter,
        config: &TierscaleConfig,
    ) -> Self {
        Self {
            id,
            coordinator,
            harness,
            router,
            policy: StalenessPolicy::new(&config.admission),
            thresholds: IdleThresholds::middle(&config.retire),
            window: IdleWindow::new(config.retire.window),
            poll_interval: Duration::from_millis(config.retire.mid_poll_interval_ms),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> OpsResult<WorkerExit> {
        info!(worker_id = self.id, "mid-tier worker started");
        let mut last_work = Instant::now();

        while !is_shutdown(&shutdown) {
            let latest = match self.coordinator.fetch().await {
                Ok(Some(entry)) => {
                    let gap = as_millis(last_work.elapsed());
                    self.window.push(gap);
                    self.handle(entry).await;
                    last_work = Instant::now();
                    gap
                }
                Ok(None) => {
                    self.pause(&mut shutdown).await;
                    self.idle_tick(last_work)
                }
                Err(e) => {
                    warn!(worker_id = self.id, error = %e, "fetch failed");
                    self.pause(&mut shutdown).await;
                    self.idle_tick(last_work)
                }
            };

            let Some(reason) = self.thresholds.should_retire(latest, &self.window) else {
                continue;
            };
            match self.coordinator.request_retire_mid().await {
                Ok(true) => {
                    info!(worker_id = self.id, %reason, "mid-tier worker retiring");
                    if let Err(e) = self.harness.end_vm(self.id).await {
                        warn!(worker_id = self.id, error = %e, "failed to end vm");
                    }
                    return Ok(WorkerExit::Retired {
                        role: Role::Middle,
                        reason: reason.to_string(),
                    });
                }
                Ok(false) => {
                    debug!(worker_id = self.id, %reason, "retirement denied, staying up");
                }
                Err(e) => {
                    warn!(worker_id = self.id, error = %e, "retirement request failed");
                }
            }
            // Idle history that was already judged must not re-trigger.
            self.window.clear();
            last_work = Instant::now();
        }

        info!(worker_id = self.id, "mid-tier worker shutting down");
        Ok(WorkerExit::Shutdown)
    }

    /// Record an empty poll as an idle sample.
    fn idle_tick(&mut self, last_work: Instant) -> u64 {
        let gap = as_millis(last_work.elapsed());
        self.window.push(gap);
        gap
    }

    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = shutdown_requested(shutdown) => {}
        }
    }

    async fn handle(&self, entry: QueuedRequest) {
        let request_id = entry.request.id;
        match self.policy.admit(&entry, epoch_millis()) {
            Admission::Drop { age_ms, ceiling_ms } => {
                info!(
                    worker_id = self.id,
                    request = %request_id,
                    class = %entry.request.class(),
                    age_ms,
                    ceiling_ms,
                    "dropping stale request"
                );
                if let Err(e) = self.harness.drop_request(entry.request).await {
                    warn!(worker_id = self.id, request = %request_id, error = %e, "failed to report drop");
                }
            }
            Admission::Serve => match self.router.serve(&entry.request).await {
                Ok(outcome) => {
                    if let Err(e) = self.harness.process_request(entry.request, outcome).await {
                        warn!(worker_id = self.id, request = %request_id, error = %e, "failed to report outcome");
                    }
                }
                Err(e @ OpsError::Unsupported(_)) => {
                    error!(worker_id = self.id, request = %request_id, error = %e, "backing store cannot serve this request");
                }
                Err(e) => {
                    warn!(worker_id = self.id, request = %request_id, error = %e, "failed to serve request");
                }
            },
        }
    }
}
