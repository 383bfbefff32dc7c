//! Front-tier loops: the primary and the forwarders.
//!
//! Both block on the harness for the next request; that wait is the only
//! blocking point. The primary admits directly into the coordinator and
//! never retires. A forwarder submits remotely and retires itself once
//! the time between requests shows it is idle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tierscale_autoscale::{IdleThresholds, IdleWindow, RetireReason};
use tierscale_coordinator::Coordinator;
use tierscale_core::clock::as_millis;
use tierscale_core::config::RetireConfig;
use tierscale_core::{CloudHarness, CoordinatorOps, OpsResult, Request, Role, WorkerId};

use crate::launch::{WorkerExit, is_shutdown, shutdown_requested};

/// Pause after a failed harness call before polling again.
const HARNESS_RETRY: Duration = Duration::from_millis(50);

/// Log a status line every this many admitted requests.
const STATUS_EVERY: u64 = 100;

/// Intake loop of the coordinator process.
pub async fn run_primary(
    coordinator: Arc<Coordinator>,
    harness: Arc<dyn CloudHarness>,
    mut shutdown: watch::Receiver<bool>,
) -> OpsResult<WorkerExit> {
    let id = coordinator.config().fleet.coordinator_id;
    harness.register_frontend(id).await?;
    info!(worker_id = id, "primary accepting requests");

    let mut admitted: u64 = 0;
    while !is_shutdown(&shutdown) {
        let next = tokio::select! {
            next = harness.next_request(id) => next,
            _ = shutdown_requested(&mut shutdown) => break,
        };
        match next {
            Ok(request) => {
                if coordinator.admit(request).await {
                    admitted += 1;
                    if admitted % STATUS_EVERY == 0 {
                        let status = coordinator.fleet_status();
                        info!(
                            admitted,
                            queue_len = status.queue_len,
                            num_front = status.num_front,
                            num_mid = status.num_mid,
                            load_level = %status.load_level,
                            "fleet status"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(worker_id = id, error = %e, "failed to receive next request");
                tokio::time::sleep(HARNESS_RETRY).await;
            }
        }
    }

    info!(worker_id = id, admitted, "primary shutting down");
    Ok(WorkerExit::Shutdown)
}

/// A non-primary front-tier worker.
pub struct Forwarder {
    id: WorkerId,
    coordinator: Arc<dyn CoordinatorOps>,
    harness: Arc<dyn CloudHarness>,
    thresholds: IdleThresholds,
    window: IdleWindow,
}

impl Forwarder {
    pub fn new(
        id: WorkerId,
        coordinator: Arc<dyn CoordinatorOps>,
        harness: Arc<dyn CloudHarness>,
        config: &RetireConfig,
    ) -> Self {
        Self {
            id,
            coordinator,
            harness,
            thresholds: IdleThresholds::front(config),
            window: IdleWindow::new(config.window),
        }
    }

    /// Forward requests until idle enough to retire or told to stop.
    ///
    /// Each sample is the full iteration: waiting for the request plus
    /// the round trip to the coordinator.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> OpsResult<WorkerExit> {
        self.harness.register_frontend(self.id).await?;
        info!(worker_id = self.id, "front-tier worker accepting requests");

        while !is_shutdown(&shutdown) {
            let started = Instant::now();
            let next = tokio::select! {
                next = self.harness.next_request(self.id) => next,
                _ = shutdown_requested(&mut shutdown) => break,
            };
            match next {
                Ok(request) => self.forward(request).await,
                Err(e) => {
                    warn!(worker_id = self.id, error = %e, "failed to receive next request");
                    tokio::time::sleep(HARNESS_RETRY).await;
                }
            }

            let sample = as_millis(started.elapsed());
            self.window.push(sample);
            if let Some(reason) = self.thresholds.should_retire(sample, &self.window) {
                self.retire(&reason).await;
                return Ok(WorkerExit::Retired {
                    role: Role::Front,
                    reason: reason.to_string(),
                });
            }
        }

        info!(worker_id = self.id, "front-tier worker shutting down");
        Ok(WorkerExit::Shutdown)
    }

    async fn forward(&self, request: Request) {
        let request_id = request.id;
        match self.coordinator.submit(request).await {
            Ok(true) => debug!(worker_id = self.id, request = %request_id, "forwarded"),
            Ok(false) => error!(
                worker_id = self.id,
                request = %request_id,
                "coordinator refused request"
            ),
            Err(e) => warn!(
                worker_id = self.id,
                request = %request_id,
                error = %e,
                "submit failed, request lost"
            ),
        }
    }

    /// Leave intake, tell the coordinator, then end the VM.
    async fn retire(&self, reason: &RetireReason) {
        info!(worker_id = self.id, %reason, "front-tier worker retiring");
        if let Err(e) = self.harness.unregister_frontend(self.id).await {
            warn!(worker_id = self.id, error = %e, "failed to leave intake");
        }
        if let Err(e) = self.coordinator.notify_front_retired().await {
            warn!(worker_id = self.id, error = %e, "failed to report retirement");
        }
        if let Err(e) = self.harness.end_vm(self.id).await {
            warn!(worker_id = self.id, error = %e, "failed to end vm");
        }
    }
}
