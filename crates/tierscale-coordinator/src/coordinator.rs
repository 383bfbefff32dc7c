//! The scaling controller.
//!
//! Owns the shared queue, the registry and the fleet counts. The primary's
//! front-tier loop drives [`Coordinator::admit`]; every other worker goes
//! through the [`CoordinatorOps`] surface.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use tierscale_autoscale::{FleetSize, LoadEstimator, ScaleDecision, ScalePolicy, initial_fleet};
use tierscale_core::clock::as_millis;
use tierscale_core::{
    BoxFuture, CloudHarness, CoordinatorOps, FleetStatus, OpsError, OpsResult, QueuedRequest,
    Request, Role, TierscaleConfig, WorkerId,
};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::fleet::FleetCounter;
use crate::queue::WorkQueue;
use crate::registry::WorkerRegistry;

/// Fleet-wide scaling state and the operations that mutate it.
pub struct Coordinator {
    config: TierscaleConfig,
    queue: WorkQueue,
    registry: WorkerRegistry,
    fleet: FleetCounter,
    /// Only the primary loop observes; the lock is never held across an await.
    estimator: Mutex<LoadEstimator>,
    policy: ScalePolicy,
    harness: Arc<dyn CloudHarness>,
    started: Instant,
}

impl Coordinator {
    /// Create a coordinator with one front-tier worker: itself.
    pub fn new(config: TierscaleConfig, harness: Arc<dyn CloudHarness>) -> Self {
        let registry = WorkerRegistry::new();
        let self_id = config.fleet.coordinator_id;
        // Empty registry: cannot conflict.
        let _ = registry.assign(self_id, Role::Front);

        Self {
            queue: WorkQueue::new(config.queue.max_len),
            registry,
            fleet: FleetCounter::new(FleetSize {
                front: 1,
                middle: 0,
            }),
            estimator: Mutex::new(LoadEstimator::new(config.estimator.clone())),
            policy: ScalePolicy::new(&config.scale_up),
            harness,
            started: Instant::now(),
            config,
        }
    }

    pub fn config(&self) -> &TierscaleConfig {
        &self.config
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn fleet(&self) -> FleetSize {
        self.fleet.snapshot()
    }

    /// Size the fleet for the current hour and provision it.
    ///
    /// The coordinator already counts as one front-tier worker, so only the
    /// remaining front-tier target is started.
    pub async fn bootstrap(&self) -> CoordinatorResult<FleetSize> {
        let hour = self
            .harness
            .time_of_day()
            .await
            .map_err(|source| CoordinatorError::Harness {
                stage: "time_of_day",
                source,
            })?;
        let target = initial_fleet(hour, &self.config.fleet);
        info!(
            hour,
            target_front = target.front,
            target_middle = target.middle,
            "bootstrapping fleet"
        );

        let current = self.fleet.snapshot();
        self.provision(Role::Front, target.front.saturating_sub(current.front))
            .await?;
        self.provision(Role::Middle, target.middle.saturating_sub(current.middle))
            .await?;

        let size = self.fleet.snapshot();
        info!(front = size.front, middle = size.middle, "fleet bootstrapped");
        Ok(size)
    }

    /// Start `n` workers of `role`, registering and counting each one.
    pub async fn provision(&self, role: Role, n: u32) -> CoordinatorResult<()> {
        for _ in 0..n {
            let worker = self
                .harness
                .start_vm()
                .await
                .map_err(|source| CoordinatorError::Harness {
                    stage: "start_vm",
                    source,
                })?;
            self.registry.assign(worker, role)?;
            let size = self.fleet.add(role, 1);
            info!(
                worker_id = worker,
                %role,
                num_front = size.front,
                num_mid = size.middle,
                "scaled up"
            );
        }
        Ok(())
    }

    /// Admit a request from the primary's own intake: enqueue it, then run
    /// one round of load estimation and scale-up.
    pub async fn admit(&self, request: Request) -> bool {
        if !self.enqueue(request) {
            return false;
        }
        self.scale().await;
        true
    }

    /// Evaluate the scale-up policy once and provision what it asks for.
    pub async fn scale(&self) -> ScaleDecision {
        self.scale_at(as_millis(self.started.elapsed())).await
    }

    /// One scaling round as of `elapsed_ms` since the coordinator started.
    async fn scale_at(&self, elapsed_ms: u64) -> ScaleDecision {
        let decision = self.evaluate(elapsed_ms);
        if decision.add_front > 0 {
            if let Err(e) = self.provision(Role::Front, decision.add_front).await {
                error!(error = %e, "front-tier scale-up failed");
            }
        }
        if decision.add_middle > 0 {
            if let Err(e) = self.provision(Role::Middle, decision.add_middle).await {
                error!(error = %e, "mid-tier scale-up failed");
            }
        }
        decision
    }

    fn evaluate(&self, elapsed_ms: u64) -> ScaleDecision {
        let fleet = self.fleet.snapshot();
        let observation = self
            .estimator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(elapsed_ms, fleet.middle);
        if observation.changed {
            info!(
                level = %observation.level,
                factor = observation.factor,
                "load level changed"
            );
        }
        if let Some(floor) = observation.burst_to {
            info!(num_mid = fleet.middle, target = floor, "high load, bursting mid tier");
        }
        self.policy.evaluate(
            self.queue.len(),
            fleet,
            observation.factor,
            observation.burst_to,
        )
    }

    fn enqueue(&self, request: Request) -> bool {
        let id = request.id;
        if self.queue.enqueue(request) {
            true
        } else {
            error!(request = %id, queue_len = self.queue.len(), "queue refused request, dropping it");
            false
        }
    }

    pub fn fleet_status(&self) -> FleetStatus {
        let size = self.fleet.snapshot();
        let estimator = self
            .estimator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        FleetStatus {
            queue_len: self.queue.len(),
            num_front: size.front,
            num_mid: size.middle,
            load_level: estimator.level(),
            load_factor: estimator.factor(),
            registered_workers: self.registry.len(),
        }
    }
}

impl CoordinatorOps for Coordinator {
    fn submit(&self, request: Request) -> BoxFuture<'_, OpsResult<bool>> {
        Box::pin(async move { Ok(self.enqueue(request)) })
    }

    fn fetch(&self) -> BoxFuture<'_, OpsResult<Option<QueuedRequest>>> {
        Box::pin(async move { Ok(self.queue.dequeue()) })
    }

    fn request_retire_mid(&self) -> BoxFuture<'_, OpsResult<bool>> {
        Box::pin(async move {
            let floor = self.config.fleet.min_mid_tier;
            let granted = self.fleet.try_retire_mid(floor);
            let num_mid = self.fleet.snapshot().middle;
            if granted {
                info!(num_mid, "mid-tier retirement granted");
            } else {
                debug!(num_mid, floor, "mid-tier retirement denied");
            }
            Ok(granted)
        })
    }

    fn notify_front_retired(&self) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            let size = self.fleet.front_retired();
            info!(num_front = size.front, "front-tier worker retired");
            Ok(())
        })
    }

    fn query_role(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<Role>> {
        Box::pin(async move {
            match self.registry.role(worker) {
                Some(role) => Ok(role),
                None => {
                    warn!(worker_id = worker, "role queried for unknown worker");
                    Err(OpsError::UnknownWorker(worker))
                }
            }
        })
    }

    fn status(&self) -> BoxFuture<'_, OpsResult<FleetStatus>> {
        Box::pin(async move { Ok(self.fleet_status()) })
    }
}
