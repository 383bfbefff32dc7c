//! Process entry: pick the loop for a worker id and run it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info};

use tierscale_cache::ReadThroughCache;
use tierscale_coordinator::Coordinator;
use tierscale_core::{
    CloudHarness, CoordinatorOps, DataStore, Directory, OpsError, Role, TierscaleConfig, WorkerId,
};

use crate::front::{Forwarder, run_primary};
use crate::middle::MidTier;
use crate::serve::RequestRouter;

const ROLE_RETRY_INITIAL: Duration = Duration::from_millis(10);
const ROLE_RETRY_MAX: Duration = Duration::from_secs(1);
const ROLE_RETRY_ATTEMPTS: u32 = 40;

/// Everything a worker process needs besides its id.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: TierscaleConfig,
    pub harness: Arc<dyn CloudHarness>,
    /// The harness's backing store.
    pub backing: Arc<dyn DataStore>,
    pub directory: Arc<dyn Directory>,
    /// Process-level stop signal. Not a retirement.
    pub shutdown: watch::Receiver<bool>,
}

/// How a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker retired itself and ended its VM.
    Retired { role: Role, reason: String },
    /// The process was told to stop.
    Shutdown,
}

/// Run worker `id` until it retires or the process shuts down.
pub async fn run_worker(id: WorkerId, ctx: WorkerContext) -> anyhow::Result<WorkerExit> {
    if id == ctx.config.fleet.coordinator_id {
        return run_coordinator(ctx).await;
    }

    let Some((coordinator, role)) = resolve_role(id, &ctx).await? else {
        return Ok(WorkerExit::Shutdown);
    };
    info!(worker_id = id, %role, "role resolved");

    let exit = match role {
        Role::Front => {
            Forwarder::new(id, coordinator, ctx.harness.clone(), &ctx.config.retire)
                .run(ctx.shutdown)
                .await
        }
        Role::Middle => {
            let cache = ctx.directory.cache().context("cache lookup failed")?;
            let router = RequestRouter::new(cache, ctx.backing.clone());
            MidTier::new(id, coordinator, ctx.harness.clone(), router, &ctx.config)
                .run(ctx.shutdown)
                .await
        }
    };
    exit.with_context(|| format!("{role} worker {id} failed"))
}

/// Run the primary: publish the coordinator and its cache, size the
/// fleet, then take intake until shutdown.
pub async fn run_coordinator(ctx: WorkerContext) -> anyhow::Result<WorkerExit> {
    let coordinator = Arc::new(Coordinator::new(ctx.config.clone(), ctx.harness.clone()));
    let cache = Arc::new(ReadThroughCache::new(ctx.backing.clone()));

    ctx.directory
        .publish(coordinator.clone(), cache.clone())
        .await
        .context("failed to publish coordinator")?;
    coordinator
        .bootstrap()
        .await
        .context("fleet bootstrap failed")?;

    let exit = run_primary(coordinator.clone(), ctx.harness.clone(), ctx.shutdown)
        .await
        .context("primary loop failed")?;

    let status = coordinator.fleet_status();
    let stats = cache.stats();
    info!(
        queue_len = status.queue_len,
        num_front = status.num_front,
        num_mid = status.num_mid,
        load_level = %status.load_level,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        cache_entries = stats.entries,
        "coordinator stopped"
    );
    Ok(exit)
}

/// Look up the coordinator and ask it for this worker's role.
///
/// A VM can boot before the coordinator is published or before its role
/// is recorded, so unreachable and unknown-worker answers are retried
/// with capped exponential backoff. `Ok(None)` means shutdown arrived
/// first.
pub async fn resolve_role(
    id: WorkerId,
    ctx: &WorkerContext,
) -> anyhow::Result<Option<(Arc<dyn CoordinatorOps>, Role)>> {
    let mut shutdown = ctx.shutdown.clone();
    let mut delay = ROLE_RETRY_INITIAL;

    for attempt in 1..=ROLE_RETRY_ATTEMPTS {
        let result = match ctx.directory.coordinator() {
            Ok(coordinator) => coordinator
                .query_role(id)
                .await
                .map(|role| (coordinator, role)),
            Err(e) => Err(e),
        };
        match result {
            Ok(resolved) => return Ok(Some(resolved)),
            Err(e) if e.is_transient() || matches!(e, OpsError::UnknownWorker(_)) => {
                debug!(worker_id = id, attempt, error = %e, "role not available yet");
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("role query for worker {id}")));
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_requested(&mut shutdown) => return Ok(None),
        }
        delay = (delay * 2).min(ROLE_RETRY_MAX);
    }

    anyhow::bail!("worker {id} has no role after {ROLE_RETRY_ATTEMPTS} attempts")
}

/// Whether the stop signal is set. A dropped sender counts as set.
pub(crate) fn is_shutdown(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Resolves once the stop signal is set or its sender is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
