//! The simulated cloud harness.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tierscale_core::clock::as_millis;
use tierscale_core::{
    BoxFuture, CloudHarness, OpsError, OpsResult, Request, RequestId, ServeOutcome, WorkerId,
};

use crate::launcher::VmLauncher;
use crate::report::{SimReport, SimStats};
use crate::workload::Workload;

/// First id handed out by `start_vm`; 1 is the coordinator.
const FIRST_VM_ID: WorkerId = 2;

/// Request source, VM lifecycle and business-logic sink.
///
/// Generated requests wait in one intake channel; whichever registered
/// frontend polls next receives the head.
pub struct SimCloud {
    me: Weak<SimCloud>,
    hour: u8,
    launcher: Arc<dyn VmLauncher>,
    intake_tx: mpsc::UnboundedSender<Request>,
    intake_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>,
    frontends: Mutex<HashSet<WorkerId>>,
    running: Mutex<HashSet<WorkerId>>,
    next_vm: AtomicU32,
    arrivals: Mutex<HashMap<RequestId, Instant>>,
    stats: Mutex<SimStats>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimCloud {
    pub fn new(hour: u8, launcher: Arc<dyn VmLauncher>) -> Arc<Self> {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            hour: hour % 24,
            launcher,
            intake_tx,
            intake_rx: tokio::sync::Mutex::new(intake_rx),
            frontends: Mutex::new(HashSet::new()),
            running: Mutex::new(HashSet::new()),
            next_vm: AtomicU32::new(FIRST_VM_ID),
            arrivals: Mutex::new(HashMap::new()),
            stats: Mutex::new(SimStats::default()),
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Queue a client request for the next polling frontend.
    pub fn inject(&self, request: Request) {
        lock(&self.arrivals).insert(request.id, Instant::now());
        lock(&self.stats).generated();
        if self.intake_tx.send(request).is_err() {
            warn!("intake closed, request discarded");
        }
    }

    /// Generate arrivals at `rate` requests per second until shutdown.
    pub fn spawn_workload(
        &self,
        mut workload: Workload,
        rate: f64,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let me = self.me.clone();
        info!(rate, hour = self.hour, "workload started");
        tokio::spawn(async move {
            loop {
                let Some(gap) = workload.next_gap(rate) else {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                    break;
                };
                tokio::select! {
                    _ = tokio::time::sleep(gap) => {}
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
                let Some(cloud) = me.upgrade() else { break };
                cloud.inject(workload.next_request());
            }
            debug!("workload stopped");
        })
    }

    pub fn frontends(&self) -> Vec<WorkerId> {
        let mut ids: Vec<_> = lock(&self.frontends).iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn running_vms(&self) -> usize {
        lock(&self.running).len()
    }

    pub fn report(&self) -> SimReport {
        lock(&self.stats).snapshot()
    }

    fn latency_ms(&self, id: RequestId) -> Option<u64> {
        lock(&self.arrivals)
            .remove(&id)
            .map(|arrived| as_millis(arrived.elapsed()))
    }
}

impl CloudHarness for SimCloud {
    fn next_request(&self, frontend: WorkerId) -> BoxFuture<'_, OpsResult<Request>> {
        Box::pin(async move {
            if !lock(&self.frontends).contains(&frontend) {
                return Err(OpsError::Harness(format!(
                    "worker {frontend} is not a registered frontend"
                )));
            }
            let mut intake = self.intake_rx.lock().await;
            intake
                .recv()
                .await
                .ok_or_else(|| OpsError::Harness("intake closed".into()))
        })
    }

    fn start_vm(&self) -> BoxFuture<'_, OpsResult<WorkerId>> {
        Box::pin(async move {
            let harness: Arc<dyn CloudHarness> = self
                .me
                .upgrade()
                .ok_or_else(|| OpsError::Harness("cloud is shutting down".into()))?;
            let id = self.next_vm.fetch_add(1, Ordering::SeqCst);
            let running = {
                let mut running = lock(&self.running);
                running.insert(id);
                running.len()
            };
            lock(&self.stats).vm_started(running);
            info!(worker_id = id, running, "vm started");
            self.launcher.launch(id, harness)?;
            Ok(id)
        })
    }

    fn end_vm(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            if !lock(&self.running).remove(&worker) {
                warn!(worker_id = worker, "end_vm for a vm that is not running");
                return Ok(());
            }
            lock(&self.frontends).remove(&worker);
            lock(&self.stats).vm_ended();
            info!(worker_id = worker, running = self.running_vms(), "vm ended");
            Ok(())
        })
    }

    fn register_frontend(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            lock(&self.frontends).insert(worker);
            debug!(worker_id = worker, "frontend registered");
            Ok(())
        })
    }

    fn unregister_frontend(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            lock(&self.frontends).remove(&worker);
            debug!(worker_id = worker, "frontend unregistered");
            Ok(())
        })
    }

    fn time_of_day(&self) -> BoxFuture<'_, OpsResult<u8>> {
        Box::pin(async move { Ok(self.hour) })
    }

    fn process_request(
        &self,
        request: Request,
        outcome: ServeOutcome,
    ) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            let latency = self.latency_ms(request.id);
            lock(&self.stats).served(&outcome, latency);
            debug!(request = %request.id, latency_ms = latency, ?outcome, "request served");
            Ok(())
        })
    }

    fn drop_request(&self, request: Request) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            self.latency_ms(request.id);
            lock(&self.stats).dropped();
            debug!(request = %request.id, "request dropped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<WorkerId>>,
    }

    impl VmLauncher for RecordingLauncher {
        fn launch(&self, id: WorkerId, _harness: Arc<dyn CloudHarness>) -> OpsResult<()> {
            lock(&self.launched).push(id);
            Ok(())
        }
    }

    fn cloud() -> (Arc<SimCloud>, Arc<RecordingLauncher>) {
        let launcher = Arc::new(RecordingLauncher::default());
        (SimCloud::new(20, launcher.clone()), launcher)
    }

    #[tokio::test]
    async fn vm_ids_start_after_the_coordinator() {
        let (cloud, launcher) = cloud();
        assert_eq!(cloud.start_vm().await.unwrap(), 2);
        assert_eq!(cloud.start_vm().await.unwrap(), 3);
        assert_eq!(*lock(&launcher.launched), vec![2, 3]);
        assert_eq!(cloud.running_vms(), 2);

        cloud.end_vm(2).await.unwrap();
        cloud.end_vm(2).await.unwrap();
        let report = cloud.report();
        assert_eq!(report.vms_started, 2);
        assert_eq!(report.vms_ended, 1);
        assert_eq!(report.peak_vms, 2);
    }

    #[tokio::test]
    async fn only_registered_frontends_receive_requests() {
        let (cloud, _) = cloud();
        cloud.inject(Request::browse(1, "a"));

        assert!(matches!(
            cloud.next_request(5).await,
            Err(OpsError::Harness(_))
        ));

        cloud.register_frontend(5).await.unwrap();
        assert_eq!(cloud.next_request(5).await.unwrap().id, RequestId(1));

        cloud.unregister_frontend(5).await.unwrap();
        assert!(cloud.frontends().is_empty());
    }

    #[tokio::test]
    async fn next_request_waits_for_an_arrival() {
        let (cloud, _) = cloud();
        cloud.register_frontend(1).await.unwrap();

        let waiter = {
            let cloud = cloud.clone();
            tokio::spawn(async move { cloud.next_request(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        cloud.inject(Request::browse(9, "a"));
        assert_eq!(waiter.await.unwrap().unwrap().id, RequestId(9));
    }

    #[tokio::test]
    async fn outcomes_are_accounted() {
        let (cloud, _) = cloud();
        for i in 0..3 {
            cloud.inject(Request::browse(i, "a"));
        }
        cloud
            .process_request(Request::browse(0, "a"), ServeOutcome::Browsed { value: None })
            .await
            .unwrap();
        cloud.drop_request(Request::browse(1, "a")).await.unwrap();

        let report = cloud.report();
        assert_eq!(report.generated, 3);
        assert_eq!(report.browses_served, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.unfinished(), 1);
    }

    #[tokio::test]
    async fn workload_stops_on_shutdown() {
        let (cloud, _) = cloud();
        let (tx, rx) = watch::channel(false);
        let workload = Workload::new(crate::Catalog::generate(4, 10), 0.2, Some(11));
        let handle = cloud.spawn_workload(workload, 500.0, rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let generated = cloud.report().generated;
        assert!(generated > 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cloud.report().generated, generated);
    }
}
