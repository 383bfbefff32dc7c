//! Operation traits for every remote seam.
//!
//! Each trait is object-safe and returns boxed futures so the same
//! `Arc<dyn Trait>` can be an in-process value or an HTTP client.
//!
//! ```text
//! front-tier ──submit──▶ CoordinatorOps ◀──fetch / request_retire_mid── mid-tier
//!                                                                        │
//!                          DataStore (cache) ◀──get / set──────────────────┤
//!                          DataStore (backing) ◀──get / transaction────────┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::OpsResult;
use crate::types::{FleetStatus, QueuedRequest, Request, Role, ServeOutcome, WorkerId};

/// Boxed, sendable future used by all operation traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the coordinator exposes to workers.
pub trait CoordinatorOps: Send + Sync {
    /// Enqueue a request forwarded by a front-tier worker.
    ///
    /// `Ok(false)` means the queue refused the insert.
    fn submit(&self, request: Request) -> BoxFuture<'_, OpsResult<bool>>;

    /// Pop the head of the shared queue with its enqueue time.
    /// Never blocks; `Ok(None)` means the queue was empty.
    fn fetch(&self) -> BoxFuture<'_, OpsResult<Option<QueuedRequest>>>;

    /// Ask permission to retire a mid-tier worker. A grant has already
    /// been counted when this returns `Ok(true)`.
    fn request_retire_mid(&self) -> BoxFuture<'_, OpsResult<bool>>;

    /// Advisory notice that a front-tier worker is retiring.
    fn notify_front_retired(&self) -> BoxFuture<'_, OpsResult<()>>;

    /// The role assigned to `worker` when it was provisioned.
    fn query_role(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<Role>>;

    /// Snapshot of the scaling state.
    fn status(&self) -> BoxFuture<'_, OpsResult<FleetStatus>>;
}

/// Key/value surface shared by the cache and the backing store.
pub trait DataStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, OpsResult<Option<String>>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        auth: &'a str,
    ) -> BoxFuture<'a, OpsResult<bool>>;

    fn transaction<'a>(
        &'a self,
        item: &'a str,
        price: f32,
        qty: u32,
    ) -> BoxFuture<'a, OpsResult<bool>>;
}

/// The simulated cloud: request source, VM lifecycle, business logic.
pub trait CloudHarness: Send + Sync {
    /// Block until the next client request for `frontend` exists.
    fn next_request(&self, frontend: WorkerId) -> BoxFuture<'_, OpsResult<Request>>;

    /// Provision a new worker VM and return its identity.
    fn start_vm(&self) -> BoxFuture<'_, OpsResult<WorkerId>>;

    /// Retire the worker VM `worker`.
    fn end_vm(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>>;

    /// Join the load balancer's intake set.
    fn register_frontend(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>>;

    /// Leave the load balancer's intake set.
    fn unregister_frontend(&self, worker: WorkerId) -> BoxFuture<'_, OpsResult<()>>;

    /// Simulated hour of day, `0..24`.
    fn time_of_day(&self) -> BoxFuture<'_, OpsResult<u8>>;

    /// Hand a served request to the business logic.
    fn process_request(
        &self,
        request: Request,
        outcome: ServeOutcome,
    ) -> BoxFuture<'_, OpsResult<()>>;

    /// Report that a request was shed without being served.
    fn drop_request(&self, request: Request) -> BoxFuture<'_, OpsResult<()>>;
}

/// Where workers find the coordinator and its cache.
///
/// The primary publishes both before it sizes the fleet; lookups before
/// that fail with [`crate::OpsError::Unreachable`].
pub trait Directory: Send + Sync {
    fn publish(
        &self,
        coordinator: Arc<dyn CoordinatorOps>,
        cache: Arc<dyn DataStore>,
    ) -> BoxFuture<'_, OpsResult<()>>;

    fn coordinator(&self) -> OpsResult<Arc<dyn CoordinatorOps>>;

    fn cache(&self) -> OpsResult<Arc<dyn DataStore>>;
}
