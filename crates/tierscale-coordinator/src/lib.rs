//! tierscale-coordinator: the primary's scaling controller.
//!
//! The coordinator owns every piece of fleet-wide mutable state and is the
//! only place it changes. Workers reach it exclusively through
//! [`tierscale_core::CoordinatorOps`].
//!
//! # Architecture
//!
//! ```text
//! Coordinator
//!   ├── WorkQueue (FIFO + timestamp table, one mutex)
//!   ├── WorkerRegistry (worker id → role, write-once)
//!   ├── FleetCounter (num_front / num_mid, one mutex for check-and-decrement)
//!   ├── LoadEstimator (primary loop only)
//!   └── ScalePolicy → CloudHarness::start_vm
//! ```
//!
//! Request admission, cache access and idle bookkeeping stay outside every
//! lock; only the queue pair and the retirement check are serialized.

pub mod coordinator;
pub mod error;
pub mod fleet;
pub mod queue;
pub mod registry;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use fleet::FleetCounter;
pub use queue::WorkQueue;
pub use registry::WorkerRegistry;
