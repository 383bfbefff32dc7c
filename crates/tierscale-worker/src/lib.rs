//! tierscale-worker: the per-process tier loops.
//!
//! Every process in the fleet runs exactly one of three loops:
//!
//! ```text
//! id == coordinator_id ──▶ primary   (intake + admission + scale-up)
//! role == Front        ──▶ forwarder (intake → CoordinatorOps::submit)
//! role == Middle       ──▶ processor (fetch → staleness check → serve)
//! ```
//!
//! Non-primary workers learn their role from the coordinator before
//! entering a loop. Idle bookkeeping is private to each loop; the only
//! shared state is behind the coordinator's operations.

pub mod admission;
pub mod directory;
pub mod front;
pub mod launch;
pub mod middle;
pub mod serve;

pub use admission::{Admission, StalenessPolicy};
pub use directory::LocalDirectory;
pub use launch::{WorkerContext, WorkerExit, resolve_role, run_coordinator, run_worker};
pub use serve::RequestRouter;
