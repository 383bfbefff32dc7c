//! tierscale-core: shared vocabulary of the tierscale control plane.
//!
//! Every process in a tierscale fleet (the coordinator, front-tier
//! forwarders, mid-tier processors, and the simulation harness) speaks
//! in the types defined here. The operation traits in [`ops`] describe
//! each remote seam; the transport crate implements them over HTTP and
//! the in-process implementations satisfy them directly.

pub mod clock;
pub mod config;
pub mod error;
pub mod ops;
pub mod types;

pub use config::TierscaleConfig;
pub use error::{OpsError, OpsResult};
pub use ops::{BoxFuture, CloudHarness, CoordinatorOps, DataStore, Directory};
pub use types::*;
