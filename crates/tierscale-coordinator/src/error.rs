//! Coordinator error types.

use thiserror::Error;

use tierscale_core::{OpsError, Role, WorkerId};

/// Errors that can occur while bootstrapping or provisioning the fleet.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("harness call failed during {stage}: {source}")]
    Harness {
        stage: &'static str,
        #[source]
        source: OpsError,
    },

    #[error("worker {worker} already has role {existing}")]
    RoleConflict { worker: WorkerId, existing: Role },
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
