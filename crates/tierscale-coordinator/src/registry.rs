//! Worker registry: worker id to role, assigned once at provisioning.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tierscale_core::{Role, WorkerId};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Write-once mapping of provisioned workers to their roles.
///
/// Entries are never removed: worker ids are not reused within a run, and
/// tier sizes are tracked separately by [`crate::FleetCounter`].
#[derive(Default)]
pub struct WorkerRegistry {
    roles: RwLock<HashMap<WorkerId, Role>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the role of a freshly provisioned worker.
    ///
    /// Assigning the same role twice is a no-op; a different role is a
    /// conflict and leaves the original assignment in place.
    pub fn assign(&self, worker: WorkerId, role: Role) -> CoordinatorResult<()> {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        match roles.get(&worker) {
            Some(&existing) if existing != role => {
                Err(CoordinatorError::RoleConflict { worker, existing })
            }
            Some(_) => Ok(()),
            None => {
                roles.insert(worker, role);
                Ok(())
            }
        }
    }

    pub fn role(&self, worker: WorkerId) -> Option<Role> {
        self.roles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&worker)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.roles.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
