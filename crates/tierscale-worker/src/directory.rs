//! In-process service directory.

use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use tierscale_core::{BoxFuture, CoordinatorOps, DataStore, Directory, OpsError, OpsResult};

/// Directory for a fleet whose workers share one process.
///
/// Unbound until the primary publishes; the first publication wins.
#[derive(Default)]
pub struct LocalDirectory {
    coordinator: OnceLock<Arc<dyn CoordinatorOps>>,
    cache: OnceLock<Arc<dyn DataStore>>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.coordinator.get().is_some() && self.cache.get().is_some()
    }
}

impl Directory for LocalDirectory {
    fn publish(
        &self,
        coordinator: Arc<dyn CoordinatorOps>,
        cache: Arc<dyn DataStore>,
    ) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            let fresh = self.coordinator.set(coordinator).is_ok() & self.cache.set(cache).is_ok();
            if fresh {
                info!("coordinator published to local directory");
            } else {
                warn!("local directory already bound, keeping the first publication");
            }
            Ok(())
        })
    }

    fn coordinator(&self) -> OpsResult<Arc<dyn CoordinatorOps>> {
        self.coordinator
            .get()
            .cloned()
            .ok_or_else(|| OpsError::Unreachable("coordinator not yet published".into()))
    }

    fn cache(&self) -> OpsResult<Arc<dyn DataStore>> {
        self.cache
            .get()
            .cloned()
            .ok_or_else(|| OpsError::Unreachable("cache not yet published".into()))
    }
}
