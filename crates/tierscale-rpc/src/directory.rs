//! Directory for a fleet spread over processes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tierscale_core::{BoxFuture, CoordinatorOps, DataStore, Directory, OpsError, OpsResult};

use crate::client::{HttpClient, RemoteCoordinator, RemoteStore};
use crate::server::{coordinator_service, serve};

/// Per-call limit on coordinator and cache calls.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Finds the primary at `host:coordinator_port`.
///
/// Publishing binds that port and serves the coordinator and its cache
/// until shutdown. Lookups always succeed; an unpublished primary shows up
/// as [`OpsError::Unreachable`] on the first call.
pub struct RemoteDirectory {
    host: String,
    coordinator_port: u16,
    shutdown: watch::Receiver<bool>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteDirectory {
    pub fn new(host: impl Into<String>, coordinator_port: u16, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            host: host.into(),
            coordinator_port,
            shutdown,
            server: Mutex::new(None),
        }
    }

    pub fn coordinator_address(&self) -> String {
        format!("{}:{}", self.host, self.coordinator_port)
    }

    fn client(&self) -> HttpClient {
        HttpClient::new(self.coordinator_address()).with_timeout(CALL_TIMEOUT)
    }

    /// Wait for the published server, if any, to stop.
    pub async fn join(&self) {
        let handle = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "coordinator server task failed");
            }
        }
    }
}

impl Directory for RemoteDirectory {
    fn publish(
        &self,
        coordinator: Arc<dyn CoordinatorOps>,
        cache: Arc<dyn DataStore>,
    ) -> BoxFuture<'_, OpsResult<()>> {
        Box::pin(async move {
            let bind = format!("0.0.0.0:{}", self.coordinator_port);
            let listener = TcpListener::bind(&bind)
                .await
                .map_err(|e| OpsError::Unreachable(format!("bind {bind}: {e}")))?;
            info!(addr = %bind, "publishing coordinator");

            let router = coordinator_service(coordinator, cache);
            let shutdown = self.shutdown.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = serve(listener, router, shutdown).await {
                    error!(error = %e, "coordinator server failed");
                }
            });

            let previous = self
                .server
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .replace(handle);
            if previous.is_some() {
                warn!("coordinator published twice");
            }
            Ok(())
        })
    }

    fn coordinator(&self) -> OpsResult<Arc<dyn CoordinatorOps>> {
        Ok(Arc::new(RemoteCoordinator::new(self.client())))
    }

    fn cache(&self) -> OpsResult<Arc<dyn DataStore>> {
        Ok(Arc::new(RemoteStore::cache(self.client())))
    }
}
