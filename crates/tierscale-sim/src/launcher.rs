//! How the simulated cloud boots a worker VM.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tierscale_core::{CloudHarness, DataStore, Directory, OpsError, OpsResult, TierscaleConfig, WorkerId};
use tierscale_worker::{WorkerContext, run_worker};

/// Boots worker `id`. Must not block: the worker runs in the background.
pub trait VmLauncher: Send + Sync {
    fn launch(&self, id: WorkerId, harness: Arc<dyn CloudHarness>) -> OpsResult<()>;
}

/// Runs each worker as a tokio task in this process.
pub struct InProcessLauncher {
    config: TierscaleConfig,
    backing: Arc<dyn DataStore>,
    directory: Arc<dyn Directory>,
    shutdown: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InProcessLauncher {
    pub fn new(
        config: TierscaleConfig,
        backing: Arc<dyn DataStore>,
        directory: Arc<dyn Directory>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            backing,
            directory,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The context every worker of this fleet runs with.
    pub fn context(&self, harness: Arc<dyn CloudHarness>) -> WorkerContext {
        WorkerContext {
            config: self.config.clone(),
            harness,
            backing: self.backing.clone(),
            directory: self.directory.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Wait for every launched worker task to finish.
    pub async fn join_all(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}

impl VmLauncher for InProcessLauncher {
    fn launch(&self, id: WorkerId, harness: Arc<dyn CloudHarness>) -> OpsResult<()> {
        let ctx = self.context(harness);
        let task = tokio::spawn(async move {
            match run_worker(id, ctx).await {
                Ok(exit) => info!(worker_id = id, ?exit, "worker exited"),
                Err(e) => {
                    let error = format!("{e:#}");
                    error!(worker_id = id, %error, "worker failed");
                }
            }
        });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
        Ok(())
    }
}

/// Runs each worker as a `tierscaled worker` child process.
pub struct ProcessLauncher {
    program: PathBuf,
    harness_host: String,
    harness_port: u16,
    config_path: Option<PathBuf>,
    children: Mutex<HashMap<WorkerId, Child>>,
}

impl ProcessLauncher {
    pub fn new(
        program: impl Into<PathBuf>,
        harness_host: impl Into<String>,
        harness_port: u16,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            harness_host: harness_host.into(),
            harness_port,
            config_path,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// The command line used for worker `id`.
    pub fn command(&self, id: WorkerId) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("worker")
            .arg(&self.harness_host)
            .arg(self.harness_port.to_string())
            .arg(id.to_string());
        if let Some(path) = &self.config_path {
            cmd.arg("--config").arg(path);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Kill every child still running and wait for it.
    pub async fn stop_all(&self) {
        let children =
            std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for (id, mut child) in children {
            if let Err(e) = child.start_kill() {
                warn!(worker_id = id, error = %e, "failed to signal worker process");
            }
            match child.wait().await {
                Ok(status) => info!(worker_id = id, %status, "worker process stopped"),
                Err(e) => warn!(worker_id = id, error = %e, "failed to reap worker process"),
            }
        }
    }
}

impl VmLauncher for ProcessLauncher {
    fn launch(&self, id: WorkerId, _harness: Arc<dyn CloudHarness>) -> OpsResult<()> {
        let child = self
            .command(id)
            .spawn()
            .map_err(|e| OpsError::Harness(format!("spawn worker {id}: {e}")))?;
        info!(worker_id = id, pid = child.id(), "worker process started");
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierscale_core::{BoxFuture, Request, ServeOutcome};

    #[test]
    fn worker_command_follows_the_entry_contract() {
        let launcher = ProcessLauncher::new(
            "/usr/local/bin/tierscaled",
            "10.0.0.5",
            7000,
            Some(PathBuf::from("/etc/tierscale.toml")),
        );
        let cmd = launcher.command(4);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/usr/local/bin/tierscaled");
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["worker", "10.0.0.5", "7000", "4", "--config", "/etc/tierscale.toml"]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_a_harness_error() {
        struct NoHarness;
        impl CloudHarness for NoHarness {
            fn next_request(&self, _: WorkerId) -> BoxFuture<'_, OpsResult<Request>> {
                Box::pin(async { Err(OpsError::Harness("none".into())) })
            }
            fn start_vm(&self) -> BoxFuture<'_, OpsResult<WorkerId>> {
                Box::pin(async { Err(OpsError::Harness("none".into())) })
            }
            fn end_vm(&self, _: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn register_frontend(&self, _: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn unregister_frontend(&self, _: WorkerId) -> BoxFuture<'_, OpsResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn time_of_day(&self) -> BoxFuture<'_, OpsResult<u8>> {
                Box::pin(async { Ok(0) })
            }
            fn process_request(
                &self,
                _: Request,
                _: ServeOutcome,
            ) -> BoxFuture<'_, OpsResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn drop_request(&self, _: Request) -> BoxFuture<'_, OpsResult<()>> {
                Box::pin(async { Ok(()) })
            }
        }

        let launcher = ProcessLauncher::new("/nonexistent/tierscaled", "127.0.0.1", 1, None);
        let err = launcher.launch(2, Arc::new(NoHarness)).unwrap_err();
        assert!(matches!(err, OpsError::Harness(msg) if msg.contains("spawn worker 2")));
    }
}
