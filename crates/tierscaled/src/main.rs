//! tierscaled: the tierscale daemon.
//!
//! One binary for every process of a fleet:
//! - `worker`: a worker VM's entry point. Worker 1 is the coordinator,
//!   every other id asks it for a role.
//! - `simulate`: a whole fleet against the simulated cloud, in-process.
//! - `harness`: the simulated cloud served over HTTP, booting workers as
//!   child processes.
//!
//! # Usage
//!
//! ```text
//! tierscaled harness --port 7000
//! tierscaled worker 127.0.0.1 7000 1
//! tierscaled simulate --hour 20 --duration-secs 30 --seed 7
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use tierscale_core::{TierscaleConfig, WorkerId};
use tierscale_sim::SimConfig;

mod commands;

const DEFAULT_LOG_FILTER: &str = "info,tierscaled=debug,tierscale=debug";

#[derive(Parser, Debug)]
#[command(
    name = "tierscaled",
    about = "Tierscale: self-scaling two-tier web fleet",
    version,
    propagate_version = true
)]
struct Cli {
    /// TOML configuration file. Every field has a default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one worker VM against a harness.
    Worker {
        /// Harness host.
        harness_addr: String,
        /// Harness port. The coordinator serves on this port plus
        /// `fleet.port_offset`.
        harness_port: u16,
        worker_id: WorkerId,
    },
    /// Run a whole fleet in this process for a bounded time.
    Simulate {
        #[command(flatten)]
        workload: WorkloadArgs,
        #[arg(long, default_value = "30")]
        duration_secs: u64,
        /// Report format: text or json.
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Serve the simulated cloud over HTTP and boot workers as processes.
    Harness {
        #[arg(long, default_value = "7000")]
        port: u16,
        /// Host workers use to reach this harness and the coordinator.
        #[arg(long, default_value = "127.0.0.1")]
        advertise: String,
        #[command(flatten)]
        workload: WorkloadArgs,
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

/// Workload shape shared by `simulate` and `harness`.
#[derive(Args, Debug, Clone)]
struct WorkloadArgs {
    /// Requests per second at an hourly multiplier of 1.0.
    #[arg(long, default_value = "5.0")]
    rps: f64,
    /// Hour of day (0-23). Defaults to the current UTC hour.
    #[arg(long)]
    hour: Option<u8>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "0.3")]
    purchase_ratio: f64,
    /// Catalog size.
    #[arg(long, default_value = "32")]
    items: usize,
    /// Initial stock of every item.
    #[arg(long, default_value = "1000")]
    stock: u32,
}

impl WorkloadArgs {
    fn sim_config(&self) -> anyhow::Result<SimConfig> {
        if let Some(hour) = self.hour {
            anyhow::ensure!(hour < 24, "--hour must be 0-23, got {hour}");
        }
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.purchase_ratio),
            "--purchase-ratio must be within 0..=1"
        );
        Ok(SimConfig {
            base_rps: self.rps,
            purchase_ratio: self.purchase_ratio,
            hour: self.hour,
            seed: self.seed,
            items: self.items,
            stock: self.stock,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Worker {
            harness_addr,
            harness_port,
            worker_id,
        } => commands::worker::run(config, harness_addr, harness_port, worker_id).await,
        Command::Simulate {
            workload,
            duration_secs,
            format,
        } => commands::simulate::run(config, workload.sim_config()?, duration_secs, &format).await,
        Command::Harness {
            port,
            advertise,
            workload,
            duration_secs,
        } => {
            commands::harness::run(
                config,
                cli.config,
                port,
                advertise,
                workload.sim_config()?,
                duration_secs,
            )
            .await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TierscaleConfig> {
    match path {
        Some(path) => TierscaleConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let config = TierscaleConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Stop signal, set on Ctrl-C or by the caller.
fn shutdown_signal() -> (Arc<watch::Sender<bool>>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    let signal_tx = tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal_tx.send_replace(true);
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl-C handler"),
        }
    });
    (tx, rx)
}
