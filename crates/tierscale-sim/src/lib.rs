//! tierscale-sim: a simulated cloud for tierscale fleets.
//!
//! [`SimCloud`] implements `CloudHarness`: it generates client requests
//! with exponential inter-arrival times scaled by the hour-of-day table,
//! hands them to whichever registered frontend polls next, starts worker
//! VMs through a [`VmLauncher`], and accounts every served or shed
//! request in a [`SimReport`].

pub mod cloud;
pub mod launcher;
pub mod report;
pub mod simulate;
pub mod workload;

pub use cloud::SimCloud;
pub use launcher::{InProcessLauncher, ProcessLauncher, VmLauncher};
pub use report::SimReport;
pub use simulate::{SimConfig, run_in_process};
pub use workload::{Catalog, CatalogItem, Workload};
