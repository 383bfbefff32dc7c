//! A whole simulated fleet, coordinator to business logic, in one process.

use std::time::Duration;

use tierscale_core::TierscaleConfig;
use tierscale_sim::{SimConfig, run_in_process};

fn evening(seed: u64) -> SimConfig {
    SimConfig {
        base_rps: 20.0,
        hour: Some(20),
        seed: Some(seed),
        items: 8,
        stock: 500,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn evening_fleet_boots_and_serves() {
    let report = run_in_process(
        TierscaleConfig::default(),
        evening(42),
        Duration::from_millis(1_500),
    )
    .await
    .unwrap();

    // Hour 20 sizes the fleet at 3 front and 5 mid; the coordinator is one
    // of the fronts, so at least 7 VMs are started.
    assert!(report.vms_started >= 7, "{report}");
    assert!(report.peak_vms >= 7, "{report}");
    assert!(report.generated > 0, "{report}");
    assert!(report.served() > 0, "{report}");
    assert!(report.served() + report.dropped <= report.generated, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quiet_hour_starts_the_minimum_fleet() {
    let mut config = TierscaleConfig::default();
    // Keep every worker up for the whole run.
    config.retire.front_idle_max_ms = 60_000;
    config.retire.mid_idle_max_ms = 60_000;
    config.retire.front_idle_consistent_ms = 60_000;
    config.retire.mid_idle_consistent_ms = 60_000;

    let sim = SimConfig {
        hour: Some(3),
        ..evening(7)
    };
    let report = run_in_process(config, sim, Duration::from_millis(500))
        .await
        .unwrap();

    // Hour 3 sizes both tiers at one worker; only the mid-tier needs a VM.
    assert_eq!(report.vms_started, 1, "{report}");
    assert_eq!(report.vms_ended, 0, "{report}");
}
