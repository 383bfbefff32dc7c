use std::time::Duration;

use tracing::info;

use tierscale_core::TierscaleConfig;
use tierscale_sim::{SimConfig, run_in_process};

pub async fn run(
    config: TierscaleConfig,
    sim: SimConfig,
    duration_secs: u64,
    format: &str,
) -> anyhow::Result<()> {
    let report = run_in_process(config, sim, Duration::from_secs(duration_secs)).await?;
    info!(served = report.served(), dropped = report.dropped, "simulation complete");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{report}"),
    }
    Ok(())
}
