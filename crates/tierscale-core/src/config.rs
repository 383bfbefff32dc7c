//! tierscale.toml configuration parser.
//!
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{RequestClass, WorkerId};

/// Hourly client arrival-rate multipliers, index = hour of day.
pub const DEFAULT_HOURLY_ARRIVAL_RATES: [f64; 24] = [
    0.5, 0.3, 0.1, 0.1, 0.1, 0.2, 0.3, 0.7, 1.0, 0.8, 0.8, 0.8, 1.0, 1.1, 1.0, 0.8, 0.7, 0.8,
    1.0, 1.2, 1.5, 1.4, 1.0, 0.8,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierscaleConfig {
    pub fleet: FleetConfig,
    pub scale_up: ScaleUpConfig,
    pub retire: RetireConfig,
    pub admission: AdmissionConfig,
    pub estimator: EstimatorConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Worker identity that acts as the coordinator.
    pub coordinator_id: WorkerId,
    pub front_init_multiplier: f64,
    pub mid_init_multiplier: f64,
    /// Lower bound for each tier's initial size.
    pub min_initial: u32,
    /// Mid-tier retirement is granted only while `num_mid` exceeds this.
    pub min_mid_tier: u32,
    /// The coordinator serves on `harness_port + port_offset`.
    pub port_offset: u16,
    pub hourly_arrival_rates: Vec<f64>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            coordinator_id: 1,
            front_init_multiplier: 1.5,
            mid_init_multiplier: 3.0,
            min_initial: 1,
            min_mid_tier: 1,
            port_offset: 1,
            hourly_arrival_rates: DEFAULT_HOURLY_ARRIVAL_RATES.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleUpConfig {
    pub front_qlen_factor: f64,
    pub mid_qlen_factor: f64,
}

impl Default for ScaleUpConfig {
    fn default() -> Self {
        Self {
            front_qlen_factor: 11.8,
            mid_qlen_factor: 5.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetireConfig {
    /// Number of consecutive idle samples considered for hysteresis.
    pub window: usize,
    pub front_idle_max_ms: u64,
    pub front_idle_consistent_ms: u64,
    pub mid_idle_max_ms: u64,
    pub mid_idle_consistent_ms: u64,
    /// Pause between empty polls of the shared queue.
    pub mid_poll_interval_ms: u64,
}

impl Default for RetireConfig {
    fn default() -> Self {
        Self {
            window: 3,
            front_idle_max_ms: 1150,
            front_idle_consistent_ms: 550,
            mid_idle_max_ms: 2150,
            mid_idle_consistent_ms: 650,
            mid_poll_interval_ms: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub purchase_ttl_ms: u64,
    pub browse_ttl_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            purchase_ttl_ms: 1850,
            browse_ttl_ms: 850,
        }
    }
}

impl AdmissionConfig {
    /// Staleness ceiling for a request class.
    pub fn ceiling(&self, class: RequestClass) -> Duration {
        match class {
            RequestClass::Purchase => Duration::from_millis(self.purchase_ttl_ms),
            RequestClass::Browse => Duration::from_millis(self.browse_ttl_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Length of one measurement epoch.
    pub epoch_ms: u64,
    /// Leading slice of each epoch during which arrivals are counted.
    pub probe_ms: u64,
    pub low_threshold: u32,
    pub medium_threshold: u32,
    /// Mid-tier count at startup that latches the `Normal` level.
    pub many_initial: u32,
    /// Mid-tier floor the high-load burst provisions up to.
    pub many_mid: u32,
    pub normal_factor: f64,
    pub low_factor: f64,
    pub medium_factor: f64,
    pub high_factor: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            epoch_ms: 35_000,
            probe_ms: 1_000,
            low_threshold: 3,
            medium_threshold: 8,
            many_initial: 5,
            many_mid: 8,
            normal_factor: 1.09,
            low_factor: 1.08,
            medium_factor: 0.7,
            high_factor: 0.49,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Hard cap on queued requests; `None` leaves the queue unbounded.
    pub max_len: Option<usize>,
}

impl TierscaleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TierscaleConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the control loops cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fleet.hourly_arrival_rates.len() != 24 {
            anyhow::bail!(
                "fleet.hourly_arrival_rates must have 24 entries, got {}",
                self.fleet.hourly_arrival_rates.len()
            );
        }
        if self.retire.window == 0 {
            anyhow::bail!("retire.window must be at least 1");
        }
        if self.scale_up.front_qlen_factor <= 0.0 || self.scale_up.mid_qlen_factor <= 0.0 {
            anyhow::bail!("scale_up factors must be positive");
        }
        let est = &self.estimator;
        for (name, factor) in [
            ("normal_factor", est.normal_factor),
            ("low_factor", est.low_factor),
            ("medium_factor", est.medium_factor),
            ("high_factor", est.high_factor),
        ] {
            if factor <= 0.0 {
                anyhow::bail!("estimator.{name} must be positive");
            }
        }
        if est.medium_threshold <= est.low_threshold {
            anyhow::bail!("estimator.medium_threshold must exceed estimator.low_threshold");
        }
        if est.probe_ms == 0 || est.probe_ms > est.epoch_ms {
            anyhow::bail!("estimator.probe_ms must be within (0, epoch_ms]");
        }
        if self.queue.max_len == Some(0) {
            anyhow::bail!("queue.max_len must be at least 1 when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config: TierscaleConfig = toml::from_str("").unwrap();
        assert_eq!(config, TierscaleConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml_str = r#"
[admission]
browse_ttl_ms = 500

[queue]
max_len = 64
"#;
        let config: TierscaleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.admission.browse_ttl_ms, 500);
        assert_eq!(config.admission.purchase_ttl_ms, 1850);
        assert_eq!(config.queue.max_len, Some(64));
        assert_eq!(config.scale_up.mid_qlen_factor, 5.5);
    }

    #[test]
    fn ceiling_per_class() {
        let admission = AdmissionConfig::default();
        assert_eq!(
            admission.ceiling(RequestClass::Browse),
            Duration::from_millis(850)
        );
        assert_eq!(
            admission.ceiling(RequestClass::Purchase),
            Duration::from_millis(1850)
        );
    }

    #[test]
    fn validate_rejects_short_arrival_table() {
        let mut config = TierscaleConfig::default();
        config.fleet.hourly_arrival_rates.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut config = TierscaleConfig::default();
        config.estimator.medium_threshold = config.estimator.low_threshold;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = TierscaleConfig::default();
        config.retire.window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scale_up]\nmid_qlen_factor = 3.5").unwrap();

        let config = TierscaleConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scale_up.mid_qlen_factor, 3.5);
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let mut config = TierscaleConfig::default();
        config.queue.max_len = Some(10);
        let text = config.to_toml_string().unwrap();
        let back: TierscaleConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
