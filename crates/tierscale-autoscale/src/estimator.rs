//! Load estimator: classifies arrival intensity into a load level.
//!
//! Time is cut into fixed epochs. During the leading probe slice of each
//! epoch every admitted request bumps a counter, and the counter value
//! classifies the load:
//!
//! ```text
//! count <  low_threshold     → Low     (factor low_factor, scale up later)
//! count <  medium_threshold  → Medium  (factor medium_factor)
//! count >= medium_threshold  → High    (factor high_factor + burst to many_mid)
//! ```
//!
//! The counter restarts with each epoch, but the level only ever rises:
//! a quiet epoch after a busy one keeps the more aggressive factor.
//!
//! The first epoch is special: if the startup fleet already has
//! `many_initial` mid-tier workers the level latches to `Normal` and is
//! never re-evaluated.

use tierscale_core::LoadLevel;
use tierscale_core::config::EstimatorConfig;
use tracing::debug;

/// What the estimator concluded from one admitted request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadObservation {
    pub level: LoadLevel,
    /// Multiplier applied to the scale-up thresholds.
    pub factor: f64,
    /// Whether `level` differs from the level before this observation.
    pub changed: bool,
    /// On a high-load classification: the mid-tier count to burst up to.
    pub burst_to: Option<u32>,
}

/// Per-epoch arrival counter and the resulting load level.
#[derive(Debug, Clone)]
pub struct LoadEstimator {
    config: EstimatorConfig,
    level: LoadLevel,
    counter: u32,
    epoch: u64,
}

impl LoadEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            level: LoadLevel::Unmeasured,
            counter: 0,
            epoch: 0,
        }
    }

    pub fn level(&self) -> LoadLevel {
        self.level
    }

    pub fn factor(&self) -> f64 {
        self.factor_for(self.level)
    }

    /// Current arrival count within the active probe slice.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    fn factor_for(&self, level: LoadLevel) -> f64 {
        match level {
            LoadLevel::Unmeasured => 1.0,
            LoadLevel::Normal => self.config.normal_factor,
            LoadLevel::Low => self.config.low_factor,
            LoadLevel::Medium => self.config.medium_factor,
            LoadLevel::High => self.config.high_factor,
        }
    }

    /// Account for one admitted request.
    ///
    /// `elapsed_ms` is time since the coordinator started serving;
    /// `num_mid` is the current mid-tier count.
    pub fn observe(&mut self, elapsed_ms: u64, num_mid: u32) -> LoadObservation {
        let epoch_ms = self.config.epoch_ms.max(1);
        let epoch = elapsed_ms / epoch_ms;
        let offset = elapsed_ms % epoch_ms;
        let before = self.level;
        let mut burst_to = None;

        if epoch != self.epoch {
            self.epoch = epoch;
            self.counter = 0;
        }

        if offset < self.config.probe_ms {
            if epoch == 0 {
                if num_mid >= self.config.many_initial {
                    self.level = LoadLevel::Normal;
                }
            } else if self.level != LoadLevel::Normal {
                self.counter += 1;
                let measured = if self.counter < self.config.low_threshold {
                    LoadLevel::Low
                } else if self.counter < self.config.medium_threshold {
                    LoadLevel::Medium
                } else {
                    LoadLevel::High
                };
                if escalation(measured) > escalation(self.level) {
                    self.level = measured;
                }
                if self.level == LoadLevel::High && num_mid < self.config.many_mid {
                    burst_to = Some(self.config.many_mid);
                }
            }
        }

        let changed = self.level != before;
        if changed {
            debug!(
                epoch,
                counter = self.counter,
                from = %before,
                to = %self.level,
                factor = self.factor(),
                "load level changed"
            );
        }

        LoadObservation {
            level: self.level,
            factor: self.factor(),
            changed,
            burst_to,
        }
    }
}

/// Position of a measured level on the escalation ladder.
fn escalation(level: LoadLevel) -> u8 {
    match level {
        LoadLevel::Unmeasured | LoadLevel::Normal => 0,
        LoadLevel::Low => 1,
        LoadLevel::Medium => 2,
        LoadLevel::High => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> LoadEstimator {
        LoadEstimator::new(EstimatorConfig::default())
    }

    #[test]
    fn starts_unmeasured_with_neutral_factor() {
        let est = estimator();
        assert_eq!(est.level(), LoadLevel::Unmeasured);
        assert_eq!(est.factor(), 1.0);
    }

    #[test]
    fn large_startup_fleet_latches_normal() {
        let mut est = estimator();
        let obs = est.observe(10, 5);
        assert_eq!(obs.level, LoadLevel::Normal);
        assert!(obs.changed);
        assert_eq!(obs.factor, 1.09);

        // Later epochs at any intensity leave it alone.
        for i in 0..20 {
            let obs = est.observe(35_000 + i, 1);
            assert_eq!(obs.level, LoadLevel::Normal);
            assert_eq!(obs.burst_to, None);
        }
    }

    #[test]
    fn small_startup_fleet_stays_unmeasured_in_first_epoch() {
        let mut est = estimator();
        let obs = est.observe(10, 2);
        assert_eq!(obs.level, LoadLevel::Unmeasured);
        assert!(!obs.changed);
    }

    #[test]
    fn classifies_by_count_within_probe_slice() {
        let mut est = estimator();
        let start = 35_000;

        assert_eq!(est.observe(start, 1).level, LoadLevel::Low); // 1
        assert_eq!(est.observe(start + 1, 1).level, LoadLevel::Low); // 2
        assert_eq!(est.observe(start + 2, 1).level, LoadLevel::Medium); // 3
        for i in 3..7 {
            assert_eq!(est.observe(start + i, 1).level, LoadLevel::Medium);
        }
        let obs = est.observe(start + 7, 1); // 8
        assert_eq!(obs.level, LoadLevel::High);
        assert_eq!(obs.factor, 0.49);
        assert_eq!(obs.burst_to, Some(8));
    }

    #[test]
    fn no_burst_once_many_mid_exist() {
        let mut est = estimator();
        for i in 0..8 {
            est.observe(35_000 + i, 8);
        }
        let obs = est.observe(35_010, 8);
        assert_eq!(obs.level, LoadLevel::High);
        assert_eq!(obs.burst_to, None);
    }

    #[test]
    fn arrivals_outside_probe_slice_are_not_counted() {
        let mut est = estimator();
        let obs = est.observe(35_000 + 1_500, 1);
        assert_eq!(obs.level, LoadLevel::Unmeasured);
        assert_eq!(est.counter(), 0);
    }

    #[test]
    fn counter_resets_each_epoch() {
        let mut est = estimator();
        for i in 0..5 {
            est.observe(35_000 + i, 1);
        }
        assert_eq!(est.counter(), 5);

        let obs = est.observe(70_000, 1);
        assert_eq!(est.counter(), 1);
        assert_eq!(obs.level, LoadLevel::Medium);
        assert!(!obs.changed);
    }

    #[test]
    fn high_load_is_never_walked_back() {
        let mut est = estimator();
        for i in 0..8 {
            est.observe(35_000 + i, 8);
        }
        assert_eq!(est.level(), LoadLevel::High);

        // A quiet next epoch counts from zero but keeps the high factor.
        let obs = est.observe(70_000, 8);
        assert_eq!(est.counter(), 1);
        assert_eq!(obs.level, LoadLevel::High);
        assert_eq!(obs.factor, 0.49);
        assert!(!obs.changed);
    }

    #[test]
    fn low_escalates_to_medium_in_a_later_epoch() {
        let mut est = estimator();
        est.observe(35_000, 1);
        assert_eq!(est.level(), LoadLevel::Low);

        for i in 0..3 {
            est.observe(70_000 + i, 1);
        }
        assert_eq!(est.level(), LoadLevel::Medium);
    }
}
