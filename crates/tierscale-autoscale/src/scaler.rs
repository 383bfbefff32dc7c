//! Scale-up policy and initial fleet sizing.
//!
//! The coordinator evaluates the policy once per admitted request. Each
//! trigger asks for exactly one worker of the corresponding tier; only
//! the high-load burst asks for several at once.

use tierscale_core::config::{FleetConfig, ScaleUpConfig};
use tracing::debug;

/// Tier sizes, counting the coordinator itself as a front-tier worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetSize {
    pub front: u32,
    pub middle: u32,
}

/// Workers to provision as the result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleDecision {
    pub add_front: u32,
    pub add_middle: u32,
}

impl ScaleDecision {
    pub const NONE: ScaleDecision = ScaleDecision {
        add_front: 0,
        add_middle: 0,
    };

    pub fn is_none(&self) -> bool {
        self.add_front == 0 && self.add_middle == 0
    }
}

/// Queue-length thresholds per tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePolicy {
    front_qlen_factor: f64,
    mid_qlen_factor: f64,
}

impl ScalePolicy {
    pub fn new(config: &ScaleUpConfig) -> Self {
        Self {
            front_qlen_factor: config.front_qlen_factor,
            mid_qlen_factor: config.mid_qlen_factor,
        }
    }

    /// Decide what to provision for the current queue length.
    ///
    /// `burst_to`, when set, raises the mid tier to that size before the
    /// regular mid-tier trigger is checked against the raised count.
    pub fn evaluate(
        &self,
        queue_len: usize,
        fleet: FleetSize,
        load_factor: f64,
        burst_to: Option<u32>,
    ) -> ScaleDecision {
        let q = queue_len as f64;
        let mut decision = ScaleDecision::NONE;

        let mid_after_burst = burst_to.map_or(fleet.middle, |floor| floor.max(fleet.middle));
        decision.add_middle = mid_after_burst - fleet.middle;

        if q > fleet.front as f64 * self.front_qlen_factor * load_factor {
            decision.add_front = 1;
        }
        if q > mid_after_burst as f64 * self.mid_qlen_factor * load_factor {
            decision.add_middle += 1;
        }

        if !decision.is_none() {
            debug!(
                queue_len,
                front = fleet.front,
                middle = fleet.middle,
                load_factor,
                add_front = decision.add_front,
                add_middle = decision.add_middle,
                "scale-up triggered"
            );
        }
        decision
    }
}

/// Startup fleet size for the given hour of day.
///
/// Each tier is `ceil(rate * multiplier)`, floored at `min_initial`.
pub fn initial_fleet(hour: u8, config: &FleetConfig) -> FleetSize {
    let rates = &config.hourly_arrival_rates;
    let rate = if rates.is_empty() {
        1.0
    } else {
        rates[hour as usize % rates.len()]
    };
    let size = |multiplier: f64| ((rate * multiplier).ceil() as u32).max(config.min_initial);
    FleetSize {
        front: size(config.front_init_multiplier),
        middle: size(config.mid_init_multiplier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(front: f64, mid: f64) -> ScalePolicy {
        ScalePolicy::new(&ScaleUpConfig {
            front_qlen_factor: front,
            mid_qlen_factor: mid,
        })
    }

    #[test]
    fn empty_queue_needs_nothing() {
        let p = policy(11.8, 5.5);
        let fleet = FleetSize { front: 1, middle: 1 };
        assert!(p.evaluate(0, fleet, 1.0, None).is_none());
    }

    #[test]
    fn long_queue_adds_exactly_one_mid_worker() {
        let p = policy(100.0, 3.5);
        let fleet = FleetSize { front: 1, middle: 1 };
        let decision = p.evaluate(20, fleet, 1.0, None);
        assert_eq!(
            decision,
            ScaleDecision {
                add_front: 0,
                add_middle: 1
            }
        );
    }

    #[test]
    fn threshold_is_strict() {
        let p = policy(10.0, 5.0);
        let fleet = FleetSize { front: 1, middle: 2 };
        assert!(p.evaluate(10, fleet, 1.0, None).is_none());
        assert_eq!(p.evaluate(11, fleet, 1.0, None).add_front, 1);
        assert_eq!(p.evaluate(11, fleet, 1.0, None).add_middle, 1);
    }

    #[test]
    fn smaller_load_factor_scales_earlier() {
        let p = policy(11.8, 5.5);
        let fleet = FleetSize { front: 1, middle: 2 };
        assert_eq!(p.evaluate(8, fleet, 1.0, None).add_middle, 0);
        assert_eq!(p.evaluate(8, fleet, 0.49, None).add_middle, 1);
    }

    #[test]
    fn burst_raises_mid_tier_to_floor() {
        let p = policy(11.8, 5.5);
        let fleet = FleetSize { front: 1, middle: 3 };
        let decision = p.evaluate(0, fleet, 0.49, Some(8));
        assert_eq!(decision.add_middle, 5);
        assert_eq!(decision.add_front, 0);
    }

    #[test]
    fn burst_is_noop_above_floor() {
        let p = policy(11.8, 5.5);
        let fleet = FleetSize { front: 1, middle: 9 };
        assert!(p.evaluate(0, fleet, 0.49, Some(8)).is_none());
    }

    #[test]
    fn initial_fleet_follows_hourly_rate() {
        let config = FleetConfig::default();
        // 20:00 → rate 1.5: front ceil(2.25)=3, mid ceil(4.5)=5.
        assert_eq!(initial_fleet(20, &config), FleetSize { front: 3, middle: 5 });
        // 02:00 → rate 0.1: front ceil(0.15)=1, mid ceil(0.3)=1.
        assert_eq!(initial_fleet(2, &config), FleetSize { front: 1, middle: 1 });
    }

    #[test]
    fn initial_fleet_respects_min() {
        let config = FleetConfig {
            min_initial: 4,
            ..FleetConfig::default()
        };
        assert_eq!(initial_fleet(2, &config), FleetSize { front: 4, middle: 4 });
    }
}
