//! Staleness-based admission control for dequeued requests.

use std::time::Duration;

use tierscale_core::clock::as_millis;
use tierscale_core::config::AdmissionConfig;
use tierscale_core::{QueuedRequest, RequestClass};

/// Verdict for one dequeued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Serve,
    /// Shed without serving; the request waited `age_ms`, at or past
    /// its class ceiling of `ceiling_ms`.
    Drop { age_ms: u64, ceiling_ms: u64 },
}

/// Per-class staleness ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    purchase: Duration,
    browse: Duration,
}

impl StalenessPolicy {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            purchase: config.ceiling(RequestClass::Purchase),
            browse: config.ceiling(RequestClass::Browse),
        }
    }

    pub fn ceiling(&self, class: RequestClass) -> Duration {
        match class {
            RequestClass::Purchase => self.purchase,
            RequestClass::Browse => self.browse,
        }
    }

    /// Serve unless the request has aged to its class ceiling.
    pub fn admit(&self, entry: &QueuedRequest, now_ms: u64) -> Admission {
        let age_ms = entry.age_ms(now_ms);
        let ceiling_ms = as_millis(self.ceiling(entry.request.class()));
        if age_ms >= ceiling_ms {
            Admission::Drop { age_ms, ceiling_ms }
        } else {
            Admission::Serve
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(&AdmissionConfig::default())
    }
}
