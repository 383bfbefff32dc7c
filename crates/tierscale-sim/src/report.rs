//! Outcome accounting.

use std::fmt;

use serde::Serialize;

use tierscale_core::ServeOutcome;

/// Summary of one simulated run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimReport {
    pub generated: u64,
    pub browses_served: u64,
    pub purchases_accepted: u64,
    pub purchases_rejected: u64,
    pub dropped: u64,
    /// Arrival to business-logic hand-off, over served requests.
    pub mean_latency_ms: f64,
    pub max_latency_ms: u64,
    pub vms_started: u64,
    pub vms_ended: u64,
    pub peak_vms: usize,
}

impl SimReport {
    pub fn served(&self) -> u64 {
        self.browses_served + self.purchases_accepted + self.purchases_rejected
    }

    /// Requests neither served nor shed when the run ended.
    pub fn unfinished(&self) -> u64 {
        self.generated
            .saturating_sub(self.served())
            .saturating_sub(self.dropped)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generated={} served={} dropped={} unfinished={} mean_latency={:.1}ms max_latency={}ms vms_started={} vms_ended={} peak_vms={}",
            self.generated,
            self.served(),
            self.dropped,
            self.unfinished(),
            self.mean_latency_ms,
            self.max_latency_ms,
            self.vms_started,
            self.vms_ended,
            self.peak_vms,
        )
    }
}

/// Running counters behind a [`SimReport`].
#[derive(Debug, Default)]
pub(crate) struct SimStats {
    report: SimReport,
    latency_total_ms: u64,
}

impl SimStats {
    pub(crate) fn generated(&mut self) {
        self.report.generated += 1;
    }

    pub(crate) fn served(&mut self, outcome: &ServeOutcome, latency_ms: Option<u64>) {
        match outcome {
            ServeOutcome::Browsed { .. } => self.report.browses_served += 1,
            ServeOutcome::Purchased { accepted: true } => self.report.purchases_accepted += 1,
            ServeOutcome::Purchased { accepted: false } => self.report.purchases_rejected += 1,
        }
        if let Some(ms) = latency_ms {
            self.latency_total_ms += ms;
            self.report.max_latency_ms = self.report.max_latency_ms.max(ms);
        }
    }

    pub(crate) fn dropped(&mut self) {
        self.report.dropped += 1;
    }

    pub(crate) fn vm_started(&mut self, running: usize) {
        self.report.vms_started += 1;
        self.report.peak_vms = self.report.peak_vms.max(running);
    }

    pub(crate) fn vm_ended(&mut self) {
        self.report.vms_ended += 1;
    }

    pub(crate) fn snapshot(&self) -> SimReport {
        let mut report = self.report.clone();
        let served = report.served();
        if served > 0 {
            report.mean_latency_ms = self.latency_total_ms as f64 / served as f64;
        }
        report
    }
}
