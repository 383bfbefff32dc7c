//! Idle-window tracker: hysteresis for self-retirement.
//!
//! Each worker keeps its own window of recent idle gaps. One long gap past
//! the idle ceiling retires immediately; otherwise only a full window of
//! gaps above the consistency threshold does. A single idle tick never
//! triggers retirement on its own.

use std::collections::VecDeque;
use std::fmt;

use tierscale_core::config::RetireConfig;

/// Fixed-capacity FIFO of recent idle durations in milliseconds.
#[derive(Debug, Clone)]
pub struct IdleWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl IdleWindow {
    /// Create an empty window. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest once the window is full.
    pub fn push(&mut self, idle_ms: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(idle_ms);
    }

    /// True when the window is full and every sample is strictly above
    /// `threshold_ms`.
    pub fn consistently_above(&self, threshold_ms: u64) -> bool {
        self.samples.len() == self.capacity && self.samples.iter().all(|&s| s > threshold_ms)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> Vec<u64> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Why a worker decided it is idle enough to retire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireReason {
    /// The latest gap alone exceeded the idle ceiling.
    IdleCeiling { idle_ms: u64 },
    /// Every sample in a full window exceeded the consistency threshold.
    ConsistentlyIdle { samples: Vec<u64> },
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetireReason::IdleCeiling { idle_ms } => write!(f, "idle for {idle_ms}ms"),
            RetireReason::ConsistentlyIdle { samples } => {
                write!(f, "consistently idle, last gaps {samples:?}ms")
            }
        }
    }
}

/// Per-tier retirement thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleThresholds {
    /// Absolute ceiling on a single gap.
    pub max_ms: u64,
    /// Lower threshold every windowed gap must exceed.
    pub consistent_ms: u64,
}

impl IdleThresholds {
    pub fn front(config: &RetireConfig) -> Self {
        Self {
            max_ms: config.front_idle_max_ms,
            consistent_ms: config.front_idle_consistent_ms,
        }
    }

    pub fn middle(config: &RetireConfig) -> Self {
        Self {
            max_ms: config.mid_idle_max_ms,
            consistent_ms: config.mid_idle_consistent_ms,
        }
    }

    /// Evaluate the retirement rule for the latest gap and the window.
    pub fn should_retire(&self, latest_ms: u64, window: &IdleWindow) -> Option<RetireReason> {
        if latest_ms > self.max_ms {
            return Some(RetireReason::IdleCeiling { idle_ms: latest_ms });
        }
        if window.consistently_above(self.consistent_ms) {
            return Some(RetireReason::ConsistentlyIdle {
                samples: window.samples(),
            });
        }
        None
    }
}
