//! Fleet counter: tier sizes and the retirement floor.
//!
//! Mid-tier retirement is a check-and-decrement under one mutex, so any
//! number of concurrent requests can never push `num_mid` below the floor.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tierscale_autoscale::FleetSize;
use tierscale_core::Role;

/// Current front-tier and mid-tier worker counts.
#[derive(Default)]
pub struct FleetCounter {
    size: Mutex<FleetSize>,
}

impl FleetCounter {
    pub fn new(initial: FleetSize) -> Self {
        Self {
            size: Mutex::new(initial),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FleetSize> {
        self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> FleetSize {
        *self.lock()
    }

    /// Count `n` newly provisioned workers of `role`.
    pub fn add(&self, role: Role, n: u32) -> FleetSize {
        let mut size = self.lock();
        match role {
            Role::Front => size.front += n,
            Role::Middle => size.middle += n,
        }
        *size
    }

    /// Grant a mid-tier retirement only if the count stays at or above
    /// `floor` afterwards. A grant is counted before this returns.
    pub fn try_retire_mid(&self, floor: u32) -> bool {
        let mut size = self.lock();
        if size.middle > floor {
            size.middle -= 1;
            true
        } else {
            false
        }
    }

    /// Count a front-tier retirement. Advisory: there is no floor.
    pub fn front_retired(&self) -> FleetSize {
        let mut size = self.lock();
        size.front = size.front.saturating_sub(1);
        *size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn concurrent_requests_at_floor_are_all_denied() {
        let fleet = Arc::new(FleetCounter::new(FleetSize { front: 1, middle: 2 }));
        let granted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let fleet = fleet.clone();
                let granted = granted.clone();
                thread::spawn(move || {
                    if fleet.try_retire_mid(2) {
                        granted.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::Relaxed), 0);
        assert_eq!(fleet.snapshot().middle, 2);
    }

    #[test]
    fn sequential_requests_stop_at_floor() {
        let fleet = FleetCounter::new(FleetSize { front: 1, middle: 5 });
        assert!(fleet.try_retire_mid(2));
        assert!(fleet.try_retire_mid(2));
        assert!(fleet.try_retire_mid(2));
        assert!(!fleet.try_retire_mid(2));
        assert!(!fleet.try_retire_mid(2));
        assert_eq!(fleet.snapshot().middle, 2);
    }

    #[test]
    fn concurrent_requests_above_floor_never_undershoot() {
        let fleet = Arc::new(FleetCounter::new(FleetSize { front: 1, middle: 10 }));
        let granted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let fleet = fleet.clone();
                let granted = granted.clone();
                thread::spawn(move || {
                    if fleet.try_retire_mid(2) {
                        granted.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::Relaxed), 8);
        assert_eq!(fleet.snapshot().middle, 2);
    }

    #[test]
    fn front_retirement_is_unconditional_but_saturating() {
        let fleet = FleetCounter::new(FleetSize { front: 1, middle: 1 });
        assert_eq!(fleet.front_retired().front, 0);
        assert_eq!(fleet.front_retired().front, 0);
    }

    #[test]
    fn add_counts_per_role() {
        let fleet = FleetCounter::default();
        fleet.add(Role::Front, 2);
        let size = fleet.add(Role::Middle, 3);
        assert_eq!(size, FleetSize { front: 2, middle: 3 });
    }
}
