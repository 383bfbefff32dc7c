//! Shared work queue with its timestamp table.
//!
//! The FIFO of pending requests and the table of enqueue times are two
//! structures behind one mutex. Every mutation touches both inside the
//! same critical section, so an entry never exists without its timestamp
//! and a timestamp never outlives its entry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, warn};

use tierscale_core::clock::epoch_millis;
use tierscale_core::{QueuedRequest, Request, RequestId};

struct QueueInner {
    order: VecDeque<Request>,
    enqueued_at: HashMap<RequestId, u64>,
}

/// Strict-FIFO queue of pending requests. Non-blocking on both ends.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    /// Hard cap on entries; `None` is unbounded.
    max_len: Option<usize>,
}

impl WorkQueue {
    pub fn new(max_len: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                order: VecDeque::new(),
                enqueued_at: HashMap::new(),
            }),
            max_len,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `request`, stamped with the current wall-clock time.
    ///
    /// Returns `false` if the queue refuses the insert: the queue is at its
    /// cap, or the same request is already queued.
    pub fn enqueue(&self, request: Request) -> bool {
        self.enqueue_at(request, epoch_millis())
    }

    /// Append `request` with an explicit enqueue time.
    pub fn enqueue_at(&self, request: Request, now_ms: u64) -> bool {
        let mut inner = self.lock();
        if self.max_len.is_some_and(|max| inner.order.len() >= max) {
            warn!(request = %request.id, len = inner.order.len(), "queue at capacity, refusing request");
            return false;
        }
        if inner.enqueued_at.contains_key(&request.id) {
            warn!(request = %request.id, "request already queued, refusing duplicate");
            return false;
        }
        inner.enqueued_at.insert(request.id, now_ms);
        inner.order.push_back(request);
        true
    }

    /// Pop the head of the queue together with its enqueue time.
    pub fn dequeue(&self) -> Option<QueuedRequest> {
        let mut inner = self.lock();
        let request = inner.order.pop_front()?;
        let enqueued_at_ms = match inner.enqueued_at.remove(&request.id) {
            Some(ts) => ts,
            None => {
                error!(request = %request.id, "queued request had no timestamp");
                epoch_millis()
            }
        };
        Some(QueuedRequest {
            request,
            enqueued_at_ms,
        })
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the FIFO and the timestamp table describe the same entries.
    pub fn is_consistent(&self) -> bool {
        let inner = self.lock();
        inner.order.len() == inner.enqueued_at.len()
            && inner
                .order
                .iter()
                .all(|r| inner.enqueued_at.contains_key(&r.id))
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
