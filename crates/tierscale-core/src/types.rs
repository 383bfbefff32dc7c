//! Domain types shared by every tier.
//!
//! All types are serializable so they can cross the remote-call boundary
//! unchanged; the in-process paths use the same values directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a worker VM. Never reused within a run.
pub type WorkerId = u32;

/// Identity the harness assigns to each client request.
///
/// Two requests with identical contents are still distinct requests;
/// equality of [`Request`] always includes this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ── Requests ───────────────────────────────────────────────────────

/// A client request as delivered by the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
}

impl Request {
    pub fn browse(id: u64, item: impl Into<String>) -> Self {
        Self {
            id: RequestId(id),
            kind: RequestKind::Browse { item: item.into() },
        }
    }

    pub fn purchase(id: u64, item: impl Into<String>, price: f32, qty: u32) -> Self {
        Self {
            id: RequestId(id),
            kind: RequestKind::Purchase {
                item: item.into(),
                price,
                qty,
            },
        }
    }

    pub fn class(&self) -> RequestClass {
        self.kind.class()
    }
}

/// What the client asked for.
///
/// The variant decides both the staleness ceiling applied at dequeue time
/// and the serving route; nothing downstream re-derives either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    /// Read an item through the cache.
    Browse { item: String },
    /// Buy `qty` units of `item` at the quoted `price`. Never cached.
    Purchase { item: String, price: f32, qty: u32 },
}

impl RequestKind {
    pub fn class(&self) -> RequestClass {
        match self {
            RequestKind::Browse { .. } => RequestClass::Browse,
            RequestKind::Purchase { .. } => RequestClass::Purchase,
        }
    }

    /// The serving route for this request.
    pub fn route(&self) -> Route<'_> {
        match self {
            RequestKind::Browse { item } => Route::ReadThrough { key: item },
            RequestKind::Purchase { item, price, qty } => Route::Transaction {
                item,
                price: *price,
                qty: *qty,
            },
        }
    }

    pub fn item(&self) -> &str {
        match self {
            RequestKind::Browse { item } | RequestKind::Purchase { item, .. } => item,
        }
    }
}

/// Coarse request class, used as a key for per-class policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Browse,
    Purchase,
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestClass::Browse => f.write_str("browse"),
            RequestClass::Purchase => f.write_str("purchase"),
        }
    }
}

/// How a request is served once admitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    /// Look the key up in the cache, falling back to the backing store.
    ReadThrough { key: &'a str },
    /// Forward straight to the transactional backing-store path.
    Transaction { item: &'a str, price: f32, qty: u32 },
}

/// A request together with the wall-clock time it entered the shared queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub request: Request,
    /// Unix time in milliseconds at enqueue.
    pub enqueued_at_ms: u64,
}

impl QueuedRequest {
    /// Time spent in the queue as of `now_ms`. Never negative.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.enqueued_at_ms)
    }
}

/// Result of serving an admitted request, handed to the business logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeOutcome {
    /// A browse read; `value` is `None` when the key does not exist.
    Browsed { value: Option<String> },
    /// A purchase; `accepted` is the backing store's verdict.
    Purchased { accepted: bool },
}

// ── Fleet ──────────────────────────────────────────────────────────

/// The role the coordinator assigned to a worker. Immutable once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Request intake; forwards into the shared queue.
    Front,
    /// Request processing; drains the shared queue.
    Middle,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Front => f.write_str("front"),
            Role::Middle => f.write_str("middle"),
        }
    }
}

/// Arrival-intensity classification produced by the load estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    /// No measurement has classified the load yet.
    Unmeasured,
    /// Enough capacity existed at startup; latched for the rest of the run.
    Normal,
    Low,
    Medium,
    High,
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadLevel::Unmeasured => "unmeasured",
            LoadLevel::Normal => "normal",
            LoadLevel::Low => "low",
            LoadLevel::Medium => "medium",
            LoadLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the coordinator's scaling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    pub queue_len: usize,
    pub num_front: u32,
    pub num_mid: u32,
    pub load_level: LoadLevel,
    pub load_factor: f64,
    pub registered_workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_contents_are_distinct_requests() {
        let a = Request::browse(1, "item-1");
        let b = Request::browse(2, "item-1");
        assert_ne!(a, b);
        assert_eq!(a.kind, b.kind);
    }

    #[test]
    fn route_follows_the_variant() {
        let browse = Request::browse(1, "apple");
        assert_eq!(browse.kind.route(), Route::ReadThrough { key: "apple" });

        let buy = Request::purchase(2, "apple", 1.5, 3);
        assert_eq!(
            buy.kind.route(),
            Route::Transaction {
                item: "apple",
                price: 1.5,
                qty: 3
            }
        );
        assert_eq!(buy.class(), RequestClass::Purchase);
    }

    #[test]
    fn age_saturates_at_zero() {
        let queued = QueuedRequest {
            request: Request::browse(1, "x"),
            enqueued_at_ms: 1_000,
        };
        assert_eq!(queued.age_ms(1_250), 250);
        assert_eq!(queued.age_ms(900), 0);
    }

    #[test]
    fn request_kind_serializes_tagged() {
        let req = Request::purchase(7, "pear", 2.0, 1);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"purchase""#));
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
