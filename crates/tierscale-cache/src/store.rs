//! In-memory backing stores.
//!
//! [`MemoryStore`] is a complete store with inventory semantics, used by
//! the simulation harness. [`CacheOnlyStore`] serves reads from a fixed
//! snapshot and rejects every mutation as unsupported, so wiring it where
//! a transactional store is required fails loudly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use tierscale_core::{BoxFuture, DataStore, OpsError, OpsResult};

use crate::fill::{ITEM_MARKER, price_key, qty_key};

/// Price tolerance when matching a quoted price against the stored one.
const PRICE_EPSILON: f32 = 0.005;

/// Key/value store with item inventory.
///
/// Items are stored as `{item} = ITEM`, `{item}_price`, `{item}_qty`.
/// A transaction checks and decrements stock under one lock.
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
    /// Token required by `set`.
    auth: String,
    reads: AtomicU64,
}

impl MemoryStore {
    pub fn new(auth: impl Into<String>) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            auth: auth.into(),
            reads: AtomicU64::new(0),
        }
    }

    /// Insert a plain key without authentication.
    pub fn seed(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    /// Insert an item record with its price and stock.
    pub fn seed_item(&self, item: &str, price: f32, qty: u32) {
        let mut data = self.lock();
        data.insert(item.to_string(), ITEM_MARKER.to_string());
        data.insert(price_key(item), price.to_string());
        data.insert(qty_key(item), qty.to_string());
    }

    /// Remaining stock of `item`, if it is an item.
    pub fn stock(&self, item: &str) -> Option<u32> {
        self.lock().get(&qty_key(item))?.parse().ok()
    }

    /// Number of `get` calls served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_purchase(&self, item: &str, price: f32, qty: u32) -> bool {
        if qty == 0 {
            return false;
        }
        let mut data = self.lock();
        if data.get(item).map(String::as_str) != Some(ITEM_MARKER) {
            debug!(%item, "purchase of unknown item");
            return false;
        }
        let stored_price: Option<f32> = data.get(&price_key(item)).and_then(|p| p.parse().ok());
        let stock: Option<u32> = data.get(&qty_key(item)).and_then(|q| q.parse().ok());
        match (stored_price, stock) {
            (Some(p), Some(s)) if (p - price).abs() <= PRICE_EPSILON && s >= qty => {
                data.insert(qty_key(item), (s - qty).to_string());
                info!(%item, qty, remaining = s - qty, "purchase committed");
                true
            }
            _ => {
                debug!(%item, price, qty, "purchase rejected");
                false
            }
        }
    }
}

impl DataStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, OpsResult<Option<String>>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::Relaxed);
            Ok(self.lock().get(key).cloned())
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        auth: &'a str,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async move {
            if auth != self.auth {
                debug!(%key, "set rejected: bad auth");
                return Ok(false);
            }
            self.lock().insert(key.to_string(), value.to_string());
            Ok(true)
        })
    }

    fn transaction<'a>(
        &'a self,
        item: &'a str,
        price: f32,
        qty: u32,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async move { Ok(self.try_purchase(item, price, qty)) })
    }
}

/// Read-only snapshot store with no transactional path.
pub struct CacheOnlyStore {
    data: HashMap<String, String>,
}

impl CacheOnlyStore {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            data: entries.into_iter().collect(),
        }
    }
}

impl DataStore for CacheOnlyStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, OpsResult<Option<String>>> {
        Box::pin(async move { Ok(self.data.get(key).cloned()) })
    }

    fn set<'a>(
        &'a self,
        _key: &'a str,
        _value: &'a str,
        _auth: &'a str,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async { Err(OpsError::Unsupported("set".to_string())) })
    }

    fn transaction<'a>(
        &'a self,
        _item: &'a str,
        _price: f32,
        _qty: u32,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async { Err(OpsError::Unsupported("transaction".to_string())) })
    }
}
