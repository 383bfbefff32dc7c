//! tierscale-cache: key/value caching in front of the backing store.
//!
//! The cache is a pure in-memory map owned by the coordinator process. It
//! never reaches into the backing store on a read; the mid-tier caller
//! performs the miss-then-fill sequence with [`read_through`]. Purchases
//! bypass the cache entirely and go to the backing store's transaction
//! path.
//!
//! # Architecture
//!
//! ```text
//! mid-tier ──read_through(key)──▶ ReadThroughCache.get ──hit──▶ value
//!                │                        │
//!                │ miss                   ▼
//!                └──▶ backing.get ──▶ ReadThroughCache.set (+ derived item keys)
//! ```
//!
//! Two concurrent misses on one key may both fetch and fill. The overwrite
//! is idempotent, so the duplicate backing-store read is the only cost.

pub mod cache;
pub mod fill;
pub mod store;

pub use cache::{CacheStats, ReadThroughCache};
pub use fill::{ITEM_MARKER, price_key, qty_key, read_through};
pub use store::{CacheOnlyStore, MemoryStore};
