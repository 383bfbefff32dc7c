//! Caller-side miss-then-fill for the read-through cache.

use tracing::{debug, warn};

use tierscale_core::{DataStore, OpsResult};

/// Backing-store value that marks a key as an item record.
pub const ITEM_MARKER: &str = "ITEM";

/// Derived key holding an item's price.
pub fn price_key(item: &str) -> String {
    format!("{item}_price")
}

/// Derived key holding an item's stock quantity.
pub fn qty_key(item: &str) -> String {
    format!("{item}_qty")
}

/// Read `key` through `cache`, falling back to `backing` on a miss.
///
/// On a miss the fetched value is filled into the cache. When the value
/// marks an item record, the item's price and quantity keys are fetched and
/// filled as well, so later reads of those keys hit. Absent keys are not
/// cached. A refused fill is logged and the fetched value still returned.
pub async fn read_through(
    cache: &dyn DataStore,
    backing: &dyn DataStore,
    key: &str,
    auth: &str,
) -> OpsResult<Option<String>> {
    if let Some(value) = cache.get(key).await? {
        return Ok(Some(value));
    }

    let Some(value) = backing.get(key).await? else {
        debug!(%key, "key absent from backing store");
        return Ok(None);
    };
    fill(cache, key, &value, auth).await?;

    if value == ITEM_MARKER {
        for derived in [price_key(key), qty_key(key)] {
            if let Some(v) = backing.get(&derived).await? {
                fill(cache, &derived, &v, auth).await?;
            }
        }
    }

    Ok(Some(value))
}

async fn fill(cache: &dyn DataStore, key: &str, value: &str, auth: &str) -> OpsResult<()> {
    if !cache.set(key, value, auth).await? {
        warn!(%key, "cache refused fill");
    }
    Ok(())
}
