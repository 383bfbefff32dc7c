//! Request routing for admitted requests.
//!
//! Browses read through the coordinator's cache; purchases go straight to
//! the backing store's transactional path and are never cached.

use std::sync::Arc;

use tracing::debug;

use tierscale_cache::read_through;
use tierscale_core::{DataStore, OpsResult, Request, Route, ServeOutcome};

/// Dispatches a request to the cache or the backing store by its route.
#[derive(Clone)]
pub struct RequestRouter {
    cache: Arc<dyn DataStore>,
    backing: Arc<dyn DataStore>,
    /// Passed on cache fills.
    auth: String,
}

impl RequestRouter {
    pub fn new(cache: Arc<dyn DataStore>, backing: Arc<dyn DataStore>) -> Self {
        Self {
            cache,
            backing,
            auth: String::new(),
        }
    }

    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = auth.into();
        self
    }

    pub async fn serve(&self, request: &Request) -> OpsResult<ServeOutcome> {
        match request.kind.route() {
            Route::ReadThrough { key } => {
                let value =
                    read_through(self.cache.as_ref(), self.backing.as_ref(), key, &self.auth)
                        .await?;
                debug!(request = %request.id, %key, found = value.is_some(), "browse served");
                Ok(ServeOutcome::Browsed { value })
            }
            Route::Transaction { item, price, qty } => {
                let accepted = self.backing.transaction(item, price, qty).await?;
                debug!(request = %request.id, %item, qty, accepted, "purchase served");
                Ok(ServeOutcome::Purchased { accepted })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierscale_cache::{CacheOnlyStore, MemoryStore, ReadThroughCache};
    use tierscale_core::OpsError;

    fn router() -> (Arc<MemoryStore>, Arc<ReadThroughCache>, RequestRouter) {
        let backing = Arc::new(MemoryStore::new("secret"));
        backing.seed_item("apple", 2.5, 3);
        let cache = Arc::new(ReadThroughCache::new(backing.clone()));
        let router = RequestRouter::new(cache.clone(), backing.clone());
        (backing, cache, router)
    }

    #[tokio::test]
    async fn browse_reads_through_the_cache() {
        let (backing, cache, router) = router();

        let outcome = router.serve(&Request::browse(1, "apple")).await.unwrap();
        assert_eq!(
            outcome,
            ServeOutcome::Browsed {
                value: Some("ITEM".into())
            }
        );
        let reads = backing.reads();

        router.serve(&Request::browse(2, "apple")).await.unwrap();
        assert_eq!(backing.reads(), reads);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn purchase_bypasses_the_cache() {
        let (backing, cache, router) = router();

        let outcome = router
            .serve(&Request::purchase(1, "apple", 2.5, 2))
            .await
            .unwrap();
        assert_eq!(outcome, ServeOutcome::Purchased { accepted: true });
        assert_eq!(backing.stock("apple"), Some(1));
        assert!(cache.is_empty());

        let outcome = router
            .serve(&Request::purchase(2, "apple", 2.5, 2))
            .await
            .unwrap();
        assert_eq!(outcome, ServeOutcome::Purchased { accepted: false });
    }

    #[tokio::test]
    async fn purchase_against_cache_only_backing_is_a_config_error() {
        let backing = Arc::new(CacheOnlyStore::new([(
            "apple".to_string(),
            "ITEM".to_string(),
        )]));
        let cache = Arc::new(ReadThroughCache::new(backing.clone()));
        let router = RequestRouter::new(cache, backing);

        let err = router
            .serve(&Request::purchase(1, "apple", 1.0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Unsupported(_)));
    }
}
