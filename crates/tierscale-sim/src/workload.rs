//! Client workload: item catalog and request generation.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tierscale_cache::MemoryStore;
use tierscale_core::Request;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub name: String,
    pub price: f32,
    pub stock: u32,
}

/// The items clients browse and buy.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    /// `n` items named `item-000`.., priced in half-unit steps.
    pub fn generate(n: usize, stock: u32) -> Self {
        let items = (0..n)
            .map(|i| CatalogItem {
                name: format!("item-{i:03}"),
                price: 1.0 + (i % 20) as f32 * 0.5,
                stock,
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Load every item into `store`.
    pub fn seed(&self, store: &MemoryStore) {
        for item in &self.items {
            store.seed_item(&item.name, item.price, item.stock);
        }
    }
}

/// Seeded request generator.
pub struct Workload {
    rng: StdRng,
    catalog: Catalog,
    purchase_ratio: f64,
    next_id: u64,
}

impl Workload {
    pub fn new(catalog: Catalog, purchase_ratio: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            catalog,
            purchase_ratio: purchase_ratio.clamp(0.0, 1.0),
            next_id: 1,
        }
    }

    /// Exponentially distributed gap for an arrival rate in requests per
    /// second. `None` when the rate is not positive.
    pub fn next_gap(&mut self, rate: f64) -> Option<Duration> {
        if rate <= 0.0 || !rate.is_finite() {
            return None;
        }
        // 1 - U lies in (0, 1], so the log is finite.
        let u: f64 = self.rng.r#gen();
        Some(Duration::from_secs_f64(-(1.0 - u).ln() / rate))
    }

    pub fn next_request(&mut self) -> Request {
        let id = self.next_id;
        self.next_id += 1;

        if self.catalog.is_empty() {
            return Request::browse(id, "index");
        }
        let item = &self.catalog.items[self.rng.gen_range(0..self.catalog.len())];
        if self.rng.gen_bool(self.purchase_ratio) {
            let qty = self.rng.gen_range(1..=3);
            Request::purchase(id, item.name.clone(), item.price, qty)
        } else {
            Request::browse(id, item.name.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierscale_core::RequestClass;

    #[test]
    fn seeded_workloads_repeat() {
        let mut a = Workload::new(Catalog::generate(10, 5), 0.5, Some(7));
        let mut b = Workload::new(Catalog::generate(10, 5), 0.5, Some(7));
        for _ in 0..50 {
            assert_eq!(a.next_request(), b.next_request());
            assert_eq!(a.next_gap(3.0), b.next_gap(3.0));
        }
    }

    #[test]
    fn mean_gap_tracks_the_rate() {
        let mut w = Workload::new(Catalog::generate(1, 1), 0.0, Some(1));
        let n = 20_000;
        let total: f64 = (0..n)
            .map(|_| w.next_gap(4.0).unwrap().as_secs_f64())
            .sum();
        let mean = total / n as f64;
        assert!((mean - 0.25).abs() < 0.025, "mean gap {mean}");
    }

    #[test]
    fn zero_rate_produces_no_arrivals() {
        let mut w = Workload::new(Catalog::generate(1, 1), 0.0, Some(1));
        assert_eq!(w.next_gap(0.0), None);
    }

    #[test]
    fn purchase_ratio_shapes_the_mix() {
        let catalog = Catalog::generate(5, 10);
        let mut w = Workload::new(catalog.clone(), 0.3, Some(3));
        let purchases = (0..5_000)
            .map(|_| w.next_request())
            .filter(|r| r.class() == RequestClass::Purchase)
            .count();
        assert!((1_200..1_800).contains(&purchases), "{purchases} purchases");

        let mut browse_only = Workload::new(catalog, 0.0, Some(3));
        assert!((0..100).all(|_| browse_only.next_request().class() == RequestClass::Browse));
    }

    #[test]
    fn requests_name_catalog_items_with_fresh_ids() {
        let catalog = Catalog::generate(4, 10);
        let mut w = Workload::new(catalog.clone(), 0.5, Some(9));
        let first = w.next_request();
        let second = w.next_request();
        assert_ne!(first.id, second.id);
        assert!(
            catalog
                .items()
                .iter()
                .any(|item| item.name == first.kind.item())
        );
    }

    #[test]
    fn seeded_catalog_is_purchasable() {
        let catalog = Catalog::generate(3, 2);
        let store = MemoryStore::new("");
        catalog.seed(&store);
        assert_eq!(store.stock("item-002"), Some(2));
    }
}
