//! Cached Order Repository
//!
//! Read-through / write-through facade over the authoritative store
//! and the Redis cache, plus the cold-start warm-up that preloads the
//! most recent orders. The store is always written first; cache
//! failures are logged and never propagated on the write path.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, OrderCache};
use crate::models::{Order, OrderError};

/// Persistence surface shared by the Postgres store and the cached
/// facade, so callers are indifferent to whether a cache is present.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save_order(&self, order: &Order) -> Result<(), OrderError>;
    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, OrderError>;
    async fn delete_order(&self, order_uid: &str) -> Result<(), OrderError>;
    async fn get_last_orders_uids(&self, limit: i64) -> Result<Vec<String>, OrderError>;
}

/// Cache surface used by the facade. `get` distinguishes a miss
/// (`Ok(None)`) from a protocol failure (`Err`).
#[async_trait]
pub trait OrderCacheStore: Send + Sync {
    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Option<Order>, CacheError>;
    async fn save_order(&self, order: &Order) -> Result<(), CacheError>;
    async fn count_orders(&self) -> Result<i64, CacheError>;
    fn capacity(&self) -> i64;
}

#[async_trait]
impl OrderCacheStore for OrderCache {
    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Option<Order>, CacheError> {
        OrderCache::get_order_by_uid(self, order_uid).await
    }

    async fn save_order(&self, order: &Order) -> Result<(), CacheError> {
        OrderCache::save_order(self, order).await
    }

    async fn count_orders(&self) -> Result<i64, CacheError> {
        OrderCache::count_orders(self).await
    }

    fn capacity(&self) -> i64 {
        OrderCache::capacity(self)
    }
}

/// Warm-up behavior for a freshly constructed repository.
#[derive(Debug, Clone, Copy)]
pub struct WarmupConfig {
    pub enabled: bool,
}

/// Cache-aside facade over store + cache.
pub struct CachedOrderRepo {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCacheStore>,
}

impl CachedOrderRepo {
    /// Build the facade; when warm-up is enabled, spawn the preload
    /// task in the background. Construction itself never fails and
    /// never blocks on the cache.
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCacheStore>,
        warmup: WarmupConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        if warmup.enabled {
            let store = store.clone();
            let cache = cache.clone();
            tokio::spawn(async move {
                run_warmup(store, cache, shutdown).await;
            });
        }
        Self { store, cache }
    }
}

#[async_trait]
impl OrderStore for CachedOrderRepo {
    /// Probe the cache first; on a miss (or a logged protocol error)
    /// fall through to the store and backfill the cache best-effort.
    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, OrderError> {
        match self.cache.get_order_by_uid(order_uid).await {
            Ok(Some(order)) => {
                debug!(order_uid, "order served from cache");
                return Ok(order);
            }
            Ok(None) => {
                debug!(order_uid, "order not in cache, querying store");
            }
            Err(e) => {
                warn!(order_uid, error = %e, "cache read failed, falling back to store");
            }
        }

        let order = self.store.get_order_by_uid(order_uid).await?;

        if let Err(e) = self.cache.save_order(&order).await {
            warn!(order_uid, error = %e, "failed to backfill cache");
        }
        Ok(order)
    }

    /// Store first (authoritative), then mirror into the cache. A
    /// cache failure is logged and swallowed.
    async fn save_order(&self, order: &Order) -> Result<(), OrderError> {
        self.store.save_order(order).await?;

        if let Err(e) = self.cache.save_order(order).await {
            warn!(order_uid = %order.order_uid, error = %e, "failed to write order to cache");
        }
        Ok(())
    }

    /// Delete from the store only. The cache entry is deliberately
    /// left in place: readers may observe the deleted order until it
    /// ages out of the recency index.
    async fn delete_order(&self, order_uid: &str) -> Result<(), OrderError> {
        self.store.delete_order(order_uid).await
    }

    async fn get_last_orders_uids(&self, limit: i64) -> Result<Vec<String>, OrderError> {
        self.store.get_last_orders_uids(limit).await
    }
}

/// Preload up to `capacity` most recent orders store → cache. Skips
/// entirely when the cache is already at capacity, logs progress
/// every 10 items, and stops promptly on shutdown.
async fn run_warmup(
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCacheStore>,
    shutdown: watch::Receiver<bool>,
) {
    let capacity = cache.capacity();
    let resident = match cache.count_orders().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "cache warm-up aborted: cannot count resident orders");
            return;
        }
    };
    if capacity > 0 && resident >= capacity {
        info!(resident, capacity, "cache already warm, skipping warm-up");
        return;
    }

    let uids = match store.get_last_orders_uids(capacity).await {
        Ok(uids) => uids,
        Err(e) => {
            warn!(error = %e, "cache warm-up aborted: cannot list recent orders");
            return;
        }
    };
    info!(count = uids.len(), "cache warm-up started");

    let mut loaded = 0usize;
    for (idx, uid) in uids.iter().enumerate() {
        if *shutdown.borrow() {
            info!(loaded, "cache warm-up cancelled by shutdown");
            return;
        }

        let order = match store.get_order_by_uid(uid).await {
            Ok(order) => order,
            Err(e) => {
                warn!(order_uid = %uid, error = %e, "warm-up: failed to load order");
                continue;
            }
        };
        if let Err(e) = cache.save_order(&order).await {
            warn!(order_uid = %uid, error = %e, "warm-up: failed to cache order");
            continue;
        }
        loaded += 1;

        if (idx + 1) % 10 == 0 {
            info!(processed = idx + 1, total = uids.len(), "cache warm-up progress");
        }
    }
    info!(loaded, "cache warm-up finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        orders: Mutex<HashMap<String, Order>>,
        get_calls: AtomicUsize,
        save_calls: AtomicUsize,
    }

    impl FakeStore {
        fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
            let map = orders
                .into_iter()
                .map(|o| (o.order_uid.clone(), o))
                .collect();
            Self {
                orders: Mutex::new(map),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl OrderStore for FakeStore {
        async fn save_order(&self, order: &Order) -> Result<(), OrderError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            self.orders
                .lock()
                .unwrap()
                .insert(order.order_uid.clone(), order.clone());
            Ok(())
        }

        async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, OrderError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.orders
                .lock()
                .unwrap()
                .get(order_uid)
                .cloned()
                .ok_or(OrderError::NotFound)
        }

        async fn delete_order(&self, order_uid: &str) -> Result<(), OrderError> {
            match self.orders.lock().unwrap().remove(order_uid) {
                Some(_) => Ok(()),
                None => Err(OrderError::NotFound),
            }
        }

        async fn get_last_orders_uids(&self, limit: i64) -> Result<Vec<String>, OrderError> {
            let orders = self.orders.lock().unwrap();
            let mut uids: Vec<String> = orders.keys().cloned().collect();
            uids.sort();
            uids.truncate(limit as usize);
            Ok(uids)
        }
    }

    #[derive(Default)]
    struct FakeCache {
        orders: Mutex<HashMap<String, Order>>,
        fail_reads: bool,
        fail_writes: bool,
        capacity: i64,
    }

    fn protocol_error() -> CacheError {
        CacheError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )))
    }

    #[async_trait]
    impl OrderCacheStore for FakeCache {
        async fn get_order_by_uid(&self, order_uid: &str) -> Result<Option<Order>, CacheError> {
            if self.fail_reads {
                return Err(protocol_error());
            }
            Ok(self.orders.lock().unwrap().get(order_uid).cloned())
        }

        async fn save_order(&self, order: &Order) -> Result<(), CacheError> {
            if self.fail_writes {
                return Err(protocol_error());
            }
            self.orders
                .lock()
                .unwrap()
                .insert(order.order_uid.clone(), order.clone());
            Ok(())
        }

        async fn count_orders(&self) -> Result<i64, CacheError> {
            Ok(self.orders.lock().unwrap().len() as i64)
        }

        fn capacity(&self) -> i64 {
            self.capacity
        }
    }

    fn repo(store: Arc<FakeStore>, cache: Arc<FakeCache>) -> CachedOrderRepo {
        let (_tx, rx) = watch::channel(false);
        CachedOrderRepo::new(store, cache, WarmupConfig { enabled: false }, rx)
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_store() {
        let order = Order::sample(1);
        let store = Arc::new(FakeStore::default());
        let cache = Arc::new(FakeCache::default());
        cache.save_order(&order).await.unwrap();

        let repo = repo(store.clone(), cache);
        let got = repo.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(got, order);
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_populates_cache() {
        let order = Order::sample(2);
        let store = Arc::new(FakeStore::with_orders([order.clone()]));
        let cache = Arc::new(FakeCache::default());

        let repo = repo(store.clone(), cache.clone());
        let got = repo.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(got, order);
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);

        // second read is served by the cache
        let again = repo.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(again, order);
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_read_error_falls_through_to_store() {
        let order = Order::sample(3);
        let store = Arc::new(FakeStore::with_orders([order.clone()]));
        let cache = Arc::new(FakeCache {
            fail_reads: true,
            fail_writes: true,
            ..Default::default()
        });

        let repo = repo(store.clone(), cache);
        let got = repo.get_order_by_uid(&order.order_uid).await.unwrap();
        assert_eq!(got, order);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_propagated() {
        let order = Order::sample(4);
        let store = Arc::new(FakeStore::default());
        let cache = Arc::new(FakeCache {
            fail_writes: true,
            ..Default::default()
        });

        let repo = repo(store.clone(), cache);
        repo.save_order(&order).await.unwrap();
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_leaves_cache_entry() {
        let order = Order::sample(5);
        let store = Arc::new(FakeStore::with_orders([order.clone()]));
        let cache = Arc::new(FakeCache::default());
        cache.save_order(&order).await.unwrap();

        let repo = repo(store.clone(), cache.clone());
        repo.delete_order(&order.order_uid).await.unwrap();

        // stale window: the blob survives until eviction
        assert!(cache
            .get_order_by_uid(&order.order_uid)
            .await
            .unwrap()
            .is_some());
        assert!(matches!(
            store.get_order_by_uid(&order.order_uid).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_warmup_preloads_recent_orders() {
        let orders: Vec<Order> = (1..=3).map(Order::sample).collect();
        let store = Arc::new(FakeStore::with_orders(orders.clone()));
        let cache = Arc::new(FakeCache {
            capacity: 10,
            ..Default::default()
        });

        let (_tx, rx) = watch::channel(false);
        run_warmup(store, cache.clone(), rx).await;

        assert_eq!(cache.count_orders().await.unwrap(), 3);
        for order in &orders {
            assert!(cache
                .get_order_by_uid(&order.order_uid)
                .await
                .unwrap()
                .is_some());
        }
    }

    #[tokio::test]
    async fn test_warmup_skips_when_cache_full() {
        let order = Order::sample(1);
        let store = Arc::new(FakeStore::with_orders([Order::sample(2)]));
        let cache = Arc::new(FakeCache {
            capacity: 1,
            ..Default::default()
        });
        cache.save_order(&order).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        run_warmup(store.clone(), cache.clone(), rx).await;

        assert_eq!(store.get_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.count_orders().await.unwrap(), 1);
    }
}
