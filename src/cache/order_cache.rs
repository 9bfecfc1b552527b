//! Order Cache
//!
//! JSON blob per order plus a `recent_orders` sorted set scored by
//! insertion time (nanoseconds). The sorted set bounds occupancy:
//! when the configured capacity is exceeded the oldest-inserted
//! members and their blobs are evicted. Scores are never refreshed
//! on read, so eviction is FIFO by insertion, not LRU by access.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;
use crate::models::Order;

use super::keys;
use super::CacheError;
use super::RedisClient;

/// Redis-backed order cache with capacity-bounded occupancy.
pub struct OrderCache {
    redis: Arc<RedisClient>,
    prefix: String,
    capacity: i64,
}

impl OrderCache {
    pub fn new(redis: Arc<RedisClient>, prefix: impl Into<String>, capacity: i64) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            capacity,
        }
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Fetch an order blob. `Ok(None)` is a miss; `Err` is a protocol
    /// failure the caller may fall through on.
    pub async fn get_order_by_uid(&self, order_uid: &str) -> Result<Option<Order>, CacheError> {
        let timer = metrics::Timer::new();
        let key = keys::order(&self.prefix, order_uid);
        let data = self.redis.get_bytes(&key).await?;
        metrics::record_cache_operation("get", timer.elapsed_secs());

        match data {
            Some(bytes) => {
                let order: Order = serde_json::from_slice(&bytes)?;
                debug!(order_uid, "cache hit");
                metrics::record_cache_hit();
                Ok(Some(order))
            }
            None => {
                debug!(order_uid, "cache miss");
                metrics::record_cache_miss();
                Ok(None)
            }
        }
    }

    /// Store an order blob, index it by insertion time, and evict the
    /// oldest entries beyond capacity. Best-effort atomicity: a crash
    /// between steps leaves at most an unindexed blob or an oversized
    /// index, both repaired by subsequent writes.
    pub async fn save_order(&self, order: &Order) -> Result<(), CacheError> {
        let timer = metrics::Timer::new();
        let key = keys::order(&self.prefix, &order.order_uid);
        let data = serde_json::to_vec(order)?;
        self.redis.set_bytes(&key, &data).await?;

        let index_key = keys::recent_orders(&self.prefix);
        let score = Utc::now().timestamp_nanos_opt().unwrap_or_default() as f64;
        self.redis.zadd(&index_key, &order.order_uid, score).await?;
        debug!(order_uid = %order.order_uid, score, "order added to recency index");

        if self.capacity > 0 {
            let count = self.redis.zcard(&index_key).await?;
            if let Some(stop) = eviction_stop_rank(count, self.capacity) {
                let victims = self.redis.zrange(&index_key, 0, stop).await?;
                let removed = self.redis.zremrangebyrank(&index_key, 0, stop).await?;

                let victim_keys: Vec<String> = victims
                    .iter()
                    .map(|uid| keys::order(&self.prefix, uid))
                    .collect();
                let deleted = self.redis.del_many(&victim_keys).await?;
                debug!(
                    from_index = removed,
                    from_blobs = deleted,
                    ?victims,
                    "evicted oldest orders"
                );
            }
        }

        metrics::record_cache_operation("save", timer.elapsed_secs());
        debug!(order_uid = %order.order_uid, "order cached");
        Ok(())
    }

    /// Cardinality of the recency index.
    pub async fn count_orders(&self) -> Result<i64, CacheError> {
        let count = self.redis.zcard(&keys::recent_orders(&self.prefix)).await?;
        Ok(count)
    }
}

/// Inclusive 0-based rank of the last victim when `count` exceeds
/// `capacity`, or `None` when nothing must be evicted.
fn eviction_stop_rank(count: i64, capacity: i64) -> Option<isize> {
    if count > capacity {
        Some((count - capacity - 1) as isize)
    } else {
        None
    }
}
