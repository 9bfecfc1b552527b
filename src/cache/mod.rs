//! Redis-backed order cache: a keyed JSON blob per order plus a
//! recency index (sorted set) that bounds the resident set.

mod order_cache;
mod redis_client;

pub use order_cache::OrderCache;
pub use redis_client::{RedisClient, RedisConfig};

use thiserror::Error;

/// Failures on the cache path. Distinguished from a plain miss,
/// which the read operations report as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache key construction. Blobs live at `<prefix><order_uid>`; the
/// recency index lives at `<prefix>recent_orders`.
pub mod keys {
    pub const RECENT_ORDERS: &str = "recent_orders";

    pub fn order(prefix: &str, order_uid: &str) -> String {
        format!("{prefix}{order_uid}")
    }

    pub fn recent_orders(prefix: &str) -> String {
        format!("{prefix}{RECENT_ORDERS}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_construction() {
        assert_eq!(keys::order("order:", "00000000000000000001"), "order:00000000000000000001");
        assert_eq!(keys::recent_orders("order:"), "order:recent_orders");
    }
}
