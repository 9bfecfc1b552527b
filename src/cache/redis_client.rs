//! Redis Connection Management
//!
//! Connection-manager wrapper with bounded retries and forced
//! reconnection after a failed operation. Every operation is bounded
//! by the configured read or write timeout.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Redis connection configuration, from the `REDIS_*` environment.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// host:port of the Redis server
    pub host: String,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Maximum attempts per operation
    pub max_retries: u32,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:6379".to_string(),
            db: 0,
            username: None,
            password: None,
            max_retries: 3,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    fn connection_info(&self) -> ConnectionInfo {
        let (host, port) = match self.host.split_once(':') {
            Some((h, p)) => (h.to_string(), p.parse().unwrap_or(6379)),
            None => (self.host.clone(), 6379),
        };
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
            },
        }
    }
}

/// Redis client wrapper with connection management
pub struct RedisClient {
    config: RedisConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
}

impl RedisClient {
    /// Create a new client and establish the initial connection. The
    /// dial is bounded by `dial_timeout`; a failure here lets the
    /// caller degrade to running without a cache.
    pub async fn connect(config: RedisConfig) -> Result<Self, RedisError> {
        let client = Client::open(config.connection_info())?;

        let redis_client = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
        };

        redis_client.ensure_connected().await?;
        redis_client.ping().await?;

        Ok(redis_client)
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Ensure connection is established
    async fn ensure_connected(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!(host = %self.config.host, db = self.config.db, "establishing Redis connection");
            let manager = tokio::time::timeout(
                self.config.dial_timeout,
                ConnectionManager::new(self.client.clone()),
            )
            .await
            .map_err(|_| RedisError::from((redis::ErrorKind::IoError, "connection timed out")))??;
            *conn = Some(manager);
            tracing::info!("Redis connection established");
        }
        Ok(())
    }

    /// Get connection manager, reconnecting if necessary
    async fn get_connection(&self) -> Result<ConnectionManager, RedisError> {
        self.ensure_connected().await?;
        let conn = self.connection.read().await;
        conn.clone()
            .ok_or_else(|| RedisError::from((redis::ErrorKind::IoError, "connection not available")))
    }

    /// Execute an operation with retry logic. Each attempt is bounded
    /// by `op_timeout`; a failed attempt drops the connection so the
    /// next one reconnects.
    async fn with_retry<F, Fut, T>(
        &self,
        op_timeout: Duration,
        mut operation: F,
    ) -> Result<T, RedisError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries.max(1) {
            match self.get_connection().await {
                Ok(conn) => {
                    let result = match tokio::time::timeout(op_timeout, operation(conn)).await {
                        Ok(result) => result,
                        Err(_) => Err(RedisError::from((
                            redis::ErrorKind::IoError,
                            "operation timed out",
                        ))),
                    };
                    match result {
                        Ok(value) => return Ok(value),
                        Err(e) => {
                            tracing::warn!(
                                attempt = attempt + 1,
                                max = self.config.max_retries,
                                error = %e,
                                "Redis operation failed"
                            );
                            last_error = Some(e);
                            let mut conn = self.connection.write().await;
                            *conn = None;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.config.max_retries,
                        error = %e,
                        "Redis connection failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RedisError::from((redis::ErrorKind::IoError, "max retries exceeded"))))
    }

    // ==================== Operations ====================

    /// GET, raw bytes. `None` when the key is absent.
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, RedisError> {
        self.with_retry(self.config.read_timeout, |mut conn| {
            let key = key.to_string();
            async move { conn.get(&key).await }
        })
        .await
    }

    /// SET without expiry.
    pub async fn set_bytes(&self, key: &str, value: &[u8]) -> Result<(), RedisError> {
        self.with_retry(self.config.write_timeout, |mut conn| {
            let key = key.to_string();
            let value = value.to_vec();
            async move { conn.set(&key, value).await }
        })
        .await
    }

    /// DEL for a batch of keys. Returns the number removed.
    pub async fn del_many(&self, keys: &[String]) -> Result<i64, RedisError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_retry(self.config.write_timeout, |mut conn| {
            let keys = keys.to_vec();
            async move { conn.del(&keys).await }
        })
        .await
    }

    /// ZADD a single member with a float score.
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), RedisError> {
        self.with_retry(self.config.write_timeout, |mut conn| {
            let key = key.to_string();
            let member = member.to_string();
            async move {
                let _: i64 = conn.zadd(&key, &member, score).await?;
                Ok(())
            }
        })
        .await
    }

    /// ZCARD, the sorted-set cardinality.
    pub async fn zcard(&self, key: &str) -> Result<i64, RedisError> {
        self.with_retry(self.config.read_timeout, |mut conn| {
            let key = key.to_string();
            async move { conn.zcard(&key).await }
        })
        .await
    }

    /// ZRANGE by rank, ascending score order.
    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, RedisError> {
        self.with_retry(self.config.read_timeout, |mut conn| {
            let key = key.to_string();
            async move { conn.zrange(&key, start, stop).await }
        })
        .await
    }

    /// ZREMRANGEBYRANK. Returns the number of members removed.
    pub async fn zremrangebyrank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<i64, RedisError> {
        self.with_retry(self.config.write_timeout, |mut conn| {
            let key = key.to_string();
            async move { conn.zremrangebyrank(&key, start, stop).await }
        })
        .await
    }

    /// PING (health probe).
    pub async fn ping(&self) -> Result<bool, RedisError> {
        self.with_retry(self.config.read_timeout, |mut conn| async move {
            let result: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(result == "PONG")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.host, "127.0.0.1:6379");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_connection_info_splits_host_port() {
        let config = RedisConfig {
            host: "redis.internal:6380".to_string(),
            db: 2,
            ..Default::default()
        };
        let info = config.connection_info();
        match info.addr {
            ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "redis.internal");
                assert_eq!(port, 6380);
            }
            other => panic!("unexpected addr: {other:?}"),
        }
        assert_eq!(info.redis.db, 2);
    }
}
