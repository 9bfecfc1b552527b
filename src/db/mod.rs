//! PostgreSQL Connection Lifecycle
//!
//! Pool construction with bounded, cancellation-aware connect retries
//! and a deadline-bounded disconnect.

mod order_repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::DbConfig;
use crate::models::OrderError;

const MAX_OPEN_CONNS: u32 = 10;
const CONN_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
const CONN_MAX_IDLE: Duration = Duration::from_secs(5 * 60);

/// Shared Postgres handle. The pool is safe for concurrent use and
/// bounds in-flight database requests.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Open and ping the database, retrying up to `cfg.retries` times
    /// with `cfg.retry_delay` between attempts. Each attempt is
    /// bounded by `cfg.connect_timeout`; every wait observes the
    /// shutdown channel and aborts with `Cancelled`.
    pub async fn connect(
        cfg: &DbConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Self, OrderError> {
        let dsn = cfg.dsn();
        let mut last_err: Option<OrderError> = None;

        for attempt in 1..=cfg.retries.max(1) {
            if *shutdown.borrow() {
                return Err(OrderError::Cancelled(
                    "shutdown requested during database connect".to_string(),
                ));
            }

            let options = PgPoolOptions::new()
                .max_connections(MAX_OPEN_CONNS)
                .max_lifetime(CONN_MAX_LIFETIME)
                .idle_timeout(CONN_MAX_IDLE)
                .acquire_timeout(cfg.connect_timeout);

            match tokio::time::timeout(cfg.connect_timeout, options.connect(&dsn)).await {
                Ok(Ok(pool)) => {
                    tracing::info!(
                        host = %cfg.host,
                        db = %cfg.name,
                        attempt,
                        "connected to Postgres"
                    );
                    return Ok(Self { pool });
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        attempt,
                        retries = cfg.retries,
                        error = %e,
                        "failed to connect to database"
                    );
                    last_err = Some(OrderError::StoreFailed(e));
                }
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        retries = cfg.retries,
                        timeout = ?cfg.connect_timeout,
                        "database connect attempt timed out"
                    );
                    last_err = Some(OrderError::StoreFailed(sqlx::Error::PoolTimedOut));
                }
            }

            if attempt < cfg.retries {
                tokio::select! {
                    _ = tokio::time::sleep(cfg.retry_delay) => {}
                    _ = shutdown.changed() => {
                        return Err(OrderError::Cancelled(
                            "shutdown requested during connect retry delay".to_string(),
                        ));
                    }
                }
            }
        }

        Err(last_err.unwrap_or(OrderError::StoreFailed(sqlx::Error::PoolClosed)))
    }

    /// Close the pool within the caller's deadline.
    pub async fn disconnect(&self, deadline: Duration) -> Result<(), OrderError> {
        tokio::time::timeout(deadline, self.pool.close())
            .await
            .map_err(|_| OrderError::ShutdownTimeout)?;
        tracing::info!("database connection pool closed");
        Ok(())
    }
}
