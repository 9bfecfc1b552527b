//! Error taxonomy shared across the ingestion and read paths.

use thiserror::Error;

use crate::cache::CacheError;

/// Classified failures crossing component boundaries. Only cache
/// write errors are ever swallowed (logged by the cached repository);
/// every other kind propagates with its cause chain.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Structural or semantic validation failure. Poison on the
    /// ingestion path, 400 on the read path.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// The primary key has no row. Never retried.
    #[error("order not found")]
    NotFound,

    /// Persistence failure beyond upsert conflicts. Retried by the
    /// use-case; keeps the broker offset unstored when persistent.
    #[error("store operation failed: {0}")]
    StoreFailed(#[from] sqlx::Error),

    /// Cache I/O failure. Never fatal.
    #[error("cache operation failed: {0}")]
    Cache(#[from] CacheError),

    /// Cooperative cancellation from shutdown or a message deadline.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The coordinator's exit deadline expired before completion.
    #[error("shutdown deadline exceeded")]
    ShutdownTimeout,
}

impl OrderError {
    /// True for failures that will never succeed on redelivery and
    /// must not block the partition.
    pub fn is_poison(&self) -> bool {
        matches!(self, OrderError::InvalidOrder(_))
    }
}
