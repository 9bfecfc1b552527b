//! Order ingestion and retrieval service.
//!
//! Orders arrive over a partitioned Kafka topic, are validated,
//! persisted in Postgres with a normalized schema, mirrored into a
//! capacity-bounded Redis cache, and served by primary key over HTTP.

use std::sync::Arc;

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod kafka;
pub mod metrics;
pub mod models;
pub mod services;

use crate::services::OrderService;

/// Shared state for the read endpoint.
pub struct AppState {
    pub orders: Arc<OrderService>,
}
