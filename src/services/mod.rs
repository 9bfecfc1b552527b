pub mod order;
pub mod repository;

pub use order::OrderService;
pub use repository::{CachedOrderRepo, OrderCacheStore, OrderStore, WarmupConfig};
