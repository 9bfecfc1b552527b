//! Kafka ingestion: consumer workers with manual offset store,
//! the per-message handler, and the test-traffic producer.

mod consumer;
pub mod handler;
mod producer;

pub use consumer::OrderConsumer;
pub use handler::MessageHandler;
pub use producer::OrderProducer;
