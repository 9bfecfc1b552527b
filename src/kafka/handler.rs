//! Broker Message Handler
//!
//! Decodes a raw payload into an order and drives the use-case under
//! a per-message deadline. Malformed and invalid payloads are poison:
//! they are logged and acknowledged so a single bad message cannot
//! stall its partition. Store failures propagate so the offset stays
//! unstored and the broker redelivers.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::metrics;
use crate::models::{Order, OrderError};
use crate::services::OrderService;

/// Deadline for processing a single message end to end.
const MESSAGE_DEADLINE: Duration = Duration::from_secs(30);

/// Stateless per-message dispatcher shared by all consumer workers.
pub struct MessageHandler {
    orders: Arc<OrderService>,
    cancel: watch::Receiver<bool>,
}

impl MessageHandler {
    pub fn new(orders: Arc<OrderService>, cancel: watch::Receiver<bool>) -> Self {
        Self { orders, cancel }
    }

    /// Returns `Ok` when the message may be acknowledged (stored):
    /// either it was persisted, or it is poison and must be skipped.
    /// Returns `Err` when the message should be redelivered.
    pub async fn handle(
        &self,
        payload: &[u8],
        topic: &str,
        partition: i32,
        offset: i64,
        worker_id: usize,
    ) -> Result<(), OrderError> {
        let order: Order = match serde_json::from_slice(payload) {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    worker = worker_id,
                    topic,
                    partition,
                    offset,
                    error = %e,
                    "malformed payload, skipping poison message"
                );
                metrics::record_kafka_message("poison");
                return Ok(());
            }
        };

        let result = tokio::time::timeout(
            MESSAGE_DEADLINE,
            self.orders.create_order(&order, self.cancel.clone()),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                info!(
                    worker = worker_id,
                    order_uid = %order.order_uid,
                    partition,
                    offset,
                    "order processed"
                );
                Ok(())
            }
            Ok(Err(e)) if e.is_poison() => {
                warn!(
                    worker = worker_id,
                    order_uid = %order.order_uid,
                    topic,
                    partition,
                    offset,
                    error = %e,
                    "invalid order, skipping poison message"
                );
                metrics::record_kafka_message("poison");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(OrderError::Cancelled(format!(
                "message deadline of {MESSAGE_DEADLINE:?} exceeded"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::services::OrderStore;

    struct StubStore {
        fail: bool,
        save_calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderStore for StubStore {
        async fn save_order(&self, _order: &Order) -> Result<(), OrderError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(OrderError::StoreFailed(sqlx::Error::PoolTimedOut))
            } else {
                Ok(())
            }
        }

        async fn get_order_by_uid(&self, _order_uid: &str) -> Result<Order, OrderError> {
            Err(OrderError::NotFound)
        }

        async fn delete_order(&self, _order_uid: &str) -> Result<(), OrderError> {
            Ok(())
        }

        async fn get_last_orders_uids(&self, _limit: i64) -> Result<Vec<String>, OrderError> {
            Ok(vec![])
        }
    }

    fn handler(fail: bool) -> (MessageHandler, Arc<StubStore>, watch::Sender<bool>) {
        let store = Arc::new(StubStore {
            fail,
            save_calls: AtomicUsize::new(0),
        });
        let service = Arc::new(OrderService::new(store.clone(), 1));
        let (tx, rx) = watch::channel(false);
        (MessageHandler::new(service, rx), store, tx)
    }

    #[tokio::test]
    async fn test_malformed_payload_is_acknowledged() {
        let (handler, store, _cancel) = handler(false);
        let result = handler.handle(b"{not json", "orders", 0, 41, 1).await;
        assert!(result.is_ok());
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_order_is_acknowledged() {
        let (handler, store, _cancel) = handler(false);
        let mut order = Order::sample(1);
        order.payment.amount += 1;
        let payload = serde_json::to_vec(&order).unwrap();

        let result = handler.handle(&payload, "orders", 0, 42, 1).await;
        assert!(result.is_ok());
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_order_is_persisted() {
        let (handler, store, _cancel) = handler(false);
        let payload = serde_json::to_vec(&Order::sample(1)).unwrap();

        let result = handler.handle(&payload, "orders", 0, 43, 1).await;
        assert!(result.is_ok());
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_offset_unstored() {
        let (handler, store, _cancel) = handler(true);
        let payload = serde_json::to_vec(&Order::sample(1)).unwrap();

        let result = handler.handle(&payload, "orders", 0, 44, 1).await;
        assert!(matches!(result, Err(OrderError::StoreFailed(_))));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }
}
