//! Order Use-Case
//!
//! Validates incoming orders and drives retrying writes against the
//! repository with exponential backoff. Transient store faults are
//! retried; upstream idempotence makes re-running a partially
//! observed save harmless.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::metrics;
use crate::models::{Order, OrderError};

use super::OrderStore;

pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Business operations over orders: validated, retrying creation and
/// primary-key lookup.
pub struct OrderService {
    repo: Arc<dyn OrderStore>,
    retry_count: u32,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderStore>, retry_count: u32) -> Self {
        Self {
            repo,
            retry_count: retry_count.max(1),
        }
    }

    /// Validate and persist an order. Up to `retry_count` save
    /// attempts; the delay before attempt `i` (1-based, i ≥ 2) is
    /// `2^(i-2)` seconds. Every wait and iteration observes the
    /// cancellation channel.
    pub async fn create_order(
        &self,
        order: &Order,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), OrderError> {
        let timer = metrics::Timer::new();
        debug!(
            order_uid = %order.order_uid,
            customer_id = %order.customer_id,
            amount = order.payment.amount,
            "order creation started"
        );

        if let Err(e) = order.validate() {
            metrics::record_order_processed("invalid");
            return Err(e);
        }

        let mut last_err = None;

        for attempt in 0..self.retry_count {
            if attempt > 0 {
                let delay = Duration::from_secs(1u64 << (attempt - 1));
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.changed() => {
                        metrics::record_order_processed("cancelled");
                        return Err(OrderError::Cancelled(
                            "cancelled during retry backoff".to_string(),
                        ));
                    }
                }
            }
            if *cancel.borrow() {
                metrics::record_order_processed("cancelled");
                return Err(OrderError::Cancelled("cancelled before save".to_string()));
            }

            match self.repo.save_order(order).await {
                Ok(()) => {
                    metrics::record_order_processed("success");
                    metrics::record_order_processing_duration(timer.elapsed_secs());
                    info!(
                        order_uid = %order.order_uid,
                        items = order.items.len(),
                        "order created"
                    );
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        order_uid = %order.order_uid,
                        attempt = attempt + 1,
                        retries = self.retry_count,
                        error = %e,
                        "order save attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        metrics::record_order_processed("failed");
        Err(last_err.unwrap_or(OrderError::StoreFailed(sqlx::Error::PoolClosed)))
    }

    /// Primary-key lookup, passed through to the repository.
    pub async fn get_order(&self, order_uid: &str) -> Result<Order, OrderError> {
        self.repo.get_order_by_uid(order_uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that fails the first `failures` save attempts.
    struct FlakyStore {
        failures: usize,
        save_calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                save_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl OrderStore for FlakyStore {
        async fn save_order(&self, _order: &Order) -> Result<(), OrderError> {
            let call = self.save_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
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

    fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_invalid_order_never_reaches_store() {
        let store = FlakyStore::new(0);
        let service = OrderService::new(store.clone(), 3);
        let (_tx, rx) = cancel_channel();

        let mut order = Order::sample(1);
        order.locale = "xx".to_string();

        let result = service.create_order(&order, rx).await;
        assert!(matches!(result, Err(OrderError::InvalidOrder(_))));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_backoff() {
        let store = FlakyStore::new(0);
        let service = OrderService::new(store.clone(), 3);
        let (_tx, rx) = cancel_channel();

        service.create_order(&Order::sample(1), rx).await.unwrap();
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let store = FlakyStore::new(1);
        let service = OrderService::new(store.clone(), 3);
        let (_tx, rx) = cancel_channel();

        service.create_order(&Order::sample(1), rx).await.unwrap();
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_consumes_all_attempts() {
        let store = FlakyStore::new(usize::MAX);
        let service = OrderService::new(store.clone(), 3);
        let (_tx, rx) = cancel_channel();

        let result = service.create_order(&Order::sample(1), rx).await;
        assert!(matches!(result, Err(OrderError::StoreFailed(_))));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pre_cancelled_returns_without_saving() {
        let store = FlakyStore::new(usize::MAX);
        let service = OrderService::new(store.clone(), 3);
        let (tx, rx) = cancel_channel();
        tx.send(true).unwrap();

        let result = service.create_order(&Order::sample(1), rx).await;
        assert!(matches!(result, Err(OrderError::Cancelled(_))));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let store = FlakyStore::new(usize::MAX);
        let service = OrderService::new(store.clone(), 3);
        let (tx, rx) = cancel_channel();

        let handle = tokio::spawn({
            let order = Order::sample(1);
            async move { service.create_order(&order, rx).await }
        });
        // let the first attempt fail and the backoff begin
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(OrderError::Cancelled(_))));
        assert!(store.save_calls.load(Ordering::SeqCst) <= 1);
    }
}
