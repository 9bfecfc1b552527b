//! Test-Traffic Producer
//!
//! Publishes JSON-encoded orders keyed by UUID strings so identical
//! keys co-locate on partitions. Used by the `producer` binary to
//! synthesize ingestion traffic.

use anyhow::Context;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::debug;

use crate::config::KafkaConfig;
use crate::models::Order;

pub struct OrderProducer {
    producer: FutureProducer,
    topic: String,
    flush_timeout: Duration,
}

impl OrderProducer {
    pub fn new(cfg: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("message.timeout.ms", cfg.flush_timeout_ms.to_string())
            .create()
            .context("failed to create Kafka producer")?;

        Ok(Self {
            producer,
            topic: cfg.topic.clone(),
            flush_timeout: Duration::from_millis(cfg.flush_timeout_ms),
        })
    }

    /// Serialize and publish a single order under the given key.
    pub async fn send_order(&self, order: &Order, key: &str) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(order).context("failed to encode order")?;
        let record = FutureRecord::to(&self.topic).key(key).payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.flush_timeout))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("failed to deliver order: {e}"))?;

        debug!(order_uid = %order.order_uid, key, partition, offset, "order published");
        Ok(())
    }

    /// Publish a raw payload. Lets the traffic tool inject malformed
    /// messages to exercise the consumer's poison handling.
    pub async fn send_raw(&self, payload: &[u8], key: &str) -> anyhow::Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        self.producer
            .send(record, Timeout::After(self.flush_timeout))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("failed to deliver payload: {e}"))?;
        Ok(())
    }

    /// Drain in-flight deliveries within the configured flush window.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.producer
            .flush(Timeout::After(self.flush_timeout))
            .context("producer flush timed out")
    }
}
