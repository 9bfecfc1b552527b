//! Broker Consumer
//!
//! One worker per consumer instance. Offsets are stored manually and
//! only after the handler succeeds; the enabled auto-commit then
//! persists stored offsets in the background. A crash after handler
//! success but before the store causes redelivery, which the
//! idempotent writer absorbs.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::KafkaConfig;
use crate::metrics;

use super::MessageHandler;

/// A single consumer worker bound to the shared group subscription.
pub struct OrderConsumer {
    consumer: StreamConsumer,
    handler: Arc<MessageHandler>,
    worker_id: usize,
    shutdown: watch::Receiver<bool>,
}

impl OrderConsumer {
    /// Create the client and subscribe to the configured topic.
    /// `enable.auto.offset.store=false` with auto-commit enabled is
    /// what makes the offset store below an explicit acknowledgement.
    pub fn new(
        cfg: &KafkaConfig,
        handler: Arc<MessageHandler>,
        worker_id: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("group.id", &cfg.consumer_group)
            .set("session.timeout.ms", cfg.session_timeout_ms.to_string())
            .set("enable.auto.offset.store", "false")
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", cfg.auto_commit_interval_ms.to_string())
            .set("auto.offset.reset", &cfg.auto_offset_reset)
            .create()?;

        consumer.subscribe(&[&cfg.topic])?;

        Ok(Self {
            consumer,
            handler,
            worker_id,
            shutdown,
        })
    }

    /// Consume until shutdown is signalled, then commit and close.
    /// `select!` over the shutdown channel lets the loop observe a
    /// stop request while a read is pending.
    pub async fn run(mut self) {
        info!(worker = self.worker_id, "consumer started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                msg = self.consumer.recv() => match msg {
                    Ok(m) => self.process(&m).await,
                    Err(e) => {
                        warn!(worker = self.worker_id, error = %e, "error reading message from broker");
                        metrics::record_kafka_error("read");
                    }
                },
            }
        }

        self.stop().await;
    }

    async fn process(&self, m: &BorrowedMessage<'_>) {
        let timer = metrics::Timer::new();
        let payload = m.payload().unwrap_or_default();

        match self
            .handler
            .handle(payload, m.topic(), m.partition(), m.offset(), self.worker_id)
            .await
        {
            Ok(()) => {
                metrics::record_kafka_message("processed");
                // eligible for the next auto-commit
                if let Err(e) = self.consumer.store_offset_from_message(m) {
                    error!(
                        worker = self.worker_id,
                        topic = m.topic(),
                        partition = m.partition(),
                        offset = m.offset(),
                        error = %e,
                        "failed to store offset"
                    );
                    metrics::record_kafka_error("offset_store");
                }
            }
            Err(e) => {
                warn!(
                    worker = self.worker_id,
                    topic = m.topic(),
                    partition = m.partition(),
                    offset = m.offset(),
                    error = %e,
                    "handler failed, offset not stored"
                );
                metrics::record_kafka_error("handler");
            }
        }

        metrics::record_kafka_processing_duration(timer.elapsed_secs());
    }

    /// Final synchronous commit of stored offsets, then close. The
    /// commit and close are blocking librdkafka calls, so they run on
    /// the blocking pool; the coordinator's shutdown deadline can
    /// still preempt a slow or unreachable broker.
    async fn stop(self) {
        let worker_id = self.worker_id;
        let consumer = self.consumer;

        let join = tokio::task::spawn_blocking(move || {
            match consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) => info!(worker = worker_id, "committed offsets"),
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                    info!(worker = worker_id, "no stored offsets to commit");
                }
                Err(e) => error!(worker = worker_id, error = %e, "failed to commit offsets"),
            }

            consumer.unsubscribe();
            info!(worker = worker_id, "consumer closed");
        })
        .await;

        if join.is_err() {
            error!(worker = worker_id, "consumer shutdown task panicked");
        }
    }
}
