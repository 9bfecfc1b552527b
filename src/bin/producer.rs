//! Test-traffic tool: publishes synthetic orders to the configured
//! topic, keyed by a small pool of UUIDs so repeated keys co-locate
//! on partitions.

use order_saver::config::AppConfig;
use order_saver::kafka::OrderProducer;
use order_saver::models::Order;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    let producer = OrderProducer::new(&config.kafka)?;

    let keys: Vec<String> = (0..config.producer.keys)
        .map(|_| Uuid::new_v4().to_string())
        .collect();

    for seq in 1..=config.producer.orders {
        let order = Order::sample(seq);
        let key = &keys[(seq as usize) % keys.len()];
        producer.send_order(&order, key).await?;
        tracing::info!(order_uid = %order.order_uid, key, "produced order");
    }

    producer.flush()?;
    tracing::info!(count = config.producer.orders, "all orders delivered");
    Ok(())
}
