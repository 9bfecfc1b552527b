//! Adversarial traffic tool: interleaves malformed payloads and
//! invalid orders with well-formed ones, to exercise the consumer's
//! poison handling end to end. The committed offset must advance past
//! every bad message while the valid orders land in the store.

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
    let key = Uuid::new_v4().to_string();

    for seq in 1..=config.producer.orders {
        match seq % 3 {
            // not JSON at all
            0 => {
                producer.send_raw(b"{not json", &key).await?;
                tracing::info!(seq, "produced malformed payload");
            }
            // decodes but fails validation
            1 => {
                let mut order = Order::sample(seq);
                order.payment.amount += 1;
                let payload = serde_json::to_vec(&order)?;
                producer.send_raw(&payload, &key).await?;
                tracing::info!(seq, order_uid = %order.order_uid, "produced invalid order");
            }
            _ => {
                let order = Order::sample(seq);
                producer.send_order(&order, &key).await?;
                tracing::info!(seq, order_uid = %order.order_uid, "produced valid order");
            }
        }
    }

    producer.flush()?;
    tracing::info!(count = config.producer.orders, "mock traffic delivered");
    Ok(())
}
