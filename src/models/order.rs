//! Order Aggregate
//!
//! The unit of durability and identity: an order with its embedded
//! delivery address, payment record, and item lines, keyed by the
//! 20-hex-character `order_uid`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Full order aggregate as carried on the broker topic and returned
/// by the read endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Order {
    #[validate(custom = "crate::models::validator::order_uid")]
    pub order_uid: String,
    #[validate(length(min = 10, max = 20))]
    pub track_number: String,
    #[validate(length(min = 3, max = 10), custom = "crate::models::validator::alphabetic")]
    pub entry: String,
    #[validate]
    pub delivery: Delivery,
    #[validate]
    pub payment: Payment,
    #[validate]
    pub items: Vec<Item>,
    #[validate(custom = "crate::models::validator::locale")]
    pub locale: String,
    #[validate(length(max = 255))]
    pub internal_signature: String,
    #[validate(length(max = 50), custom = "crate::models::validator::alphanumeric")]
    pub customer_id: String,
    #[validate(length(max = 50), custom = "crate::models::validator::alphabetic")]
    pub delivery_service: String,
    #[validate(length(max = 10), custom = "crate::models::validator::alphanumeric")]
    pub shardkey: String,
    #[validate(range(min = 0))]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    #[validate(length(max = 10), custom = "crate::models::validator::numeric")]
    pub oof_shard: String,
}

/// Delivery address embedded in an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Delivery {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(custom = "crate::models::validator::phone")]
    pub phone: String,
    #[validate(length(max = 20), custom = "crate::models::validator::numeric")]
    pub zip: String,
    #[validate(length(min = 2, max = 100))]
    pub city: String,
    #[validate(length(min = 5, max = 255))]
    pub address: String,
    #[validate(length(min = 2, max = 100))]
    pub region: String,
    #[validate(email, length(max = 100))]
    pub email: String,
}

/// Payment record embedded in an order. `transaction` always equals
/// the owning `order_uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Payment {
    #[validate(custom = "crate::models::validator::order_uid")]
    pub transaction: String,
    #[validate(length(max = 50))]
    pub request_id: String,
    #[validate(custom = "crate::models::validator::currency")]
    pub currency: String,
    #[validate(length(max = 50), custom = "crate::models::validator::alphabetic")]
    pub provider: String,
    #[validate(range(min = 0))]
    pub amount: i64,
    #[validate(range(min = 0))]
    pub payment_dt: i64,
    #[validate(length(max = 100), custom = "crate::models::validator::alphabetic")]
    pub bank: String,
    #[validate(range(min = 0))]
    pub delivery_cost: i64,
    #[validate(range(min = 0))]
    pub goods_total: i64,
    #[validate(range(min = 0))]
    pub custom_fee: i64,
}

/// A single item line. Items are shared across orders and keyed by
/// `chrt_id` in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Item {
    #[validate(range(min = 1))]
    pub chrt_id: i64,
    #[validate(length(min = 10, max = 20))]
    pub track_number: String,
    #[validate(range(min = 1))]
    pub price: i64,
    #[validate(length(min = 10, max = 50))]
    pub rid: String,
    #[validate(length(min = 2, max = 255))]
    pub name: String,
    #[validate(range(min = 0, max = 100))]
    pub sale: i32,
    #[validate(length(min = 1, max = 50))]
    pub size: String,
    #[validate(range(min = 0))]
    pub total_price: i64,
    #[validate(range(min = 1))]
    pub nm_id: i64,
    #[validate(length(min = 2, max = 255))]
    pub brand: String,
    #[validate(range(min = 100, max = 600))]
    pub status: i32,
}

impl Order {
    /// Deterministic valid fixture: `order_uid` is `seq` zero-padded
    /// to 20 hex digits. Used by unit tests and the mock producer.
    pub fn sample(seq: u64) -> Self {
        let uid = format!("{seq:020x}");
        Order {
            order_uid: uid.clone(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                phone: "+9720000000".to_string(),
                zip: "2639809".to_string(),
                city: "Kiryat Mozkin".to_string(),
                address: "Ploshad Mira 15".to_string(),
                region: "Kraiot".to_string(),
                email: "test@gmail.com".to_string(),
            },
            payment: Payment {
                transaction: uid,
                request_id: String::new(),
                currency: "USD".to_string(),
                provider: "wbpay".to_string(),
                amount: 1817,
                payment_dt: 1_637_907_727,
                bank: "alpha".to_string(),
                delivery_cost: 1500,
                goods_total: 317,
                custom_fee: 0,
            },
            items: vec![Item {
                chrt_id: 9_934_930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0b473".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            }],
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: DateTime::parse_from_rfc3339("2021-11-26T06:22:19Z")
                .expect("fixture timestamp")
                .with_timezone(&Utc),
            oof_shard: "1".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_uid_is_padded_hex() {
        let order = Order::sample(123);
        assert_eq!(order.order_uid, "0000000000000000007b");
        assert_eq!(order.order_uid.len(), 20);
        assert_eq!(order.payment.transaction, order.order_uid);
    }

    #[test]
    fn test_json_field_names_round_trip() {
        let order = Order::sample(1);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["order_uid"], "00000000000000000001");
        assert_eq!(json["shardkey"], "9");
        assert_eq!(json["sm_id"], 99);
        assert_eq!(json["oof_shard"], "1");
        assert_eq!(json["payment"]["payment_dt"], 1_637_907_727i64);
        assert_eq!(json["items"][0]["chrt_id"], 9_934_930i64);

        let decoded: Order = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_date_created_serializes_as_rfc3339() {
        let order = Order::sample(1);
        let json = serde_json::to_value(&order).unwrap();
        let raw = json["date_created"].as_str().unwrap();
        assert!(raw.starts_with("2021-11-26T06:22:19"));
    }
}
