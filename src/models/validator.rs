//! Structural and semantic validation of incoming orders.
//!
//! Field rules are declared on the domain structs via `validator`
//! derives; the custom checks below cover the formats the built-in
//! rules cannot express. All regular expressions are compiled once
//! per process. Validation is pure and performs no I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use validator::{Validate, ValidationError};

use super::error::OrderError;
use super::order::Order;

static ORDER_UID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-f0-9]{20}$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[0-9]{7,15}$").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

pub fn order_uid(value: &str) -> Result<(), ValidationError> {
    if ORDER_UID_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("order_uid"))
    }
}

pub fn phone(value: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

pub fn numeric(value: &str) -> Result<(), ValidationError> {
    if NUMERIC_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("numeric"))
    }
}

pub fn currency(value: &str) -> Result<(), ValidationError> {
    if CURRENCY_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("currency"))
    }
}

pub fn locale(value: &str) -> Result<(), ValidationError> {
    match value {
        "en" | "ru" => Ok(()),
        _ => Err(ValidationError::new("locale")),
    }
}

pub fn alphabetic(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("alphabetic"))
    }
}

pub fn alphanumeric(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("alphanumeric"))
    }
}

impl Order {
    /// Checks the cross-field invariants and then the per-field rules.
    /// Returns `InvalidOrder` describing the first violation found.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.payment.transaction != self.order_uid {
            return Err(OrderError::InvalidOrder(
                "payment.transaction must equal order_uid".to_string(),
            ));
        }
        if self.payment.amount != self.payment.delivery_cost + self.payment.goods_total {
            return Err(OrderError::InvalidOrder(
                "payment.amount must equal delivery_cost + goods_total".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(OrderError::InvalidOrder(
                "order must contain at least one item".to_string(),
            ));
        }
        Validate::validate(self).map_err(|e| OrderError::InvalidOrder(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(mutate: impl FnOnce(&mut Order)) {
        let mut order = Order::sample(1);
        mutate(&mut order);
        assert!(
            matches!(order.validate(), Err(OrderError::InvalidOrder(_))),
            "expected InvalidOrder for mutated order"
        );
    }

    #[test]
    fn test_sample_order_is_valid() {
        assert!(Order::sample(1).validate().is_ok());
    }

    #[test]
    fn test_order_uid_must_be_20_hex() {
        assert_invalid(|o| o.order_uid = "XYZ".to_string());
        assert_invalid(|o| {
            // uppercase hex is rejected
            o.order_uid = "ABCDEF0123456789ABCD".to_string();
            o.payment.transaction = o.order_uid.clone();
        });
        assert_invalid(|o| {
            // 19 chars
            o.order_uid = "0000000000000000001".to_string();
            o.payment.transaction = o.order_uid.clone();
        });
    }

    #[test]
    fn test_track_number_bounds() {
        assert_invalid(|o| o.track_number = "SHORT".to_string());
        assert_invalid(|o| o.track_number = "X".repeat(21));
    }

    #[test]
    fn test_entry_alpha_bounds() {
        assert_invalid(|o| o.entry = "AB".to_string());
        assert_invalid(|o| o.entry = "WB1L".to_string());
        assert_invalid(|o| o.entry = "A".repeat(11));
    }

    #[test]
    fn test_locale_whitelist() {
        assert_invalid(|o| o.locale = "de".to_string());
    }

    #[test]
    fn test_internal_signature_max_len() {
        assert_invalid(|o| o.internal_signature = "x".repeat(256));
    }

    #[test]
    fn test_customer_id_alphanumeric() {
        assert_invalid(|o| o.customer_id = "bad id!".to_string());
        assert_invalid(|o| o.customer_id = "a".repeat(51));
    }

    #[test]
    fn test_delivery_service_alpha() {
        assert_invalid(|o| o.delivery_service = "meest-2".to_string());
    }

    #[test]
    fn test_shardkey_bounds() {
        assert_invalid(|o| o.shardkey = "a".repeat(11));
        assert_invalid(|o| o.shardkey = "#".to_string());
    }

    #[test]
    fn test_sm_id_non_negative() {
        assert_invalid(|o| o.sm_id = -1);
    }

    #[test]
    fn test_oof_shard_numeric() {
        assert_invalid(|o| o.oof_shard = "1a".to_string());
    }

    #[test]
    fn test_delivery_fields() {
        assert_invalid(|o| o.delivery.name = "X".to_string());
        assert_invalid(|o| o.delivery.phone = "79200000000".to_string());
        assert_invalid(|o| o.delivery.phone = "+123".to_string());
        assert_invalid(|o| o.delivery.zip = "26-39809".to_string());
        assert_invalid(|o| o.delivery.zip = "1".repeat(21));
        assert_invalid(|o| o.delivery.city = "K".to_string());
        assert_invalid(|o| o.delivery.address = "Mir".to_string());
        assert_invalid(|o| o.delivery.region = "K".to_string());
        assert_invalid(|o| o.delivery.email = "not-an-email".to_string());
    }

    #[test]
    fn test_payment_fields() {
        assert_invalid(|o| o.payment.request_id = "r".repeat(51));
        assert_invalid(|o| o.payment.currency = "usd".to_string());
        assert_invalid(|o| o.payment.currency = "USDT".to_string());
        assert_invalid(|o| o.payment.provider = "wb pay".to_string());
        assert_invalid(|o| o.payment.bank = "alpha1".to_string());
        assert_invalid(|o| o.payment.payment_dt = -1);
        assert_invalid(|o| {
            o.payment.amount = -1;
            o.payment.delivery_cost = -1;
            o.payment.goods_total = 0;
        });
    }

    #[test]
    fn test_item_fields() {
        assert_invalid(|o| o.items[0].chrt_id = 0);
        assert_invalid(|o| o.items[0].track_number = "short".to_string());
        assert_invalid(|o| o.items[0].price = 0);
        assert_invalid(|o| o.items[0].rid = "tooshort".to_string());
        assert_invalid(|o| o.items[0].name = "M".to_string());
        assert_invalid(|o| o.items[0].sale = 101);
        assert_invalid(|o| o.items[0].size = String::new());
        assert_invalid(|o| o.items[0].total_price = -1);
        assert_invalid(|o| o.items[0].nm_id = 0);
        assert_invalid(|o| o.items[0].brand = "V".to_string());
        assert_invalid(|o| o.items[0].status = 99);
        assert_invalid(|o| o.items[0].status = 601);
    }

    #[test]
    fn test_transaction_must_match_order_uid() {
        assert_invalid(|o| o.payment.transaction = "00000000000000000002".to_string());
    }

    #[test]
    fn test_amount_must_equal_cost_plus_goods() {
        assert_invalid(|o| o.payment.amount = o.payment.amount + 1);
    }

    #[test]
    fn test_items_must_be_non_empty() {
        assert_invalid(|o| o.items.clear());
    }
}
