//! Order Persistence
//!
//! Transactional multi-table writer and primary-key reader over the
//! normalized order schema. Every write step is idempotent so that
//! broker redeliveries converge to the same relational state: an
//! existence fast-path short-circuits duplicates, lookup values are
//! get-or-created, and all inserts carry conflict targets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::models::{Delivery, Item, Order, OrderError, Payment};
use crate::services::OrderStore;

use super::Database;

#[derive(Debug, FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i32,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i32,
}

impl Database {
    /// Persist the full aggregate atomically. Re-delivery of an
    /// already-saved `order_uid` returns success without touching
    /// the store.
    pub async fn save_order(&self, order: &Order) -> Result<(), OrderError> {
        let timer = metrics::Timer::new();
        debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "saving order"
        );

        if self.order_exists(&order.order_uid).await? {
            warn!(order_uid = %order.order_uid, "order already exists, skipping duplicate");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let delivery_service_id =
            get_or_create_lookup(&mut tx, "delivery_services", "service_id", &order.delivery_service)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service_id, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(delivery_service_id)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO delivery (
                order_uid, name, phone, zip, city, address, region, email
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .execute(&mut *tx)
        .await?;

        let provider_id =
            get_or_create_lookup(&mut tx, "payment_providers", "provider_id", &order.payment.provider)
                .await?;
        let currency_id =
            get_or_create_lookup(&mut tx, "currencies", "currency_id", &order.payment.currency)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO payment (
                transaction, request_id, currency_id, provider_id, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (transaction) DO NOTHING
            "#,
        )
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(currency_id)
        .bind(provider_id)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            let brand_id = get_or_create_lookup(&mut tx, "brands", "brand_id", &item.brand).await?;

            let item_id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO items (
                    chrt_id, track_number, price, rid,
                    name, sale, size, total_price, nm_id, brand_id, status_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (chrt_id) DO UPDATE SET
                    track_number = EXCLUDED.track_number,
                    price = EXCLUDED.price,
                    rid = EXCLUDED.rid,
                    name = EXCLUDED.name,
                    sale = EXCLUDED.sale,
                    size = EXCLUDED.size,
                    total_price = EXCLUDED.total_price,
                    nm_id = EXCLUDED.nm_id,
                    brand_id = EXCLUDED.brand_id,
                    status_id = EXCLUDED.status_id
                RETURNING id
                "#,
            )
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(brand_id)
            .bind(item.status)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO order_items (order_uid, item_id, quantity)
                VALUES ($1, $2, 1)
                ON CONFLICT (order_uid, item_id) DO UPDATE SET
                    quantity = order_items.quantity + 1
                "#,
            )
            .bind(&order.order_uid)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        metrics::record_db_query("save_order", timer.elapsed_secs());
        info!(order_uid = %order.order_uid, "order saved");
        Ok(())
    }

    /// Reconstruct the aggregate for a primary key, resolving lookup
    /// ids back to their names.
    pub async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, OrderError> {
        let timer = metrics::Timer::new();

        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT
                o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
                o.customer_id, ds.name AS delivery_service, o.shardkey, o.sm_id,
                o.date_created, o.oof_shard,
                d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
                p.transaction, p.request_id, c.name AS currency, pp.name AS provider,
                p.amount, p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
            FROM orders o
            JOIN delivery d ON o.order_uid = d.order_uid
            JOIN payment p ON o.order_uid = p.transaction
            JOIN delivery_services ds ON o.delivery_service_id = ds.service_id
            JOIN payment_providers pp ON p.provider_id = pp.provider_id
            JOIN currencies c ON p.currency_id = c.currency_id
            WHERE o.order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            warn!(order_uid, "order not found");
            return Err(OrderError::NotFound);
        };

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT
                i.chrt_id, i.track_number, i.price, i.rid, i.name, i.sale, i.size,
                i.total_price, i.nm_id, b.name AS brand, i.status_id AS status
            FROM order_items oi
            JOIN items i ON oi.item_id = i.id
            JOIN brands b ON i.brand_id = b.brand_id
            WHERE oi.order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        metrics::record_db_query("get_order", timer.elapsed_secs());
        debug!(order_uid, items = items.len(), "order retrieved");
        Ok(assemble_order(row, items))
    }

    /// Remove the order row; `delivery`, `payment` and `order_items`
    /// go with it via cascade. Shared `items` rows stay.
    pub async fn delete_order(&self, order_uid: &str) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1)")
                .bind(order_uid)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(OrderError::NotFound);
        }

        sqlx::query("DELETE FROM orders WHERE order_uid = $1")
            .bind(order_uid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(order_uid, "order deleted");
        Ok(())
    }

    /// Most recently created order uids, for cache warm-up.
    pub async fn get_last_orders_uids(&self, limit: i64) -> Result<Vec<String>, OrderError> {
        let uids: Vec<String> =
            sqlx::query_scalar("SELECT order_uid FROM orders ORDER BY date_created DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(uids)
    }

    async fn order_exists(&self, order_uid: &str) -> Result<bool, OrderError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1)")
                .bind(order_uid)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

/// `SELECT id WHERE name`; on absence, insert with a conflict-update
/// so a concurrent writer's row is returned instead of an error.
async fn get_or_create_lookup(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    id_column: &str,
    name: &str,
) -> Result<i32, OrderError> {
    let select = format!("SELECT {id_column} FROM {table} WHERE name = $1");
    if let Some(id) = sqlx::query_scalar::<_, i32>(&select)
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(id);
    }

    debug!(table, name, "lookup value not found, creating");
    let insert = format!(
        "INSERT INTO {table} (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING {id_column}"
    );
    let id = sqlx::query_scalar::<_, i32>(&insert)
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

fn assemble_order(row: OrderRow, items: Vec<ItemRow>) -> Order {
    Order {
        order_uid: row.order_uid,
        track_number: row.track_number,
        entry: row.entry,
        delivery: Delivery {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        },
        payment: Payment {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        },
        items: items
            .into_iter()
            .map(|i| Item {
                chrt_id: i.chrt_id,
                track_number: i.track_number,
                price: i.price,
                rid: i.rid,
                name: i.name,
                sale: i.sale,
                size: i.size,
                total_price: i.total_price,
                nm_id: i.nm_id,
                brand: i.brand,
                status: i.status,
            })
            .collect(),
        locale: row.locale,
        internal_signature: row.internal_signature,
        customer_id: row.customer_id,
        delivery_service: row.delivery_service,
        shardkey: row.shardkey,
        sm_id: row.sm_id,
        date_created: row.date_created,
        oof_shard: row.oof_shard,
    }
}

#[async_trait]
impl OrderStore for Database {
    async fn save_order(&self, order: &Order) -> Result<(), OrderError> {
        Database::save_order(self, order).await
    }

    async fn get_order_by_uid(&self, order_uid: &str) -> Result<Order, OrderError> {
        Database::get_order_by_uid(self, order_uid).await
    }

    async fn delete_order(&self, order_uid: &str) -> Result<(), OrderError> {
        Database::delete_order(self, order_uid).await
    }

    async fn get_last_orders_uids(&self, limit: i64) -> Result<Vec<String>, OrderError> {
        Database::get_last_orders_uids(self, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> (OrderRow, Vec<ItemRow>) {
        let order = Order::sample(7);
        (
            OrderRow {
                order_uid: order.order_uid.clone(),
                track_number: order.track_number.clone(),
                entry: order.entry.clone(),
                locale: order.locale.clone(),
                internal_signature: order.internal_signature.clone(),
                customer_id: order.customer_id.clone(),
                delivery_service: order.delivery_service.clone(),
                shardkey: order.shardkey.clone(),
                sm_id: order.sm_id,
                date_created: order.date_created,
                oof_shard: order.oof_shard.clone(),
                name: order.delivery.name.clone(),
                phone: order.delivery.phone.clone(),
                zip: order.delivery.zip.clone(),
                city: order.delivery.city.clone(),
                address: order.delivery.address.clone(),
                region: order.delivery.region.clone(),
                email: order.delivery.email.clone(),
                transaction: order.payment.transaction.clone(),
                request_id: order.payment.request_id.clone(),
                currency: order.payment.currency.clone(),
                provider: order.payment.provider.clone(),
                amount: order.payment.amount,
                payment_dt: order.payment.payment_dt,
                bank: order.payment.bank.clone(),
                delivery_cost: order.payment.delivery_cost,
                goods_total: order.payment.goods_total,
                custom_fee: order.payment.custom_fee,
            },
            order
                .items
                .iter()
                .map(|i| ItemRow {
                    chrt_id: i.chrt_id,
                    track_number: i.track_number.clone(),
                    price: i.price,
                    rid: i.rid.clone(),
                    name: i.name.clone(),
                    sale: i.sale,
                    size: i.size.clone(),
                    total_price: i.total_price,
                    nm_id: i.nm_id,
                    brand: i.brand.clone(),
                    status: i.status,
                })
                .collect(),
        )
    }

    #[test]
    fn test_assemble_order_round_trips_sample() {
        let (row, items) = sample_rows();
        let assembled = assemble_order(row, items);
        assert_eq!(assembled, Order::sample(7));
    }

    #[test]
    fn test_assemble_order_preserves_item_order() {
        let (row, mut items) = sample_rows();
        let second = ItemRow {
            chrt_id: 111,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 10,
            rid: "cd4219087a764ae0b473".to_string(),
            name: "Lipstick".to_string(),
            sale: 0,
            size: "1".to_string(),
            total_price: 10,
            nm_id: 5,
            brand: "Other Brand".to_string(),
            status: 200,
        };
        items.push(second);

        let assembled = assemble_order(row, items);
        assert_eq!(assembled.items.len(), 2);
        assert_eq!(assembled.items[1].chrt_id, 111);
        assert_eq!(assembled.items[1].brand, "Other Brand");
    }
}
