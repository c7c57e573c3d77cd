use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Address, Money, Order, OrderHistory, OrderItem, OrderStatus, OrderStoreError, PaymentStatus,
    Result, StatusChange, model::validate_order, store::OrderStore,
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_status, payment_method, \
     currency, subtotal, tax_amount, shipping_amount, discount_amount, total_amount, \
     shipping_address, billing_address, transaction_id, cancellation_reason, created_at, \
     updated_at, paid_at, shipped_at, delivered_at, cancelled_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let payment_method: String = row.try_get("payment_method")?;
        let currency: String = row.try_get("currency")?;
        let shipping_address: serde_json::Value = row.try_get("shipping_address")?;
        let billing_address: serde_json::Value = row.try_get("billing_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: status.parse()?,
            payment_status: payment_status.parse()?,
            payment_method: payment_method.parse()?,
            currency: currency.parse()?,
            subtotal: Money::from_cents(row.try_get("subtotal")?),
            tax_amount: Money::from_cents(row.try_get("tax_amount")?),
            shipping_amount: Money::from_cents(row.try_get("shipping_amount")?),
            discount_amount: Money::from_cents(row.try_get("discount_amount")?),
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            shipping_address: serde_json::from_value::<Address>(shipping_address)?,
            billing_address: serde_json::from_value::<Address>(billing_address)?,
            transaction_id: row.try_get("transaction_id")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            paid_at: row.try_get("paid_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(OrderItem {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            unit_price: Money::from_cents(row.try_get("unit_price")?),
            quantity: u32::try_from(quantity).map_err(|_| {
                OrderStoreError::InvalidData(format!("negative item quantity {quantity}"))
            })?,
            subtotal: Money::from_cents(row.try_get("subtotal")?),
        })
    }

    fn row_to_history(row: PgRow) -> Result<OrderHistory> {
        let from_status: Option<String> = row.try_get("from_status")?;
        let to_status: String = row.try_get("to_status")?;
        Ok(OrderHistory {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            from_status: from_status.map(|s| s.parse()).transpose()?,
            to_status: to_status.parse()?,
            note: row.try_get("note")?,
            actor: row.try_get("actor")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_history(tx: &mut Transaction<'_, Postgres>, entry: &OrderHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_history (id, order_id, from_status, to_status, note, actor, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.order_id.as_uuid())
        .bind(entry.from_status.map(|s| s.as_str()))
        .bind(entry.to_status.as_str())
        .bind(&entry.note)
        .bind(&entry.actor)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: OrderId) -> Result<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(OrderStoreError::OrderNotFound(order_id))?;
        Self::row_to_order(row)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        validate_order(order, items)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, order_number, user_id, status, payment_status, payment_method, currency,
                 subtotal, tax_amount, shipping_amount, discount_amount, total_amount,
                 shipping_address, billing_address, transaction_id, cancellation_reason,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.currency.as_str())
        .bind(order.subtotal.cents())
        .bind(order.tax_amount.cents())
        .bind(order.shipping_amount.cents())
        .bind(order.discount_amount.cents())
        .bind(order.total_amount.cents())
        .bind(serde_json::to_value(&order.shipping_address)?)
        .bind(serde_json::to_value(&order.billing_address)?)
        .bind(&order.transaction_id)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                OrderStoreError::InvalidData(format!("quantity {} too large", item.quantity))
            })?;
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (id, order_id, product_id, sku, name, unit_price, quantity, subtotal, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(&item.sku)
            .bind(&item.name)
            .bind(item.unit_price.cents())
            .bind(quantity)
            .bind(item.subtotal.cents())
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        Self::insert_history(&mut tx, &OrderHistory::created(order, "system")).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, sku, name, unit_price, quantity, subtotal
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn get_history(&self, order_id: OrderId) -> Result<Vec<OrderHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, from_status, to_status, note, actor, created_at
            FROM order_history
            WHERE order_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_history).collect()
    }

    async fn list_by_user(&self, user_id: UserId, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, order_number DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        change: StatusChange,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE serializes concurrent transitions on the same order.
        let mut order = Self::lock_order(&mut tx, order_id).await?;
        if order.status != expected {
            tx.rollback().await?;
            return Err(OrderStoreError::StatusConflict {
                order_id,
                expected,
                actual: order.status,
            });
        }

        let entry = order.apply(&change)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, transaction_id = $4, cancellation_reason = $5,
                updated_at = $6, paid_at = $7, shipped_at = $8, delivered_at = $9, cancelled_at = $10
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.transaction_id)
        .bind(&order.cancellation_reason)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_history(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn set_payment_status(
        &self,
        order_id: OrderId,
        payment_status: PaymentStatus,
        note: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;
        order.payment_status = payment_status;
        order.updated_at = at;

        sqlx::query("UPDATE orders SET payment_status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(payment_status.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await?;

        Self::insert_history(
            &mut tx,
            &OrderHistory::note(order_id, order.status, note, actor, at),
        )
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn append_history(&self, entry: OrderHistory) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_history(&mut tx, &entry)
            .await
            .map_err(|e| match e {
                OrderStoreError::Database(sqlx::Error::Database(ref db_err))
                    if db_err.is_foreign_key_violation() =>
                {
                    OrderStoreError::OrderNotFound(entry.order_id)
                }
                other => other,
            })?;
        tx.commit().await?;
        Ok(())
    }
}
