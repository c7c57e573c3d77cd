use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AdjustmentId, InventoryItemId, OrderId, ProductId, ReservationId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    InventoryAdjustment, InventoryError, InventoryItem, ItemUpdate, Reservation, ReservationStatus,
    Result, store::InventoryStore,
};

const ITEM_COLUMNS: &str = "id, product_id, sku, quantity, reserved_quantity, available_quantity, \
     reorder_level, reorder_quantity, status, location, created_at, updated_at";

const RESERVATION_COLUMNS: &str =
    "id, product_id, quantity, order_id, customer_id, status, expires_at, created_at, updated_at";

/// PostgreSQL-backed inventory store.
///
/// `available_quantity` and `status` are generated columns, so the stock
/// classification can never drift from the counters it is derived from.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
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

    fn row_to_item(row: PgRow) -> Result<InventoryItem> {
        let status: String = row.try_get("status")?;
        Ok(InventoryItem {
            id: InventoryItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            sku: row.try_get("sku")?,
            quantity: row.try_get("quantity")?,
            reserved_quantity: row.try_get("reserved_quantity")?,
            available_quantity: row.try_get("available_quantity")?,
            reorder_level: row.try_get("reorder_level")?,
            reorder_quantity: row.try_get("reorder_quantity")?,
            status: status.parse()?,
            location: row.try_get("location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: row.try_get("quantity")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            customer_id: UserId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            status: status.parse()?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_adjustment(row: PgRow) -> Result<InventoryAdjustment> {
        Ok(InventoryAdjustment {
            id: AdjustmentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: row.try_get("quantity")?,
            reason: row.try_get("reason")?,
            adjusted_by: row.try_get("adjusted_by")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn fetch_items(&self, filter: &str) -> Result<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE {filter} \
             ORDER BY available_quantity ASC, product_id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn missing_item_or_short(
        tx: &mut Transaction<'_, Postgres>,
        product_id: &ProductId,
        requested: i64,
    ) -> InventoryError {
        let available: std::result::Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(
            "SELECT available_quantity FROM inventory_items WHERE product_id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut **tx)
        .await;

        match available {
            Ok(Some(available)) => InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                requested,
                available,
            },
            Ok(None) => InventoryError::ProductNotFound(product_id.clone()),
            Err(e) => InventoryError::Database(e),
        }
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn insert_item(&self, item: InventoryItem) -> Result<InventoryItem> {
        let sql = format!(
            r#"
            INSERT INTO inventory_items
                (id, product_id, sku, quantity, reserved_quantity, reorder_level, reorder_quantity,
                 location, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(item.id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(item.reserved_quantity)
            .bind(item.reorder_level)
            .bind(item.reorder_quantity)
            .bind(&item.location)
            .bind(item.created_at)
            .bind(item.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_inventory_product")
                {
                    return InventoryError::DuplicateProduct(item.product_id.clone());
                }
                InventoryError::Database(e)
            })?;

        Self::row_to_item(row)
    }

    async fn get_item(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE product_id = $1");
        sqlx::query(&sql)
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_item)
            .transpose()
    }

    async fn get_item_by_id(&self, id: InventoryItemId) -> Result<Option<InventoryItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_item)
            .transpose()
    }

    async fn get_item_by_sku(&self, sku: &str) -> Result<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE sku = $1 ORDER BY product_id LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_item)
            .transpose()
    }

    async fn update_item(
        &self,
        id: InventoryItemId,
        update: &ItemUpdate,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem> {
        let sql = format!(
            r#"
            UPDATE inventory_items
            SET reorder_level = COALESCE($2, reorder_level),
                reorder_quantity = COALESCE($3, reorder_quantity),
                location = COALESCE($4, location),
                updated_at = $5
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(update.reorder_level)
            .bind(update.reorder_quantity)
            .bind(update.location.as_deref())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_item)
            .transpose()?
            .ok_or(InventoryError::ItemNotFound(id))
    }

    async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items ORDER BY product_id LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn low_stock_items(&self) -> Result<Vec<InventoryItem>> {
        self.fetch_items("status IN ('low_stock', 'out_of_stock')")
            .await
    }

    async fn out_of_stock_items(&self) -> Result<Vec<InventoryItem>> {
        self.fetch_items("status = 'out_of_stock'").await
    }

    async fn reserve(&self, reservation: Reservation) -> Result<(InventoryItem, Reservation)> {
        if reservation.quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(reservation.quantity));
        }

        let mut tx = self.pool.begin().await?;

        // The availability check lives in the WHERE clause: the row lock taken
        // by the UPDATE makes check and increment a single step.
        let sql = format!(
            r#"
            UPDATE inventory_items
            SET reserved_quantity = reserved_quantity + $2, updated_at = $3
            WHERE product_id = $1 AND quantity - reserved_quantity >= $2
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(reservation.product_id.as_str())
            .bind(reservation.quantity)
            .bind(reservation.created_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let err =
                Self::missing_item_or_short(&mut tx, &reservation.product_id, reservation.quantity)
                    .await;
            tx.rollback().await?;
            return Err(err);
        };
        let item = Self::row_to_item(row)?;

        sqlx::query(
            r#"
            INSERT INTO reservations
                (id, product_id, quantity, order_id, customer_id, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(reservation.quantity)
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.customer_id.as_uuid())
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((item, reservation))
    }

    async fn settle_reservation(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<(InventoryItem, Reservation)> {
        if status == ReservationStatus::Pending {
            return Err(InventoryError::InvalidData(
                "cannot settle a reservation back to pending".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE reservations SET status = $2, updated_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING {RESERVATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(reservation_id.as_uuid())
            .bind(status.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM reservations WHERE id = $1")
                    .bind(reservation_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(match current {
                Some(current) => InventoryError::ReleaseAlreadyTerminal {
                    reservation_id,
                    status: current.parse()?,
                },
                None => InventoryError::ReservationNotFound(reservation_id),
            });
        };
        let reservation = Self::row_to_reservation(row)?;

        let deducted = if status == ReservationStatus::Fulfilled {
            reservation.quantity
        } else {
            0
        };
        let sql = format!(
            r#"
            UPDATE inventory_items
            SET reserved_quantity = reserved_quantity - $2,
                quantity = quantity - $3,
                updated_at = $4
            WHERE product_id = $1 AND reserved_quantity >= $2
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(reservation.product_id.as_str())
            .bind(reservation.quantity)
            .bind(deducted)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(InventoryError::ReservedUnderflow {
                product_id: reservation.product_id,
                reserved: 0,
                requested: reservation.quantity,
            });
        };
        let item = Self::row_to_item(row)?;

        tx.commit().await?;
        Ok((item, reservation))
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        sqlx::query(&sql)
            .bind(reservation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_reservation)
            .transpose()
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE order_id = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>> {
        let sql = format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE status = 'pending' AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn adjust(&self, adjustment: InventoryAdjustment) -> Result<InventoryItem> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE inventory_items
            SET quantity = GREATEST(quantity + $2, reserved_quantity, 0), updated_at = $3
            WHERE product_id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(adjustment.product_id.as_str())
            .bind(adjustment.quantity)
            .bind(adjustment.created_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(InventoryError::ProductNotFound(adjustment.product_id));
        };
        let item = Self::row_to_item(row)?;

        sqlx::query(
            r#"
            INSERT INTO inventory_adjustments (id, product_id, quantity, reason, adjusted_by, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(adjustment.id.as_uuid())
        .bind(adjustment.product_id.as_str())
        .bind(adjustment.quantity)
        .bind(&adjustment.reason)
        .bind(&adjustment.adjusted_by)
        .bind(&adjustment.notes)
        .bind(adjustment.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn adjustments_for_product(
        &self,
        product_id: &ProductId,
        limit: i64,
    ) -> Result<Vec<InventoryAdjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, reason, adjusted_by, notes, created_at
            FROM inventory_adjustments
            WHERE product_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(product_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_adjustment).collect()
    }
}
