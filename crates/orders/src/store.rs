use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};

use crate::{Order, OrderHistory, OrderItem, OrderStatus, PaymentStatus, Result, StatusChange};

/// Persistent storage for orders, their line items and status history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order with its items and the initial history row, in one
    /// transaction. The amounts are validated before anything is written.
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()>;

    /// Loads an order header.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order's line items.
    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Loads an order's history, oldest first.
    async fn get_history(&self, order_id: OrderId) -> Result<Vec<OrderHistory>>;

    /// Lists a user's orders, newest first.
    async fn list_by_user(&self, user_id: UserId, limit: i64, offset: i64) -> Result<Vec<Order>>;

    /// Moves an order from `expected` to `change.to` and appends the history
    /// row, atomically.
    ///
    /// Fails with `StatusConflict` if the order is no longer in `expected`,
    /// so two callers racing on the same order cannot both win.
    async fn transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        change: StatusChange,
    ) -> Result<Order>;

    /// Updates only the payment status and records a note.
    async fn set_payment_status(
        &self,
        order_id: OrderId,
        payment_status: PaymentStatus,
        note: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Order>;

    /// Appends a history row without changing the order.
    async fn append_history(&self, entry: OrderHistory) -> Result<()>;
}
