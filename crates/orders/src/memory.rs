use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::{
    Order, OrderHistory, OrderItem, OrderStatus, OrderStoreError, PaymentStatus, Result,
    StatusChange, model::validate_order, store::OrderStore,
};

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    history: HashMap<OrderId, Vec<OrderHistory>>,
}

/// In-memory order store for tests and database-less runs.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        validate_order(order, items)?;

        let mut state = self.state.write().await;
        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(OrderStoreError::InvalidData(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }

        state.orders.insert(order.id, order.clone());
        state.items.insert(order.id, items.to_vec());
        state
            .history
            .insert(order.id, vec![OrderHistory::created(order, "system")]);
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .state
            .read()
            .await
            .items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_history(&self, order_id: OrderId) -> Result<Vec<OrderHistory>> {
        Ok(self
            .state
            .read()
            .await
            .history
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_by_user(&self, user_id: UserId, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });
        Ok(orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        change: StatusChange,
    ) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(OrderStoreError::OrderNotFound(order_id))?;
        if order.status != expected {
            return Err(OrderStoreError::StatusConflict {
                order_id,
                expected,
                actual: order.status,
            });
        }

        // Apply to a copy so a rejected transition leaves the order untouched.
        let mut updated = order.clone();
        let entry = updated.apply(&change)?;
        *order = updated.clone();
        state.history.entry(order_id).or_default().push(entry);
        Ok(updated)
    }

    async fn set_payment_status(
        &self,
        order_id: OrderId,
        payment_status: PaymentStatus,
        note: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(OrderStoreError::OrderNotFound(order_id))?;
        order.payment_status = payment_status;
        order.updated_at = at;
        let updated = order.clone();

        state
            .history
            .entry(order_id)
            .or_default()
            .push(OrderHistory::note(order_id, updated.status, note, actor, at));
        Ok(updated)
    }

    async fn append_history(&self, entry: OrderHistory) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&entry.order_id) {
            return Err(OrderStoreError::OrderNotFound(entry.order_id));
        }
        state.history.entry(entry.order_id).or_default().push(entry);
        Ok(())
    }
}
