//! Shopping cart cleanup after checkout.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, UserId};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from the cart backend.
#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("Cart store unavailable: {0}")]
    Unavailable(String),
}

/// The cart backend. The saga only ever empties a cart after checkout.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Removes every item from the user's cart.
    async fn clear_cart(&self, user_id: UserId) -> Result<(), CartError>;
}

#[derive(Debug, Default)]
struct CartState {
    carts: HashMap<UserId, Vec<(ProductId, u32)>>,
    fail_on_clear: bool,
}

/// In-memory cart store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    state: Arc<RwLock<CartState>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line to a user's cart.
    pub async fn add_item(&self, user_id: UserId, product_id: ProductId, quantity: u32) {
        self.state
            .write()
            .await
            .carts
            .entry(user_id)
            .or_default()
            .push((product_id, quantity));
    }

    /// Returns the number of lines in a user's cart.
    pub async fn item_count(&self, user_id: UserId) -> usize {
        self.state
            .read()
            .await
            .carts
            .get(&user_id)
            .map_or(0, Vec::len)
    }

    pub async fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().await.fail_on_clear = fail;
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn clear_cart(&self, user_id: UserId) -> Result<(), CartError> {
        let mut state = self.state.write().await;
        if state.fail_on_clear {
            return Err(CartError::Unavailable("connection refused".to_string()));
        }
        state.carts.remove(&user_id);
        Ok(())
    }
}
