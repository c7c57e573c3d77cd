//! Checkout request accepted by [`crate::OrderSaga::create_order`].

use common::{ProductId, UserId};
use orders::{Address, Money, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// One cart line at checkout, with the price the customer saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

/// A request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub discount: Money,
}

impl CreateOrderRequest {
    /// Checks the request shape before anything is looked up or written.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(SagaError::InvalidRequest(
                "order must contain at least one item".to_string(),
            ));
        }
        for line in &self.items {
            if line.quantity == 0 {
                return Err(SagaError::InvalidRequest(format!(
                    "quantity for {} must be positive",
                    line.product_id
                )));
            }
            if line.unit_price.is_negative() {
                return Err(SagaError::InvalidRequest(format!(
                    "unit price for {} must not be negative",
                    line.product_id
                )));
            }
        }
        if self.discount.is_negative() {
            return Err(SagaError::InvalidRequest(
                "discount must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Sum of `unit_price * quantity` over all lines.
    pub fn subtotal(&self) -> Result<Money> {
        self.items.iter().try_fold(Money::zero(), |acc, line| {
            line.unit_price
                .checked_mul(line.quantity)
                .and_then(|subtotal| acc.checked_add(subtotal))
                .ok_or_else(|| SagaError::InvalidRequest("order subtotal overflows".to_string()))
        })
    }
}
