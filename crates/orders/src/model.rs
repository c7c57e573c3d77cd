//! Order records: header, line items and status history.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, Money, OrderStatus, OrderStoreError, PaymentStatus, Result};

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    DebitCard,
    Paypal,
    Stripe,
}

impl PaymentMethod {
    /// Returns the method name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Stripe => "stripe",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = OrderStoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            "stripe" => Ok(PaymentMethod::Stripe),
            other => Err(OrderStoreError::InvalidData(format!(
                "unknown payment method '{other}'"
            ))),
        }
    }
}

/// Postal address, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// The money breakdown of an order.
///
/// `total = subtotal + tax + shipping - discount` must hold exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl Totals {
    /// Builds totals, computing `total` from the components.
    pub fn compute(subtotal: Money, tax: Money, shipping: Money, discount: Money) -> Result<Self> {
        let total = subtotal
            .checked_add(tax)
            .and_then(|m| m.checked_add(shipping))
            .and_then(|m| m.checked_sub(discount))
            .ok_or_else(|| OrderStoreError::InvalidData("order total overflows".to_string()))?;
        let totals = Self {
            subtotal,
            tax,
            shipping,
            discount,
            total,
        };
        totals.validate()?;
        Ok(totals)
    }

    /// Checks that every component is non-negative and that the total adds up.
    pub fn validate(&self) -> Result<()> {
        for (name, amount) in [
            ("subtotal", self.subtotal),
            ("tax", self.tax),
            ("shipping", self.shipping),
            ("discount", self.discount),
            ("total", self.total),
        ] {
            if amount.is_negative() {
                return Err(OrderStoreError::InvalidData(format!(
                    "{name} must not be negative, got {amount}"
                )));
            }
        }

        let expected = self.subtotal + self.tax + self.shipping - self.discount;
        if expected != self.total {
            return Err(OrderStoreError::AmountMismatch {
                expected,
                actual: self.total,
            });
        }
        Ok(())
    }
}

/// Generates a human-readable order number: `ORD-YYYYMMDD-XXXXXXXX`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub currency: Currency,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub transaction_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Everything needed to open a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub currency: Currency,
    pub totals: Totals,
    pub shipping_address: Address,
    pub billing_address: Address,
}

impl Order {
    /// Opens a `pending` order after validating its totals.
    pub fn new(new: NewOrder, now: DateTime<Utc>) -> Result<Self> {
        new.totals.validate()?;
        Ok(Self {
            id: OrderId::new(),
            order_number: generate_order_number(now),
            user_id: new.user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: new.payment_method,
            currency: new.currency,
            subtotal: new.totals.subtotal,
            tax_amount: new.totals.tax,
            shipping_amount: new.totals.shipping,
            discount_amount: new.totals.discount,
            total_amount: new.totals.total,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            transaction_id: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        })
    }

    /// Returns the money breakdown.
    pub fn totals(&self) -> Totals {
        Totals {
            subtotal: self.subtotal,
            tax: self.tax_amount,
            shipping: self.shipping_amount,
            discount: self.discount_amount,
            total: self.total_amount,
        }
    }

    /// Applies a status change and returns the history row describing it.
    ///
    /// The status timestamps (`paid_at`, `shipped_at`, ...) are stamped from
    /// the change's instant.
    pub fn apply(&mut self, change: &StatusChange) -> Result<OrderHistory> {
        if !self.status.can_transition_to(change.to) {
            return Err(OrderStoreError::InvalidStateTransition {
                from: self.status,
                to: change.to,
            });
        }

        let from = self.status;
        self.status = change.to;
        if let Some(payment_status) = change.payment_status {
            self.payment_status = payment_status;
        }
        if let Some(transaction_id) = &change.transaction_id {
            self.transaction_id = Some(transaction_id.clone());
        }
        match change.to {
            OrderStatus::Confirmed => self.paid_at = Some(change.at),
            OrderStatus::Shipped => self.shipped_at = Some(change.at),
            OrderStatus::Delivered => self.delivered_at = Some(change.at),
            OrderStatus::Cancelled => {
                self.cancelled_at = Some(change.at);
                self.cancellation_reason = change.note.clone();
            }
            _ => {}
        }
        self.updated_at = change.at;

        Ok(OrderHistory {
            id: Uuid::new_v4(),
            order_id: self.id,
            from_status: Some(from),
            to_status: change.to,
            note: change.note.clone(),
            actor: change.actor.clone(),
            created_at: change.at,
        })
    }
}

/// A requested status transition.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub to: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
    pub transaction_id: Option<String>,
    pub note: Option<String>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// Creates a change to `to` made by `actor` at `at`.
    pub fn new(to: OrderStatus, actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            to,
            payment_status: None,
            transaction_id: None,
            note: None,
            actor: actor.into(),
            at,
        }
    }

    /// Also sets the payment status.
    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    /// Records the gateway transaction.
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Attaches a note (for cancellations, the reason).
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// One line of an order: a price snapshot taken when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates a line item, computing its subtotal.
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Self> {
        if quantity == 0 {
            return Err(OrderStoreError::InvalidData(format!(
                "quantity for {product_id} must be positive"
            )));
        }
        if unit_price.is_negative() {
            return Err(OrderStoreError::InvalidData(format!(
                "unit price for {product_id} must not be negative"
            )));
        }
        let subtotal = unit_price.checked_mul(quantity).ok_or_else(|| {
            OrderStoreError::InvalidData(format!("subtotal for {product_id} overflows"))
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            sku: sku.into(),
            name: name.into(),
            unit_price,
            quantity,
            subtotal,
        })
    }
}

/// Append-only record of a status change or a note about the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub id: Uuid,
    pub order_id: OrderId,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub note: Option<String>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl OrderHistory {
    /// The row written when an order is created.
    pub fn created(order: &Order, actor: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            from_status: None,
            to_status: order.status,
            note: Some("order created".to_string()),
            actor: actor.into(),
            created_at: order.created_at,
        }
    }

    /// A note that leaves the status unchanged.
    pub fn note(
        order_id: OrderId,
        status: OrderStatus,
        note: impl Into<String>,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            from_status: Some(status),
            to_status: status,
            note: Some(note.into()),
            actor: actor.into(),
            created_at: at,
        }
    }
}

/// An order with its items and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderHistory>,
}

/// Checks an order's totals and that its subtotal equals the sum of its lines.
pub fn validate_order(order: &Order, items: &[OrderItem]) -> Result<()> {
    order.totals().validate()?;
    if items.is_empty() {
        return Err(OrderStoreError::InvalidData(
            "order must have at least one item".to_string(),
        ));
    }

    for item in items {
        let expected = item.unit_price.checked_mul(item.quantity);
        if expected != Some(item.subtotal) {
            return Err(OrderStoreError::InvalidData(format!(
                "line subtotal for {} does not match price x quantity",
                item.product_id
            )));
        }
    }

    let lines: Money = items.iter().map(|i| i.subtotal).sum();
    if lines != order.subtotal {
        return Err(OrderStoreError::AmountMismatch {
            expected: lines,
            actual: order.subtotal,
        });
    }
    Ok(())
}
