//! Order and payment status state machines.

use serde::{Deserialize, Serialize};

use crate::OrderStoreError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► PaymentPending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │              │                └──────────────────────────►┘
///    └──────────────┴──► PaymentFailed
///
/// Pending | PaymentPending | PaymentFailed | Confirmed | Processing ──► Cancelled
/// Confirmed | Processing | Shipped ──► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order persisted, inventory reserved, awaiting payment.
    #[default]
    Pending,

    /// Payment request sent to the gateway.
    PaymentPending,

    /// Payment captured.
    Confirmed,

    /// Warehouse is picking and packing.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled before shipping (terminal state).
    Cancelled,

    /// Payment returned to the customer (terminal state).
    Refunded,

    /// Payment declined or timed out. The order can still be cancelled.
    PaymentFailed,
}

impl OrderStatus {
    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, next) {
            (Pending, PaymentPending) => true,
            (Pending | PaymentPending, PaymentFailed) => true,
            (PaymentPending, Confirmed) => true,
            (Confirmed, Processing) => true,
            (Confirmed | Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (from, Cancelled) => from.can_cancel(),
            (from, Refunded) => from.can_refund(),
            _ => false,
        }
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::PaymentPending
                | OrderStatus::PaymentFailed
                | OrderStatus::Confirmed
                | OrderStatus::Processing
        )
    }

    /// Returns true if a captured payment can be refunded from this status.
    pub fn can_refund(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::Shipped
        )
    }

    /// Returns true if payment can be requested.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::PaymentFailed => "payment_failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "payment_pending" => Ok(OrderStatus::PaymentPending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            "payment_failed" => Ok(OrderStatus::PaymentFailed),
            other => Err(OrderStoreError::InvalidData(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Payment state of an order, as last reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Captured,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    /// Returns true if money has been taken and not fully returned.
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured | PaymentStatus::PartiallyRefunded
        )
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = OrderStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "captured" => Ok(PaymentStatus::Captured),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            other => Err(OrderStoreError::InvalidData(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}
