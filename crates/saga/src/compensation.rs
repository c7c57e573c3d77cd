//! Ordered record of the undo actions a saga has accumulated.
//!
//! Every forward step that changes another component's state records how to
//! undo it. On failure the log is unwound newest first, so later steps are
//! undone before the ones they depended on.

use common::{ProductId, ReservationId};
use orders::Money;
use serde::Serialize;

/// An action that undoes one completed saga step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Return a pending hold to available stock.
    ReleaseReservation {
        reservation_id: ReservationId,
        product_id: ProductId,
        quantity: i64,
    },
    /// Put committed stock back on the shelf.
    Restock {
        product_id: ProductId,
        quantity: i64,
    },
    /// Return a captured payment to the customer.
    RefundPayment {
        transaction_id: String,
        amount: Money,
    },
}

impl Compensation {
    /// Returns the step name used in logs, history notes and failures.
    pub fn step(&self) -> &'static str {
        match self {
            Compensation::ReleaseReservation { .. } => "release_reservation",
            Compensation::Restock { .. } => "restock",
            Compensation::RefundPayment { .. } => "refund_payment",
        }
    }

    /// Returns what the action targets, for logs.
    pub fn target(&self) -> String {
        match self {
            Compensation::ReleaseReservation {
                reservation_id,
                product_id,
                ..
            } => format!("{product_id} ({reservation_id})"),
            Compensation::Restock { product_id, .. } => product_id.to_string(),
            Compensation::RefundPayment { transaction_id, .. } => transaction_id.clone(),
        }
    }
}

/// A compensation that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationFailure {
    pub step: String,
    pub target: String,
    pub error: String,
}

impl std::fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} failed: {}", self.step, self.target, self.error)
    }
}

/// Compensations in the order their forward steps completed.
#[derive(Debug, Clone, Default)]
pub struct CompensationLog {
    entries: Vec<Compensation>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the undo action for a step that just completed.
    pub fn record(&mut self, compensation: Compensation) {
        self.entries.push(compensation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the log, yielding compensations newest first.
    pub fn unwind(self) -> impl Iterator<Item = Compensation> {
        self.entries.into_iter().rev()
    }
}
