//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use orders::{Currency, Money, PaymentMethod};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A charge request sent to the gateway.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
}

/// A captured charge.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    /// The gateway's transaction ID.
    pub transaction_id: String,
}

/// A completed refund.
#[derive(Debug, Clone)]
pub struct RefundResult {
    pub refund_id: String,
    pub amount: Money,
}

/// Errors reported by a payment gateway.
#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    /// The charge was declined.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The gateway did not answer in time.
    #[error("Payment gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway could not be reached.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The transaction to refund is unknown to the gateway.
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),
}

/// Charges and refunds customers.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Captures a payment.
    async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, PaymentGatewayError>;

    /// Refunds (part of) a captured payment.
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<RefundResult, PaymentGatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: HashMap<String, (OrderId, Money)>,
    refunds: Vec<(String, Money)>,
    fail_on_charge: bool,
    fail_on_refund: bool,
    delay: Option<Duration>,
}

/// In-memory payment gateway for testing and local runs.
///
/// Charges succeed unless told otherwise; a configured delay lets tests
/// exercise the saga's payment timeout.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent charges fail with `Declined`.
    pub async fn set_fail_on_charge(&self, fail: bool) {
        self.state.lock().await.fail_on_charge = fail;
    }

    /// Makes subsequent refunds fail with `Unavailable`.
    pub async fn set_fail_on_refund(&self, fail: bool) {
        self.state.lock().await.fail_on_refund = fail;
    }

    /// Delays every charge by `delay` before answering.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    /// Returns the number of captured charges.
    pub async fn charge_count(&self) -> usize {
        self.state.lock().await.charges.len()
    }

    /// Returns the refunds issued, oldest first.
    pub async fn refunds(&self) -> Vec<(String, Money)> {
        self.state.lock().await.refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, PaymentGatewayError> {
        let delay = self.state.lock().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_on_charge {
            return Err(PaymentGatewayError::Declined(
                "card declined by issuer".to_string(),
            ));
        }

        let transaction_id = format!("txn_{}", Uuid::new_v4().simple());
        state
            .charges
            .insert(transaction_id.clone(), (request.order_id, request.amount));
        Ok(PaymentResult { transaction_id })
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<RefundResult, PaymentGatewayError> {
        let mut state = self.state.lock().await;
        if state.fail_on_refund {
            return Err(PaymentGatewayError::Unavailable(
                "refund endpoint unavailable".to_string(),
            ));
        }
        if !state.charges.contains_key(transaction_id) {
            return Err(PaymentGatewayError::UnknownTransaction(
                transaction_id.to_string(),
            ));
        }

        state.refunds.push((transaction_id.to_string(), amount));
        Ok(RefundResult {
            refund_id: format!("re_{}", Uuid::new_v4().simple()),
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cents: i64) -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new(),
            amount: Money::from_cents(cents),
            currency: Currency::Usd,
            method: PaymentMethod::CreditCard,
        }
    }

    #[tokio::test]
    async fn test_charge_and_refund() {
        let gateway = InMemoryPaymentGateway::new();

        let result = gateway.process_payment(&request(5000)).await.unwrap();
        assert!(result.transaction_id.starts_with("txn_"));
        assert_eq!(gateway.charge_count().await, 1);

        let refund = gateway
            .refund(&result.transaction_id, Money::from_cents(5000))
            .await
            .unwrap();
        assert_eq!(refund.amount, Money::from_cents(5000));
        assert_eq!(gateway.refunds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_declined_charge() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_charge(true).await;

        let result = gateway.process_payment(&request(5000)).await;
        assert!(matches!(result, Err(PaymentGatewayError::Declined(_))));
        assert_eq!(gateway.charge_count().await, 0);
    }

    #[tokio::test]
    async fn test_refund_unknown_transaction() {
        let gateway = InMemoryPaymentGateway::new();
        let result = gateway.refund("txn_missing", Money::from_cents(1)).await;
        assert!(matches!(
            result,
            Err(PaymentGatewayError::UnknownTransaction(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_observable() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_delay(Some(Duration::from_secs(30))).await;

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            gateway.process_payment(&request(100)),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(gateway.charge_count().await, 0);
    }
}
