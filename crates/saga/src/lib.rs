//! Order orchestration saga.
//!
//! Placing an order spans three owners of state: the order store, the
//! inventory engine and the payment gateway. [`OrderSaga`] drives them:
//!
//! 1. Check stock for every line
//! 2. Persist the order as `pending`
//! 3. Reserve every line
//! 4. Capture payment and commit the reservations
//!
//! Each step that changes another component records a compensation in a
//! [`CompensationLog`]; when a later step fails, completed steps are
//! compensated in reverse order.

pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod request;
pub mod services;

pub use compensation::{Compensation, CompensationFailure, CompensationLog};
pub use config::SagaConfig;
pub use coordinator::{OrderSaga, RESTOCK_REASON, SAGA_ACTOR};
pub use error::{Result, SagaError};
pub use request::{CreateOrderRequest, OrderLine};
pub use services::{
    CartError, CartStore, InMemoryCartStore, InMemoryPaymentGateway, InventoryService,
    PaymentGateway, PaymentGatewayError, PaymentRequest, PaymentResult, RefundResult,
};
