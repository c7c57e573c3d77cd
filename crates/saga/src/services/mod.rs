//! External services the saga calls, with in-memory implementations for
//! tests and database-less runs.

pub mod cart;
pub mod inventory;
pub mod payment;

pub use cart::{CartError, CartStore, InMemoryCartStore};
pub use inventory::InventoryService;
pub use payment::{
    InMemoryPaymentGateway, PaymentGateway, PaymentGatewayError, PaymentRequest, PaymentResult,
    RefundResult,
};
