//! Orders: headers, line items, status history and their persistence.
//!
//! The order status machine lives here; the saga is the only writer and
//! drives every transition through [`OrderStore::transition`].

pub mod error;
pub mod memory;
pub mod model;
pub mod money;
pub mod postgres;
pub mod pricing;
pub mod state;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use model::{
    Address, NewOrder, Order, OrderDetails, OrderHistory, OrderItem, PaymentMethod, StatusChange,
    Totals, generate_order_number, validate_order,
};
pub use money::{Currency, Money};
pub use postgres::PostgresOrderStore;
pub use pricing::Pricing;
pub use state::{OrderStatus, PaymentStatus};
pub use store::OrderStore;
