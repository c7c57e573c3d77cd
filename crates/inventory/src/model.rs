//! Inventory records: stock levels, reservations and adjustments.

use chrono::{DateTime, Utc};
use common::{AdjustmentId, InventoryItemId, OrderId, ProductId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Stock level classification of an inventory item.
///
/// Always derived from available quantity and reorder level, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Classifies stock: out of stock at zero, low at or below the reorder level.
    pub fn derive(available: i64, reorder_level: i64) -> Self {
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= reorder_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StockStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "low_stock" => Ok(StockStatus::LowStock),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            other => Err(InventoryError::InvalidData(format!(
                "unknown stock status '{other}'"
            ))),
        }
    }
}

/// Stock record for one product.
///
/// `available_quantity` and `status` are derived fields; every mutating
/// method recomputes them through [`InventoryItem::refresh`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub product_id: ProductId,
    pub sku: String,
    /// Units on hand.
    pub quantity: i64,
    /// Units held by pending reservations.
    pub reserved_quantity: i64,
    pub available_quantity: i64,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    pub status: StockStatus,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Builds a fresh item from onboarding data.
    pub fn from_new(new: NewInventoryItem, now: DateTime<Utc>) -> Result<Self, InventoryError> {
        if new.quantity < 0 {
            return Err(InventoryError::InvalidQuantity(new.quantity));
        }
        if new.reorder_level < 0 {
            return Err(InventoryError::InvalidQuantity(new.reorder_level));
        }
        if new.reorder_quantity < 0 {
            return Err(InventoryError::InvalidQuantity(new.reorder_quantity));
        }

        let mut item = Self {
            id: InventoryItemId::new(),
            product_id: new.product_id,
            sku: new.sku,
            quantity: new.quantity,
            reserved_quantity: 0,
            available_quantity: 0,
            reorder_level: new.reorder_level,
            reorder_quantity: new.reorder_quantity,
            status: StockStatus::OutOfStock,
            location: new.location,
            created_at: now,
            updated_at: now,
        };
        item.refresh();
        Ok(item)
    }

    /// Recomputes the derived fields.
    pub fn refresh(&mut self) {
        self.available_quantity = (self.quantity - self.reserved_quantity).max(0);
        self.status = StockStatus::derive(self.available_quantity, self.reorder_level);
    }

    /// Returns true if `quantity` units can be reserved right now.
    pub fn can_reserve(&self, quantity: i64) -> bool {
        self.available_quantity >= quantity
    }

    /// Returns true if available stock is at or below the reorder level.
    pub fn should_reorder(&self) -> bool {
        self.available_quantity <= self.reorder_level
    }

    /// Places a hold on `quantity` units. All or nothing.
    pub fn reserve(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        if !self.can_reserve(quantity) {
            return Err(InventoryError::InsufficientStock {
                product_id: self.product_id.clone(),
                requested: quantity,
                available: self.available_quantity,
            });
        }

        self.reserved_quantity += quantity;
        self.touch(now);
        Ok(())
    }

    /// Drops a hold of `quantity` units without touching on-hand stock.
    pub fn release(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<(), InventoryError> {
        self.check_reserved(quantity)?;
        self.reserved_quantity -= quantity;
        self.touch(now);
        Ok(())
    }

    /// Converts a hold into a permanent deduction: the units leave both the
    /// reserved and the on-hand counters.
    pub fn fulfill(&mut self, quantity: i64, now: DateTime<Utc>) -> Result<(), InventoryError> {
        self.check_reserved(quantity)?;
        self.reserved_quantity -= quantity;
        self.quantity -= quantity;
        self.touch(now);
        Ok(())
    }

    /// Applies a signed manual change to on-hand stock and returns the delta
    /// actually applied.
    ///
    /// Decrements stop at zero, and never below the units currently held by
    /// reservations.
    pub fn apply_adjustment(&mut self, delta: i64, now: DateTime<Utc>) -> i64 {
        let before = self.quantity;
        let floor = self.reserved_quantity.max(0);
        self.quantity = self.quantity.saturating_add(delta).max(floor);
        self.touch(now);
        self.quantity - before
    }

    /// Applies new reorder settings or a new location. Status is
    /// re-derived, since it depends on the reorder level.
    pub fn apply_update(&mut self, update: &ItemUpdate, now: DateTime<Utc>) {
        if let Some(level) = update.reorder_level {
            self.reorder_level = level;
        }
        if let Some(quantity) = update.reorder_quantity {
            self.reorder_quantity = quantity;
        }
        if let Some(location) = &update.location {
            self.location = location.clone();
        }
        self.touch(now);
    }

    fn check_reserved(&self, quantity: i64) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        if quantity > self.reserved_quantity {
            return Err(InventoryError::ReservedUnderflow {
                product_id: self.product_id.clone(),
                reserved: self.reserved_quantity,
                requested: quantity,
            });
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.refresh();
        self.updated_at = now;
    }
}

/// Onboarding data for a new inventory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub product_id: ProductId,
    pub sku: String,
    pub quantity: i64,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    #[serde(default)]
    pub location: String,
}

/// Changes to an item's reorder settings and location. Absent fields are
/// left as they are; stock counters are changed through adjustments only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub reorder_level: Option<i64>,
    #[serde(default)]
    pub reorder_quantity: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
}

impl ItemUpdate {
    /// Rejects negative reorder settings.
    pub fn validate(&self) -> Result<(), InventoryError> {
        for value in [self.reorder_level, self.reorder_quantity].into_iter().flatten() {
            if value < 0 {
                return Err(InventoryError::InvalidQuantity(value));
            }
        }
        Ok(())
    }

    /// Returns true if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.reorder_level.is_none() && self.reorder_quantity.is_none() && self.location.is_none()
    }
}

/// Lifecycle of a reservation. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// Returns true once the reservation has left `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "fulfilled" => Ok(ReservationStatus::Fulfilled),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(InventoryError::InvalidData(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// A time-bounded hold on stock of one product for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a pending reservation.
    pub fn pending(
        product_id: ProductId,
        quantity: i64,
        order_id: OrderId,
        customer_id: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            product_id,
            quantity,
            order_id,
            customer_id,
            status: ReservationStatus::Pending,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the hold is still pending past its deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at < now
    }
}

/// Append-only audit record of a manual stock change.
///
/// `quantity` is the signed delta exactly as submitted, even when the
/// applied change was clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub id: AdjustmentId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: String,
    pub adjusted_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A request to change on-hand stock by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: String,
    pub adjusted_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AdjustmentRequest {
    /// Creates an adjustment request without notes.
    pub fn new(
        product_id: impl Into<ProductId>,
        delta: i64,
        reason: impl Into<String>,
        adjusted_by: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            delta,
            reason: reason.into(),
            adjusted_by: adjusted_by.into(),
            notes: None,
        }
    }

    /// Attaches free-form notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Turns the request into its audit record.
    pub fn into_record(self, now: DateTime<Utc>) -> InventoryAdjustment {
        InventoryAdjustment {
            id: AdjustmentId::new(),
            product_id: self.product_id,
            quantity: self.delta,
            reason: self.reason,
            adjusted_by: self.adjusted_by,
            notes: self.notes,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laptop(quantity: i64, reorder_level: i64) -> InventoryItem {
        InventoryItem::from_new(
            NewInventoryItem {
                product_id: ProductId::new("prod-laptop"),
                sku: "LAPTOP-001".to_string(),
                quantity,
                reorder_level,
                reorder_quantity: 20,
                location: "WH-1".to_string(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(StockStatus::derive(0, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::derive(5, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(10, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(11, 10), StockStatus::InStock);
        assert_eq!(StockStatus::derive(0, 0), StockStatus::OutOfStock);
    }

    #[test]
    fn test_laptop_goes_low_stock_after_large_reservation() {
        let mut item = laptop(50, 10);
        assert_eq!(item.status, StockStatus::InStock);

        item.reserve(45, Utc::now()).unwrap();
        assert_eq!(item.available_quantity, 5);
        assert_eq!(item.reserved_quantity, 45);
        assert_eq!(item.status, StockStatus::LowStock);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut item = laptop(3, 1);
        let err = item.reserve(4, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
        assert_eq!(item.reserved_quantity, 0);
    }

    #[test]
    fn test_reserve_rejects_zero() {
        let mut item = laptop(3, 1);
        assert!(matches!(
            item.reserve(0, Utc::now()),
            Err(InventoryError::InvalidQuantity(0))
        ));
    }

    #[test]
    fn test_release_and_fulfill() {
        let mut item = laptop(10, 2);
        item.reserve(4, Utc::now()).unwrap();

        item.release(1, Utc::now()).unwrap();
        assert_eq!(item.reserved_quantity, 3);
        assert_eq!(item.quantity, 10);

        item.fulfill(3, Utc::now()).unwrap();
        assert_eq!(item.reserved_quantity, 0);
        assert_eq!(item.quantity, 7);
        assert_eq!(item.available_quantity, 7);
    }

    #[test]
    fn test_release_more_than_reserved_fails() {
        let mut item = laptop(10, 2);
        item.reserve(2, Utc::now()).unwrap();
        assert!(matches!(
            item.release(3, Utc::now()),
            Err(InventoryError::ReservedUnderflow { .. })
        ));
        assert_eq!(item.reserved_quantity, 2);
    }

    #[test]
    fn test_adjustment_clamps_at_zero() {
        let mut item = laptop(5, 1);
        let applied = item.apply_adjustment(-8, Utc::now());
        assert_eq!(applied, -5);
        assert_eq!(item.quantity, 0);
        assert_eq!(item.status, StockStatus::OutOfStock);
    }

    #[test]
    fn test_adjustment_never_drops_below_reserved() {
        let mut item = laptop(10, 1);
        item.reserve(4, Utc::now()).unwrap();
        let applied = item.apply_adjustment(-10, Utc::now());
        assert_eq!(applied, -6);
        assert_eq!(item.quantity, 4);
        assert_eq!(item.available_quantity, 0);
    }

    #[test]
    fn test_positive_adjustment() {
        let mut item = laptop(0, 1);
        assert_eq!(item.apply_adjustment(12, Utc::now()), 12);
        assert_eq!(item.quantity, 12);
        assert_eq!(item.status, StockStatus::InStock);
    }

    #[test]
    fn test_reservation_expiry_check() {
        let now = Utc::now();
        let reservation = Reservation::pending(
            ProductId::new("p"),
            1,
            OrderId::new(),
            UserId::new(),
            now,
            now + chrono::Duration::minutes(15),
        );
        assert!(!reservation.is_expired_at(now));
        assert!(reservation.is_expired_at(now + chrono::Duration::minutes(16)));
    }

    #[test]
    fn test_status_strings_roundtrip() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Fulfilled,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("reserved".parse::<ReservationStatus>().is_err());
        assert_eq!("low_stock".parse::<StockStatus>().unwrap(), StockStatus::LowStock);
    }
}
