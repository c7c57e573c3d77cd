//! The order saga: checkout, payment and the rest of the order lifecycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{Clock, OrderId, SharedClock, SystemClock, UserId};
use events::{EventPublisher, EventPublisherExt, topics};
use inventory::{AdjustmentRequest, InventoryError, Reservation, ReservationStatus};
use orders::{
    Currency, Money, NewOrder, Order, OrderDetails, OrderHistory, OrderItem, OrderStatus,
    OrderStore, OrderStoreError, PaymentStatus, StatusChange,
};
use serde::Serialize;

use crate::compensation::{Compensation, CompensationFailure, CompensationLog};
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::request::CreateOrderRequest;
use crate::services::{
    CartStore, InventoryService, PaymentGateway, PaymentGatewayError, PaymentRequest,
    PaymentResult, RefundResult,
};

/// Actor recorded in order history for saga-driven changes.
pub const SAGA_ACTOR: &str = "order-saga";

/// Reason recorded on adjustments that return cancelled stock to the shelf.
pub const RESTOCK_REASON: &str = "order_cancelled";

#[derive(Serialize)]
struct OrderPayload<'a> {
    order_id: OrderId,
    order_number: &'a str,
    user_id: UserId,
    status: OrderStatus,
    payment_status: PaymentStatus,
    total_amount: Money,
    currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    occurred_at: DateTime<Utc>,
}

impl<'a> OrderPayload<'a> {
    fn new(order: &'a Order) -> Self {
        Self {
            order_id: order.id,
            order_number: &order.order_number,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            total_amount: order.total_amount,
            currency: order.currency,
            transaction_id: order.transaction_id.as_deref(),
            reason: None,
            occurred_at: order.updated_at,
        }
    }

    fn with_reason(mut self, reason: &'a str) -> Self {
        self.reason = Some(reason);
        self
    }
}

fn invalid_state(order: &Order, operation: &'static str) -> SagaError {
    SagaError::InvalidOrderState {
        order_id: order.id,
        status: order.status,
        operation,
    }
}

/// Orchestrates orders across the order store, the inventory engine and the
/// payment gateway.
///
/// The saga is the only writer of order state. Each step that touches
/// another component records its compensation; when a later step fails the
/// recorded compensations run newest first. Every status change is a
/// compare-and-set against the status the saga last read, so concurrent
/// callers on one order cannot both advance it.
pub struct OrderSaga<O: OrderStore, I: InventoryService> {
    orders: O,
    inventory: I,
    payments: Arc<dyn PaymentGateway>,
    carts: Arc<dyn CartStore>,
    publisher: Arc<dyn EventPublisher>,
    clock: SharedClock,
    config: SagaConfig,
}

impl<O: OrderStore, I: InventoryService> OrderSaga<O, I> {
    /// Creates a saga with the system clock and default configuration.
    pub fn new(
        orders: O,
        inventory: I,
        payments: Arc<dyn PaymentGateway>,
        carts: Arc<dyn CartStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            orders,
            inventory,
            payments,
            carts,
            publisher,
            clock: Arc::new(SystemClock),
            config: SagaConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the order store.
    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Places an order.
    ///
    /// Stock is checked up front, the order is persisted as `pending`, and
    /// then every line is reserved in request order. If any reservation
    /// fails, the ones already made are released, the order is cancelled
    /// and `ReservationFailed` is returned.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderDetails> {
        let started = Instant::now();
        request.validate()?;

        let mut skus = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let item = self
                .inventory_call(self.inventory.get_by_product_id(&line.product_id))
                .await?;
            let requested = i64::from(line.quantity);
            if item.available_quantity < requested {
                tracing::info!(
                    product_id = %line.product_id,
                    requested,
                    available = item.available_quantity,
                    "checkout rejected, insufficient stock"
                );
                return Err(SagaError::InsufficientInventory {
                    product_id: line.product_id.clone(),
                    requested,
                    available: item.available_quantity,
                });
            }
            skus.push(item.sku);
        }

        let totals = self
            .config
            .pricing
            .quote(request.subtotal()?, request.discount)?;
        let billing_address = request
            .billing_address
            .clone()
            .unwrap_or_else(|| request.shipping_address.clone());
        let order = Order::new(
            NewOrder {
                user_id: request.user_id,
                payment_method: request.payment_method,
                currency: self.config.pricing.currency,
                totals,
                shipping_address: request.shipping_address.clone(),
                billing_address,
            },
            self.clock.now(),
        )?;
        let items = request
            .items
            .iter()
            .zip(skus)
            .map(|(line, sku)| {
                OrderItem::new(
                    order.id,
                    line.product_id.clone(),
                    sku,
                    line.name.clone(),
                    line.unit_price,
                    line.quantity,
                )
            })
            .collect::<orders::Result<Vec<_>>>()?;
        self.orders.insert_order(&order, &items).await?;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order persisted"
        );

        let mut log = CompensationLog::new();
        for line in &request.items {
            let reserved = self
                .inventory_call(self.inventory.reserve(
                    &line.product_id,
                    line.quantity,
                    order.id,
                    order.user_id,
                ))
                .await;
            match reserved {
                Ok(reservation) => log.record(Compensation::ReleaseReservation {
                    reservation_id: reservation.id,
                    product_id: reservation.product_id,
                    quantity: reservation.quantity,
                }),
                Err(e) => {
                    let reason = format!("reservation of {} failed: {e}", line.product_id);
                    return Err(self.abort_checkout(&order, log, reason, started).await);
                }
            }
        }

        if let Err(e) = self.carts.clear_cart(order.user_id).await {
            tracing::warn!(order_id = %order.id, error = %e, "failed to clear cart");
        }

        self.publisher
            .emit(
                topics::ORDER_EVENTS,
                &order.id.to_string(),
                topics::ORDER_CREATED,
                &OrderPayload::new(&order),
            )
            .await;

        metrics::counter!("saga_orders_created").increment(1);
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, "order created");

        self.get_order(order.id).await
    }

    /// Charges the customer for a `pending` order.
    ///
    /// Holds that lapsed while the order waited are renewed before the
    /// gateway is called; if the stock is gone the customer is not charged.
    /// A declined or timed-out charge is not an error: the order ends in
    /// `payment_failed`, its reservations are released and the updated
    /// order is returned.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment(&self, order_id: OrderId) -> Result<Order> {
        let started = Instant::now();
        let order = self.load(order_id).await?;
        if !order.status.can_pay() {
            return Err(invalid_state(&order, "process payment for"));
        }

        let order = self
            .transition(
                &order,
                StatusChange::new(OrderStatus::PaymentPending, SAGA_ACTOR, self.clock.now()),
                "process payment for",
            )
            .await?;

        if let Err(reason) = self.secure_holds(&order).await {
            tracing::warn!(%order_id, %reason, "stock no longer held, payment not attempted");
            let result = self.fail_payment(order, reason).await;
            metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
            return result;
        }

        let request = PaymentRequest {
            order_id,
            amount: order.total_amount,
            currency: order.currency,
            method: order.payment_method,
        };
        let result = match self.charge(&request).await {
            Ok(payment) => self.confirm_payment(order, payment).await,
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "payment failed");
                self.fail_payment(order, format!("payment failed: {e}"))
                    .await
            }
        };
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    /// Cancels an order that has not shipped.
    ///
    /// Pending holds are released, committed stock is restocked and a
    /// captured payment is refunded. Compensation failures are recorded in
    /// the order history; the cancellation itself stands.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.status.can_cancel() {
            return Err(invalid_state(&order, "cancel"));
        }

        let cancelled = self
            .transition(
                &order,
                StatusChange::new(OrderStatus::Cancelled, SAGA_ACTOR, self.clock.now())
                    .with_note(reason),
                "cancel",
            )
            .await?;

        let mut log = self.reservation_compensations(order_id).await;
        if cancelled.payment_status == PaymentStatus::Captured
            && let Some(transaction_id) = &cancelled.transaction_id
        {
            log.record(Compensation::RefundPayment {
                transaction_id: transaction_id.clone(),
                amount: cancelled.total_amount,
            });
        }
        let failures = self.compensate(order_id, log).await;
        if !failures.is_empty() {
            tracing::warn!(
                %order_id,
                failures = failures.len(),
                "order cancelled with failed compensations"
            );
        }

        let cancelled = self.load(order_id).await?;
        self.publisher
            .emit(
                topics::ORDER_EVENTS,
                &order_id.to_string(),
                topics::ORDER_CANCELLED,
                &OrderPayload::new(&cancelled).with_reason(reason),
            )
            .await;
        metrics::counter!("saga_orders_cancelled").increment(1);
        Ok(cancelled)
    }

    /// Moves a confirmed order into warehouse processing.
    #[tracing::instrument(skip(self))]
    pub async fn start_processing(&self, order_id: OrderId) -> Result<Order> {
        self.advance(
            order_id,
            OrderStatus::Processing,
            "start processing",
            topics::ORDER_PROCESSING,
        )
        .await
    }

    /// Records hand-over to the carrier.
    #[tracing::instrument(skip(self))]
    pub async fn mark_shipped(&self, order_id: OrderId) -> Result<Order> {
        self.advance(order_id, OrderStatus::Shipped, "ship", topics::ORDER_SHIPPED)
            .await
    }

    /// Records delivery to the customer.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: OrderId) -> Result<Order> {
        self.advance(
            order_id,
            OrderStatus::Delivered,
            "deliver",
            topics::ORDER_DELIVERED,
        )
        .await
    }

    /// Refunds the full amount of a paid order.
    ///
    /// If the gateway refuses, the order is left unchanged apart from a
    /// history note. Stock of orders that never shipped goes back on the
    /// shelf.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.status.can_refund() || order.payment_status != PaymentStatus::Captured {
            return Err(invalid_state(&order, "refund"));
        }
        let Some(transaction_id) = order.transaction_id.clone() else {
            return Err(invalid_state(&order, "refund"));
        };

        if let Err(e) = self.refund(&transaction_id, order.total_amount).await {
            tracing::error!(%order_id, error = %e, "refund failed");
            self.note(order_id, format!("refund failed: {e}")).await;
            return Err(e.into());
        }

        let refunded = self
            .transition(
                &order,
                StatusChange::new(OrderStatus::Refunded, SAGA_ACTOR, self.clock.now())
                    .with_payment_status(PaymentStatus::Refunded)
                    .with_note(reason),
                "refund",
            )
            .await?;

        if matches!(
            order.status,
            OrderStatus::Confirmed | OrderStatus::Processing
        ) {
            let log = self.reservation_compensations(order_id).await;
            self.compensate(order_id, log).await;
        }

        self.publisher
            .emit(
                topics::ORDER_EVENTS,
                &order_id.to_string(),
                topics::ORDER_REFUNDED,
                &OrderPayload::new(&refunded).with_reason(reason),
            )
            .await;
        metrics::counter!("saga_orders_refunded").increment(1);
        Ok(refunded)
    }

    /// Loads an order with its items and history.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let order = self.load(order_id).await?;
        let items = self.orders.get_items(order_id).await?;
        let history = self.orders.get_history(order_id).await?;
        Ok(OrderDetails {
            order,
            items,
            history,
        })
    }

    /// Lists a user's orders, newest first.
    pub async fn get_user_orders(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        Ok(self.orders.list_by_user(user_id, limit, offset).await?)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))
    }

    async fn transition(
        &self,
        order: &Order,
        change: StatusChange,
        operation: &'static str,
    ) -> Result<Order> {
        let to = change.to;
        match self.orders.transition(order.id, order.status, change).await {
            Ok(updated) => {
                tracing::info!(order_id = %order.id, from = %order.status, %to, "order status changed");
                Ok(updated)
            }
            Err(OrderStoreError::StatusConflict { actual, .. }) => {
                Err(SagaError::InvalidOrderState {
                    order_id: order.id,
                    status: actual,
                    operation,
                })
            }
            Err(OrderStoreError::InvalidStateTransition { from, .. }) => {
                Err(SagaError::InvalidOrderState {
                    order_id: order.id,
                    status: from,
                    operation,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn advance(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        operation: &'static str,
        event_type: &str,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.status.can_transition_to(to) {
            return Err(invalid_state(&order, operation));
        }

        let updated = self
            .transition(
                &order,
                StatusChange::new(to, SAGA_ACTOR, self.clock.now()),
                operation,
            )
            .await?;
        self.publisher
            .emit(
                topics::ORDER_EVENTS,
                &order_id.to_string(),
                event_type,
                &OrderPayload::new(&updated),
            )
            .await;
        Ok(updated)
    }

    async fn abort_checkout(
        &self,
        order: &Order,
        log: CompensationLog,
        reason: String,
        started: Instant,
    ) -> SagaError {
        tracing::warn!(
            order_id = %order.id,
            %reason,
            compensations = log.len(),
            "checkout failed, compensating"
        );
        metrics::counter!("saga_reservation_failures").increment(1);

        // A reserve that timed out may still have been applied; the
        // engine's view of the order is the complete release set.
        let log = match self.stock_compensations(order.id).await {
            Ok(from_engine) => from_engine,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "could not load reservations, compensating from checkout log");
                log
            }
        };
        let compensation_failures = self.compensate(order.id, log).await;

        let cancel = StatusChange::new(OrderStatus::Cancelled, SAGA_ACTOR, self.clock.now())
            .with_note("inventory reservation failed");
        if let Err(e) = self.transition(order, cancel, "cancel").await {
            tracing::error!(order_id = %order.id, error = %e, "failed to cancel order after reservation failure");
        }

        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        SagaError::ReservationFailed {
            order_id: order.id,
            reason,
            compensation_failures,
        }
    }

    async fn confirm_payment(&self, order: Order, payment: PaymentResult) -> Result<Order> {
        let change = StatusChange::new(OrderStatus::Confirmed, SAGA_ACTOR, self.clock.now())
            .with_payment_status(PaymentStatus::Captured)
            .with_transaction_id(payment.transaction_id.clone())
            .with_note("payment captured");

        let confirmed = match self.transition(&order, change, "confirm payment for").await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                // The order moved on while the gateway was charging; give the
                // money back.
                tracing::error!(order_id = %order.id, error = %e, "order changed during payment, refunding");
                let mut log = CompensationLog::new();
                log.record(Compensation::RefundPayment {
                    transaction_id: payment.transaction_id,
                    amount: order.total_amount,
                });
                self.compensate(order.id, log).await;
                return Err(e);
            }
        };

        if let Err(reason) = self.commit_reservations(&confirmed).await {
            tracing::error!(order_id = %order.id, %reason, "stock lost after capture, cancelling order");
            metrics::counter!("saga_payments_reversed").increment(1);
            return self.cancel_order(order.id, &reason).await;
        }

        metrics::counter!("saga_payments_captured").increment(1);
        tracing::info!(
            order_id = %order.id,
            transaction_id = ?confirmed.transaction_id,
            "payment captured"
        );
        self.publisher
            .emit(
                topics::PAYMENT_EVENTS,
                &order.id.to_string(),
                topics::PAYMENT_SUCCESSFUL,
                &OrderPayload::new(&confirmed),
            )
            .await;
        Ok(confirmed)
    }

    async fn fail_payment(&self, order: Order, reason: String) -> Result<Order> {
        metrics::counter!("saga_payment_failures").increment(1);

        let failed = self
            .transition(
                &order,
                StatusChange::new(OrderStatus::PaymentFailed, SAGA_ACTOR, self.clock.now())
                    .with_payment_status(PaymentStatus::Failed)
                    .with_note(reason.clone()),
                "fail payment for",
            )
            .await?;

        let log = self.reservation_compensations(order.id).await;
        self.compensate(order.id, log).await;

        self.publisher
            .emit(
                topics::PAYMENT_EVENTS,
                &order.id.to_string(),
                topics::PAYMENT_FAILED,
                &OrderPayload::new(&failed).with_reason(&reason),
            )
            .await;
        Ok(failed)
    }

    /// Renews any hold of a pending order that lapsed or was released
    /// while it waited. Returns the reason if a line can no longer be held.
    async fn secure_holds(&self, order: &Order) -> std::result::Result<(), String> {
        let reservations = self
            .inventory_call(self.inventory.reservations_for_order(order.id))
            .await
            .map_err(|e| format!("could not verify reservations: {e}"))?;

        for lapsed in reservations.iter().filter(|r| {
            matches!(
                r.status,
                ReservationStatus::Expired | ReservationStatus::Cancelled
            )
        }) {
            self.renew_hold(order, lapsed).await?;
        }
        Ok(())
    }

    async fn renew_hold(
        &self,
        order: &Order,
        lapsed: &Reservation,
    ) -> std::result::Result<Reservation, String> {
        let quantity = u32::try_from(lapsed.quantity)
            .map_err(|_| format!("reservation {} has invalid quantity {}", lapsed.id, lapsed.quantity))?;
        let renewed = self
            .inventory_call(self.inventory.reserve(
                &lapsed.product_id,
                quantity,
                order.id,
                order.user_id,
            ))
            .await
            .map_err(|e| {
                format!(
                    "hold on {} lapsed and could not be renewed: {e}",
                    lapsed.product_id
                )
            })?;

        metrics::counter!("saga_reservations_renewed").increment(1);
        tracing::info!(
            order_id = %order.id,
            lapsed = %lapsed.id,
            renewed = %renewed.id,
            "reservation renewed"
        );
        self.note(
            order.id,
            format!(
                "reservation {} for {} lapsed, renewed as {}",
                lapsed.id, lapsed.product_id, renewed.id
            ),
        )
        .await;
        Ok(renewed)
    }

    /// Commits every pending hold of a paid order so the reaper cannot
    /// reclaim its stock.
    ///
    /// A hold that expired during the charge is renewed and committed. If
    /// that fails the order's stock is gone and the reason is returned.
    /// Other commit failures are recorded, not returned.
    async fn commit_reservations(&self, order: &Order) -> std::result::Result<(), String> {
        let order_id = order.id;
        let reservations = match self
            .inventory_call(self.inventory.reservations_for_order(order_id))
            .await
        {
            Ok(reservations) => reservations,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to load reservations to commit");
                self.note(order_id, format!("could not commit reservations: {e}"))
                    .await;
                return Ok(());
            }
        };

        for reservation in reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Pending)
        {
            match self.inventory_call(self.inventory.commit(reservation.id)).await {
                Ok(_) => {}
                Err(SagaError::Inventory(InventoryError::ReleaseAlreadyTerminal { .. })) => {
                    let renewed = self.renew_hold(order, reservation).await?;
                    self.inventory_call(self.inventory.commit(renewed.id))
                        .await
                        .map_err(|e| {
                            format!(
                                "renewed hold on {} could not be committed: {e}",
                                reservation.product_id
                            )
                        })?;
                }
                Err(e) => {
                    tracing::error!(
                        %order_id,
                        reservation_id = %reservation.id,
                        error = %e,
                        "failed to commit reservation"
                    );
                    self.note(
                        order_id,
                        format!(
                            "commit of reservation {} for {} failed: {e}",
                            reservation.id, reservation.product_id
                        ),
                    )
                    .await;
                }
            }
        }
        Ok(())
    }

    /// Builds the compensations that return an order's stock: pending holds
    /// are released and committed holds are restocked.
    async fn reservation_compensations(&self, order_id: OrderId) -> CompensationLog {
        match self.stock_compensations(order_id).await {
            Ok(log) => log,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to load reservations to compensate");
                self.note(order_id, format!("could not load reservations: {e}"))
                    .await;
                CompensationLog::new()
            }
        }
    }

    async fn stock_compensations(&self, order_id: OrderId) -> Result<CompensationLog> {
        let reservations = self
            .inventory_call(self.inventory.reservations_for_order(order_id))
            .await?;

        let mut log = CompensationLog::new();
        for reservation in reservations {
            match reservation.status {
                ReservationStatus::Pending => log.record(Compensation::ReleaseReservation {
                    reservation_id: reservation.id,
                    product_id: reservation.product_id,
                    quantity: reservation.quantity,
                }),
                ReservationStatus::Fulfilled => log.record(Compensation::Restock {
                    product_id: reservation.product_id,
                    quantity: reservation.quantity,
                }),
                ReservationStatus::Cancelled | ReservationStatus::Expired => {}
            }
        }
        Ok(log)
    }

    /// Runs compensations newest first. Every one is attempted; failures are
    /// logged, noted in the order history and returned.
    async fn compensate(&self, order_id: OrderId, log: CompensationLog) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        for compensation in log.unwind() {
            metrics::counter!("saga_compensations_total").increment(1);
            match self.apply_compensation(order_id, &compensation).await {
                Ok(()) => {
                    tracing::info!(
                        %order_id,
                        step = compensation.step(),
                        target = %compensation.target(),
                        "compensation applied"
                    );
                }
                Err(e) => {
                    metrics::counter!("saga_compensation_failures").increment(1);
                    tracing::error!(
                        %order_id,
                        step = compensation.step(),
                        target = %compensation.target(),
                        error = %e,
                        "compensation failed"
                    );
                    let failure = CompensationFailure {
                        step: compensation.step().to_string(),
                        target: compensation.target(),
                        error: e.to_string(),
                    };
                    self.note(order_id, format!("compensation {failure}")).await;
                    failures.push(failure);
                }
            }
        }
        failures
    }

    async fn apply_compensation(
        &self,
        order_id: OrderId,
        compensation: &Compensation,
    ) -> Result<()> {
        match compensation {
            Compensation::ReleaseReservation { reservation_id, .. } => {
                self.inventory_call(self.inventory.release(*reservation_id))
                    .await?;
            }
            Compensation::Restock {
                product_id,
                quantity,
            } => {
                let request =
                    AdjustmentRequest::new(product_id.clone(), *quantity, RESTOCK_REASON, SAGA_ACTOR)
                        .with_notes(format!("order {order_id}"));
                self.inventory_call(self.inventory.adjust(request)).await?;
            }
            Compensation::RefundPayment {
                transaction_id,
                amount,
            } => {
                let refund = self.refund(transaction_id, *amount).await?;
                self.orders
                    .set_payment_status(
                        order_id,
                        PaymentStatus::Refunded,
                        &format!("refund {} issued for {}", refund.refund_id, refund.amount),
                        SAGA_ACTOR,
                        self.clock.now(),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Appends a note to the order history, logging instead of failing.
    async fn note(&self, order_id: OrderId, note: String) {
        let status = match self.orders.get_order(order_id).await {
            Ok(Some(order)) => order.status,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to load order for history note");
                return;
            }
        };
        let entry = OrderHistory::note(order_id, status, note, SAGA_ACTOR, self.clock.now());
        if let Err(e) = self.orders.append_history(entry).await {
            tracing::error!(%order_id, error = %e, "failed to append history note");
        }
    }

    async fn inventory_call<T>(
        &self,
        call: impl Future<Output = inventory::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.inventory_timeout, call).await {
            Ok(result) => result.map_err(SagaError::from),
            Err(_) => {
                metrics::counter!("saga_inventory_timeouts").increment(1);
                Err(SagaError::InventoryTimeout(self.config.inventory_timeout))
            }
        }
    }

    async fn charge(
        &self,
        request: &PaymentRequest,
    ) -> std::result::Result<PaymentResult, PaymentGatewayError> {
        match tokio::time::timeout(
            self.config.payment_timeout,
            self.payments.process_payment(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PaymentGatewayError::Timeout(self.config.payment_timeout)),
        }
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> std::result::Result<RefundResult, PaymentGatewayError> {
        match tokio::time::timeout(
            self.config.payment_timeout,
            self.payments.refund(transaction_id, amount),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PaymentGatewayError::Timeout(self.config.payment_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ManualClock, ProductId};
    use events::InMemoryEventBus;
    use inventory::{EngineConfig, InMemoryInventoryStore, InventoryEngine, NewInventoryItem};
    use orders::{Address, InMemoryOrderStore};

    use crate::request::OrderLine;
    use crate::services::{InMemoryCartStore, InMemoryPaymentGateway};

    type TestSaga = OrderSaga<InMemoryOrderStore, Arc<InventoryEngine<InMemoryInventoryStore>>>;

    async fn setup() -> (TestSaga, InMemoryEventBus) {
        let bus = InMemoryEventBus::new();
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let engine = InventoryEngine::new(
            InMemoryInventoryStore::new(),
            Arc::new(bus.clone()),
            clock.clone(),
            EngineConfig::default(),
        );
        engine
            .create_item(NewInventoryItem {
                product_id: ProductId::new("SKU-001"),
                sku: "SKU-001".to_string(),
                quantity: 10,
                reorder_level: 2,
                reorder_quantity: 10,
                location: String::new(),
            })
            .await
            .unwrap();

        let saga = OrderSaga::new(
            InMemoryOrderStore::new(),
            Arc::new(engine),
            Arc::new(InMemoryPaymentGateway::new()),
            Arc::new(InMemoryCartStore::new()),
            Arc::new(bus.clone()),
        )
        .with_clock(clock);
        (saga, bus)
    }

    fn request(quantity: u32) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: UserId::new(),
            items: vec![OrderLine {
                product_id: ProductId::new("SKU-001"),
                name: "Widget".to_string(),
                unit_price: Money::from_cents(1_000),
                quantity,
            }],
            payment_method: Default::default(),
            shipping_address: Address::default(),
            billing_address: None,
            discount: Money::zero(),
        }
    }

    #[tokio::test]
    async fn test_create_order_reserves_and_publishes() {
        let (saga, bus) = setup().await;

        let details = saga.create_order(request(3)).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Pending);
        assert_eq!(details.order.total_amount, Money::from_cents(3_000));
        assert_eq!(details.items[0].sku, "SKU-001");
        assert_eq!(details.history.len(), 1);

        assert_eq!(bus.events_of_type(topics::ORDER_CREATED).await.len(), 1);
        assert_eq!(bus.events_of_type(topics::INVENTORY_RESERVED).await.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_stock_persists_nothing() {
        let (saga, _) = setup().await;

        let result = saga.create_order(request(11)).await;
        assert!(matches!(
            result,
            Err(SagaError::InsufficientInventory {
                requested: 11,
                available: 10,
                ..
            })
        ));
        assert_eq!(saga.orders().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (saga, _) = setup().await;
        let result = saga.process_payment(OrderId::new()).await;
        assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let (saga, bus) = setup().await;
        let order_id = saga.create_order(request(1)).await.unwrap().order.id;

        saga.process_payment(order_id).await.unwrap();
        saga.start_processing(order_id).await.unwrap();
        saga.mark_shipped(order_id).await.unwrap();
        let delivered = saga.mark_delivered(order_id).await.unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        let types = bus.event_types().await;
        for expected in [
            topics::ORDER_CREATED,
            topics::PAYMENT_SUCCESSFUL,
            topics::ORDER_PROCESSING,
            topics::ORDER_SHIPPED,
            topics::ORDER_DELIVERED,
        ] {
            assert!(types.iter().any(|t| t == expected), "missing {expected}");
        }
    }
}
