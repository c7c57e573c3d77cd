//! Order checkout and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, UserId};
use inventory::InventoryStore;
use orders::{Order, OrderDetails, OrderStore};
use saga::CreateOrderRequest;
use serde::Deserialize;

use super::{Pagination, parse_id};
use crate::AppState;
use crate::error::ApiError;

/// Body for cancel and refund requests.
#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

/// POST /orders: runs checkout and returns the pending order.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id, lines = req.items.len()))]
pub async fn create<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError> {
    let details = state.saga.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /orders/{id}: order with items and status history.
#[tracing::instrument(skip(state))]
pub async fn get<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.get_order(order_id).await?))
}

/// GET /users/{id}/orders: a user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_for_user<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id: UserId = parse_id(&id, "user ID")?;
    let (limit, offset) = page.bounds();
    Ok(Json(
        state.saga.get_user_orders(user_id, limit, offset).await?,
    ))
}

/// POST /orders/{id}/payment: charges the order.
///
/// A declined or timed-out charge is not an HTTP error: the order comes
/// back in `payment_failed` with its reservations released.
#[tracing::instrument(skip(state))]
pub async fn pay<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.process_payment(order_id).await?))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.cancel_order(order_id, &req.reason).await?))
}

/// POST /orders/{id}/process
#[tracing::instrument(skip(state))]
pub async fn process<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.start_processing(order_id).await?))
}

/// POST /orders/{id}/ship
#[tracing::instrument(skip(state))]
pub async fn ship<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.mark_shipped(order_id).await?))
}

/// POST /orders/{id}/deliver
#[tracing::instrument(skip(state))]
pub async fn deliver<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.mark_delivered(order_id).await?))
}

/// POST /orders/{id}/refund: refunds a captured payment.
#[tracing::instrument(skip(state, req))]
pub async fn refund<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order ID")?;
    Ok(Json(state.saga.refund_order(order_id, &req.reason).await?))
}
