//! Inventory endpoints: stock lookups, holds and manual adjustments.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{InventoryItemId, OrderId, ProductId, ReservationId, UserId};
use inventory::{
    AdjustmentRequest, InventoryAdjustment, InventoryItem, InventoryStore, ItemUpdate,
    NewInventoryItem, Reservation,
};
use orders::OrderStore;
use serde::Deserialize;

use super::{Pagination, parse_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub quantity: u32,
    pub order_id: OrderId,
    pub customer_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
    pub reason: String,
    pub adjusted_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentQuery {
    #[serde(default = "default_adjustment_limit")]
    pub limit: i64,
}

fn default_adjustment_limit() -> i64 {
    50
}

/// POST /inventory: onboards a product.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn create<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Json(req): Json<NewInventoryItem>,
) -> Result<(StatusCode, Json<InventoryItem>), ApiError> {
    let item = state.inventory.create_item(req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /inventory: all items, ordered by product ID.
#[tracing::instrument(skip(state))]
pub async fn list<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    let (limit, offset) = page.bounds();
    Ok(Json(state.inventory.list_items(limit, offset).await?))
}

/// GET /inventory/low-stock: items at or below their reorder level.
#[tracing::instrument(skip(state))]
pub async fn low_stock<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    Ok(Json(state.inventory.get_low_stock_items().await?))
}

/// GET /inventory/out-of-stock
#[tracing::instrument(skip(state))]
pub async fn out_of_stock<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    Ok(Json(state.inventory.get_out_of_stock_items().await?))
}

/// GET /inventory/items/{id}
#[tracing::instrument(skip(state))]
pub async fn get_item<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<InventoryItem>, ApiError> {
    let item_id: InventoryItemId = parse_id(&id, "inventory item ID")?;
    Ok(Json(state.inventory.get_item(item_id).await?))
}

/// PATCH /inventory/items/{id}: changes reorder settings or location.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
    Json(req): Json<ItemUpdate>,
) -> Result<Json<InventoryItem>, ApiError> {
    let item_id: InventoryItemId = parse_id(&id, "inventory item ID")?;
    Ok(Json(state.inventory.update_item(item_id, req).await?))
}

/// GET /inventory/sku/{sku}
#[tracing::instrument(skip(state))]
pub async fn get_by_sku<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(sku): Path<String>,
) -> Result<Json<InventoryItem>, ApiError> {
    Ok(Json(state.inventory.get_by_sku(&sku).await?))
}

/// GET /inventory/products/{product_id}
#[tracing::instrument(skip(state))]
pub async fn get_by_product<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryItem>, ApiError> {
    let product_id = ProductId::from(product_id);
    Ok(Json(state.inventory.get_by_product_id(&product_id).await?))
}

/// POST /inventory/products/{product_id}/reservations: places a hold.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, quantity = req.quantity))]
pub async fn reserve<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(product_id): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let product_id = ProductId::from(product_id);
    let reservation = state
        .inventory
        .reserve(&product_id, req.quantity, req.order_id, req.customer_id)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// POST /inventory/products/{product_id}/adjustments: changes on-hand stock.
#[tracing::instrument(skip(state, req), fields(delta = req.delta))]
pub async fn adjust<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(product_id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<InventoryItem>, ApiError> {
    let mut request = AdjustmentRequest::new(product_id, req.delta, req.reason, req.adjusted_by);
    if let Some(notes) = req.notes {
        request = request.with_notes(notes);
    }
    Ok(Json(state.inventory.adjust(request).await?))
}

/// GET /inventory/products/{product_id}/adjustments: audit trail, newest first.
#[tracing::instrument(skip(state))]
pub async fn adjustments<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(product_id): Path<String>,
    Query(query): Query<AdjustmentQuery>,
) -> Result<Json<Vec<InventoryAdjustment>>, ApiError> {
    let product_id = ProductId::from(product_id);
    let limit = query.limit.clamp(1, 500);
    Ok(Json(
        state
            .inventory
            .adjustments_for_product(&product_id, limit)
            .await?,
    ))
}

/// GET /inventory/reservations/{id}
#[tracing::instrument(skip(state))]
pub async fn get_reservation<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, ApiError> {
    let reservation_id: ReservationId = parse_id(&id, "reservation ID")?;
    Ok(Json(state.inventory.get_reservation(reservation_id).await?))
}

/// DELETE /inventory/reservations/{id}: releases a pending hold.
#[tracing::instrument(skip(state))]
pub async fn release<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, ApiError> {
    let reservation_id: ReservationId = parse_id(&id, "reservation ID")?;
    Ok(Json(
        state.inventory.release_reservation(reservation_id).await?,
    ))
}

/// POST /inventory/reservations/{id}/commit: converts a hold into a sale.
#[tracing::instrument(skip(state))]
pub async fn commit<O: OrderStore + 'static, S: InventoryStore + 'static>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, ApiError> {
    let reservation_id: ReservationId = parse_id(&id, "reservation ID")?;
    Ok(Json(
        state.inventory.commit_reservation(reservation_id).await?,
    ))
}
