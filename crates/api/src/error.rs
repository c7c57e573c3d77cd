//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use orders::OrderStoreError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Saga execution error.
    #[error(transparent)]
    Saga(#[from] SagaError),
    /// Inventory engine error.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({});
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => {
                if let SagaError::ReservationFailed {
                    compensation_failures,
                    ..
                } = &err
                    && !compensation_failures.is_empty()
                {
                    body["compensation_failures"] =
                        serde_json::to_value(compensation_failures).unwrap_or_default();
                }
                (saga_status(&err), err.to_string())
            }
            ApiError::Inventory(err) => (inventory_status(&err), err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, status = status.as_u16(), "request failed");
        }
        metrics::counter!("api_errors_total", "status" => status.as_str().to_owned()).increment(1);

        body["error"] = serde_json::Value::String(message);
        (status, axum::Json(body)).into_response()
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::OrderNotFound(_) | SagaError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InvalidOrderState { .. }
        | SagaError::InsufficientInventory { .. }
        | SagaError::ReservationFailed { .. } => StatusCode::CONFLICT,
        SagaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SagaError::PaymentGateway(_) | SagaError::InventoryTimeout(_) => StatusCode::BAD_GATEWAY,
        SagaError::Inventory(inner) => inventory_status(inner),
        SagaError::OrderStore(inner) => order_store_status(inner),
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::ProductNotFound(_)
        | InventoryError::ItemNotFound(_)
        | InventoryError::SkuNotFound(_)
        | InventoryError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. }
        | InventoryError::ReleaseAlreadyTerminal { .. }
        | InventoryError::DuplicateProduct(_) => StatusCode::CONFLICT,
        InventoryError::InvalidQuantity(_) | InventoryError::InvalidData(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn order_store_status(err: &OrderStoreError) -> StatusCode {
    match err {
        OrderStoreError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderStoreError::InvalidStateTransition { .. } | OrderStoreError::StatusConflict { .. } => {
            StatusCode::CONFLICT
        }
        OrderStoreError::AmountMismatch { .. } | OrderStoreError::InvalidData(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, ProductId, ReservationId};
    use inventory::ReservationStatus;
    use orders::OrderStatus;
    use saga::PaymentGatewayError;

    #[test]
    fn test_saga_error_status_codes() {
        let order_id = OrderId::new();
        assert_eq!(
            saga_status(&SagaError::OrderNotFound(order_id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            saga_status(&SagaError::InvalidOrderState {
                order_id,
                status: OrderStatus::Confirmed,
                operation: "pay",
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            saga_status(&SagaError::InvalidRequest("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            saga_status(&SagaError::PaymentGateway(PaymentGatewayError::Declined(
                "card declined".into()
            ))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_inventory_error_status_codes() {
        assert_eq!(
            inventory_status(&InventoryError::ProductNotFound(ProductId::new("nope"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            inventory_status(&InventoryError::SkuNotFound("LAPTOP-404".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            inventory_status(&InventoryError::ReleaseAlreadyTerminal {
                reservation_id: ReservationId::new(),
                status: ReservationStatus::Cancelled,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            inventory_status(&InventoryError::InvalidQuantity(0)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_wrapped_store_errors_keep_their_status() {
        let err = SagaError::Inventory(InventoryError::ReservationNotFound(ReservationId::new()));
        assert_eq!(saga_status(&err), StatusCode::NOT_FOUND);

        let err = SagaError::OrderStore(OrderStoreError::InvalidData("bad row".into()));
        assert_eq!(saga_status(&err), StatusCode::BAD_REQUEST);
    }
}
