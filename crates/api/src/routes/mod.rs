//! HTTP route handlers.

pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;

use std::str::FromStr;

use serde::Deserialize;

use crate::error::ApiError;

/// `?limit=&offset=` query parameters for list endpoints.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Pagination {
    /// Clamps the limit to `1..=100` and the offset to non-negative.
    pub fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}

/// Parses a UUID-backed identifier from a path segment.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} format: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;

    #[test]
    fn test_pagination_bounds() {
        let page = Pagination {
            limit: 1_000,
            offset: -5,
        };
        assert_eq!(page.bounds(), (100, 0));

        let page = Pagination {
            limit: 0,
            offset: 40,
        };
        assert_eq!(page.bounds(), (1, 40));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        let id = OrderId::new();
        let parsed: OrderId = parse_id(&id.to_string(), "order ID").unwrap();
        assert_eq!(parsed, id);

        let err = parse_id::<OrderId>("not-a-uuid", "order ID").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.starts_with("Invalid order ID")));
    }
}
