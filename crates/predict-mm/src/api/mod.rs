//! Trading API boundary: place, cancel, and list open orders.
//!
//! The engine only needs three operations against the exchange. Errors
//! carry the HTTP status and response body so the order manager can
//! distinguish rate-limit, auth-expiry, and collateral conditions without
//! string-matching at every call site.

mod rest;

pub use rest::RestTradingApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signer::SignedOrderPayload;

/// Errors from the trading API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The exchange answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never completed (connection failure, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl ApiError {
    /// Transport-level failure: retry after a short delay.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout(_))
    }

    /// 5xx from the exchange: retry after a short delay.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if *status >= 500)
    }

    /// 429: retry on the long fixed schedule.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if *status == 429)
    }

    /// 404: on cancel this means the order is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if *status == 404)
    }

    /// 401 with the venue's expired-token marker: refresh and retry once.
    pub fn is_invalid_token(&self) -> bool {
        match self {
            ApiError::Http { status: 401, body } => body.contains("Invalid JWT"),
            _ => false,
        }
    }

    /// 400 reporting frozen collateral: triggers the reconciliation path.
    pub fn is_insufficient_collateral(&self) -> bool {
        match self {
            ApiError::Http { status: 400, body } => {
                body.contains("Insufficient collateral")
                    || body.contains("CollateralPerMarketExceededError")
            }
            _ => false,
        }
    }
}

/// A successfully placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    /// Exchange-assigned order id.
    pub id: String,
}

/// An open order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub id: String,
    pub market_id: String,
}

/// The three trading operations the engine performs.
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Submits a signed limit order. Returns the exchange-assigned id.
    async fn place_order(&self, payload: &SignedOrderPayload) -> Result<PlacedOrder, ApiError>;

    /// Cancels the given orders. A 404 surfaces as `ApiError::Http` so the
    /// caller can treat already-gone orders as success.
    async fn cancel_orders(&self, order_ids: &[String]) -> Result<(), ApiError>;

    /// Lists this market's open orders (used by collateral reconciliation).
    async fn list_open_orders(&self, market_id: &str) -> Result<Vec<OpenOrder>, ApiError>;

    /// Installs a freshly refreshed auth token for subsequent requests.
    fn set_auth_token(&self, token: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> ApiError {
        ApiError::Http {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classifiers() {
        assert!(http(500, "").is_server_error());
        assert!(http(503, "").is_server_error());
        assert!(!http(400, "").is_server_error());

        assert!(http(429, "").is_rate_limited());
        assert!(http(404, "").is_not_found());

        assert!(ApiError::Network("reset".to_string()).is_transport());
        assert!(ApiError::Timeout("30s".to_string()).is_transport());
        assert!(!http(500, "").is_transport());
    }

    #[test]
    fn test_invalid_token_requires_marker() {
        assert!(http(401, r#"{"message":"Invalid JWT"}"#).is_invalid_token());
        assert!(!http(401, "forbidden").is_invalid_token());
        assert!(!http(403, "Invalid JWT").is_invalid_token());
    }

    #[test]
    fn test_insufficient_collateral_markers() {
        assert!(http(400, "Insufficient collateral for order").is_insufficient_collateral());
        assert!(http(400, "CollateralPerMarketExceededError").is_insufficient_collateral());
        assert!(!http(400, "bad request").is_insufficient_collateral());
        assert!(!http(409, "Insufficient collateral").is_insufficient_collateral());
    }
}
