//! REST implementation of the trading API.

use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, OpenOrder, PlacedOrder, TradingApi};
use crate::config::ApiConfig;
use crate::signer::SignedOrderPayload;

/// Longest error-body prefix kept in `ApiError::Http`.
const MAX_ERROR_BODY: usize = 500;

/// Per-request timeouts. Placement waits longer because the exchange
/// validates the signature on-chain state before answering.
const PLACE_TIMEOUT: Duration = Duration::from_secs(30);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct PlaceOrderBody<'a> {
    data: PlaceOrderData<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderData<'a> {
    price_per_share: &'a str,
    strategy: &'static str,
    slippage_bps: &'static str,
    order: &'a SignedOrderPayload,
}

#[derive(Deserialize)]
struct PlaceOrderResponse {
    success: bool,
    #[serde(default)]
    data: Option<PlacedOrderData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrderData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
}

#[derive(Serialize)]
struct CancelOrdersBody {
    data: CancelOrdersData,
}

#[derive(Serialize)]
struct CancelOrdersData {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct CancelOrdersResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ListOrdersResponse {
    success: bool,
    #[serde(default)]
    data: Vec<OpenOrder>,
}

/// reqwest-backed client for the exchange's order endpoints.
pub struct RestTradingApi {
    client: Client,
    base_url: String,
    api_key: String,
    jwt_token: RwLock<String>,
}

impl RestTradingApi {
    pub fn new(config: &ApiConfig, api_key: String, jwt_token: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(PLACE_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            jwt_token: RwLock::new(jwt_token),
        })
    }

    fn auth_headers(&self) -> [(&'static str, String); 2] {
        [
            ("x-api-key", self.api_key.clone()),
            (
                "Authorization",
                format!("Bearer {}", self.jwt_token.read()),
            ),
        ]
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let [(k1, v1), (k2, v2)] = self.auth_headers();
        builder.header(k1, v1).header(k2, v2)
    }

    async fn error_from_response(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        ApiError::Http { status, body }
    }

    fn transport_error(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl TradingApi for RestTradingApi {
    async fn place_order(&self, payload: &SignedOrderPayload) -> Result<PlacedOrder, ApiError> {
        let body = PlaceOrderBody {
            data: PlaceOrderData {
                price_per_share: &payload.price_per_share,
                strategy: "LIMIT",
                slippage_bps: "0",
                order: payload,
            },
        };

        let response = self
            .request(self.client.post(format!("{}/v1/orders", self.base_url)))
            .timeout(PLACE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: PlaceOrderResponse = response
            .json()
            .await
            .map_err(Self::transport_error)?;

        if !parsed.success {
            // Logical rejection inside a 200: terminal, not retryable.
            return Err(ApiError::Http {
                status: 200,
                body: parsed.message.unwrap_or_else(|| "order rejected".to_string()),
            });
        }

        let id = parsed
            .data
            .and_then(|d| d.id.or(d.order_id))
            .ok_or_else(|| ApiError::Http {
                status: 200,
                body: "order accepted but no id returned".to_string(),
            })?;

        debug!(order_id = %id, "order placed");
        Ok(PlacedOrder { id })
    }

    async fn cancel_orders(&self, order_ids: &[String]) -> Result<(), ApiError> {
        let body = CancelOrdersBody {
            data: CancelOrdersData {
                ids: order_ids.to_vec(),
            },
        };

        let response = self
            .request(self.client.post(format!("{}/v1/orders/remove", self.base_url)))
            .timeout(CANCEL_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: CancelOrdersResponse = response
            .json()
            .await
            .map_err(Self::transport_error)?;

        if !parsed.success {
            return Err(ApiError::Http {
                status: 200,
                body: parsed
                    .message
                    .unwrap_or_else(|| "cancel rejected".to_string()),
            });
        }

        Ok(())
    }

    async fn list_open_orders(&self, market_id: &str) -> Result<Vec<OpenOrder>, ApiError> {
        let response = self
            .request(self.client.get(format!("{}/v1/orders", self.base_url)))
            .timeout(LIST_TIMEOUT)
            .query(&[
                ("status", "OPEN"),
                ("first", "100"),
                ("marketId", market_id),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: ListOrdersResponse = response
            .json()
            .await
            .map_err(Self::transport_error)?;

        if !parsed.success {
            return Ok(Vec::new());
        }

        // The market filter is also applied client-side in case the server
        // ignores the query parameter.
        Ok(parsed
            .data
            .into_iter()
            .filter(|order| order.market_id == market_id)
            .collect())
    }

    fn set_auth_token(&self, token: &str) {
        *self.jwt_token.write() = token.to_string();
    }
}
