//! Shared test doubles: a programmable trading API and a stub signer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use predict_mm::{
    ApiError, EngineConfig, MarketInfo, OpenOrder, OrderBook, OrderSigningRequest, OutcomeInfo,
    PlacedOrder, RepriceConfig, RetryConfig, SignedOrderPayload, Signer, SignerError, TokenSettings,
    TradingApi,
};

/// Trading API double. Responses are popped from per-operation queues;
/// an empty queue yields success with a generated order id.
#[derive(Default)]
pub struct MockApi {
    pub place_results: Mutex<VecDeque<Result<PlacedOrder, ApiError>>>,
    pub cancel_results: Mutex<VecDeque<Result<(), ApiError>>>,
    pub open_orders: Mutex<Vec<OpenOrder>>,
    pub place_calls: AtomicU32,
    pub cancel_calls: AtomicU32,
    pub list_calls: AtomicU32,
    /// Every batch of ids passed to cancel_orders, in call order.
    pub cancelled_ids: Mutex<Vec<Vec<String>>>,
    /// Tokens installed via set_auth_token.
    pub auth_tokens: Mutex<Vec<String>>,
    /// Artificial latency on place_order, for in-flight guard tests.
    pub place_delay: Mutex<Duration>,
    next_id: AtomicU64,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_place(&self, result: Result<PlacedOrder, ApiError>) {
        self.place_results.lock().push_back(result);
    }

    pub fn queue_cancel(&self, result: Result<(), ApiError>) {
        self.cancel_results.lock().push_back(result);
    }

    pub fn set_place_delay(&self, delay: Duration) {
        *self.place_delay.lock() = delay;
    }

    pub fn http(status: u16, body: &str) -> ApiError {
        ApiError::Http {
            status,
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl TradingApi for MockApi {
    async fn place_order(&self, _payload: &SignedOrderPayload) -> Result<PlacedOrder, ApiError> {
        let delay = *self.place_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.place_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(result) = self.place_results.lock().pop_front() {
            return result;
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PlacedOrder {
            id: format!("order-{n}"),
        })
    }

    async fn cancel_orders(&self, order_ids: &[String]) -> Result<(), ApiError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancelled_ids.lock().push(order_ids.to_vec());

        if let Some(result) = self.cancel_results.lock().pop_front() {
            return result;
        }
        Ok(())
    }

    async fn list_open_orders(&self, _market_id: &str) -> Result<Vec<OpenOrder>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.open_orders.lock().clone())
    }

    fn set_auth_token(&self, token: &str) {
        self.auth_tokens.lock().push(token.to_string());
    }
}

/// Signer double producing a fixed payload shape.
#[derive(Default)]
pub struct MockSigner {
    pub sign_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub fail_refresh: std::sync::atomic::AtomicBool,
}

impl MockSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn sign_order(
        &self,
        request: &OrderSigningRequest,
    ) -> Result<SignedOrderPayload, SignerError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignedOrderPayload {
            salt: "1".to_string(),
            maker: "0xmaker".to_string(),
            signer: "0xsigner".to_string(),
            taker: "0x0".to_string(),
            token_id: request.token_id.clone(),
            maker_amount: "0".to_string(),
            taker_amount: "0".to_string(),
            expiration: "0".to_string(),
            nonce: "0".to_string(),
            fee_rate_bps: request.fee_rate_bps.to_string(),
            side: 0,
            signature_type: 0,
            signature: "0xsig".to_string(),
            hash: format!("0xhash-{}", request.token_id),
            price_per_share: "0".to_string(),
        })
    }

    async fn refresh_auth_token(&self) -> Result<String, SignerError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            Err(SignerError::Refresh("refresh rejected".to_string()))
        } else {
            Ok("fresh-token".to_string())
        }
    }
}

/// Market metadata with standard Yes/No outcomes.
pub fn market_info(market_id: &str) -> MarketInfo {
    MarketInfo {
        market_id: market_id.to_string(),
        title: None,
        outcomes: vec![
            OutcomeInfo {
                name: "Yes".to_string(),
                token_id: "token-yes".to_string(),
            },
            OutcomeInfo {
                name: "No".to_string(),
                token_id: "token-no".to_string(),
            },
        ],
        fee_rate_bps: 200,
        is_neg_risk: false,
        is_yield_bearing: true,
        decimal_precision: 3,
    }
}

/// Retry policy with millisecond delays so tests run fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        network_retry_delay: Duration::from_millis(5),
        rate_limit_first_delay: Duration::from_millis(10),
        rate_limit_second_delay: Duration::from_millis(20),
        collateral_settle_delay: Duration::from_millis(5),
        list_orders_retry_delay: Duration::from_millis(10),
        ..RetryConfig::default()
    }
}

/// Re-pricing config with a millisecond settle delay.
pub fn fast_reprice() -> RepriceConfig {
    RepriceConfig {
        settle_delay: Duration::from_millis(5),
    }
}

/// Engine config with all the fast timings above.
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        retry: fast_retry(),
        reprice: fast_reprice(),
        ..EngineConfig::default()
    }
}

/// Settings that quote both sides of `deep_book` immediately.
pub fn quoting_settings() -> TokenSettings {
    TokenSettings {
        min_liquidity_usdt: Decimal::from(100),
        ..TokenSettings::default()
    }
}

/// A book deep enough on both sides for the default quote to be placeable.
pub fn deep_book(market_id: &str) -> OrderBook {
    OrderBook::from_levels(
        market_id,
        vec![
            (Decimal::new(50, 2), Decimal::from(10_000)),
            (Decimal::new(49, 2), Decimal::from(10_000)),
        ],
        vec![
            (Decimal::new(52, 2), Decimal::from(10_000)),
            (Decimal::new(53, 2), Decimal::from(10_000)),
        ],
    )
}

/// Polls `condition` every few milliseconds until it holds or the timeout
/// elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
