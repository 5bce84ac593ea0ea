//! Engine configuration.
//!
//! Every constant the venue imposes (retry schedules, settle delays, the
//! stale-mid epsilon) lives here with the production default, so tests and
//! operators can shrink delays without touching engine code.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Default REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.predict.fun";
/// Default WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws.predict.fun/ws";

/// Trading REST API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

/// Market-data feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    /// Optional api key appended as a query parameter.
    pub api_key: Option<String>,
    /// Connection attempt timeout.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// First reconnect delay; doubles up to the max.
    #[serde(with = "duration_secs")]
    pub reconnect_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_reconnect_delay: Duration,
    /// Book update channel capacity.
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            buffer_size: 1024,
        }
    }
}

/// Retry and reconciliation policy for place/cancel calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Hard attempt ceiling per action.
    pub max_attempts: u32,
    /// Delay before retrying a network error or 5xx.
    #[serde(with = "duration_secs")]
    pub network_retry_delay: Duration,
    /// Fixed 429 schedule: first delay, then second for every later attempt.
    #[serde(with = "duration_secs")]
    pub rate_limit_first_delay: Duration,
    #[serde(with = "duration_secs")]
    pub rate_limit_second_delay: Duration,
    /// Wait after cancelling conflicting orders before the collateral retry.
    #[serde(with = "duration_secs")]
    pub collateral_settle_delay: Duration,
    /// Delay between attempts when listing open orders times out.
    #[serde(with = "duration_secs")]
    pub list_orders_retry_delay: Duration,
    /// Mid-price move that invalidates resting orders in the batch path.
    pub mid_price_epsilon: Decimal,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            network_retry_delay: Duration::from_secs(1),
            rate_limit_first_delay: Duration::from_secs(30),
            rate_limit_second_delay: Duration::from_secs(65),
            collateral_settle_delay: Duration::from_secs(1),
            list_orders_retry_delay: Duration::from_secs(30),
            mid_price_epsilon: dec!(0.0001),
        }
    }
}

impl RetryConfig {
    /// 429 backoff for the given attempt number (1-based).
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            self.rate_limit_first_delay
        } else {
            self.rate_limit_second_delay
        }
    }
}

/// Auto-spread re-pricing protocol configuration.
///
/// A re-priced order whose new price is within one tick of the old one is
/// rejected without configuration; that threshold comes from the market's
/// price grid, not from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepriceConfig {
    /// Wait after the cancel so the book reflects it before re-walking.
    #[serde(with = "duration_secs")]
    pub settle_delay: Duration,
}

impl Default for RepriceConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub reprice: RepriceConfig,
    /// Lock timeout for the controller's state reads.
    #[serde(default = "default_read_lock_timeout", with = "duration_millis")]
    pub read_lock_timeout: Duration,
}

fn default_read_lock_timeout() -> Duration {
    Duration::from_millis(100)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            feed: FeedConfig::default(),
            retry: RetryConfig::default(),
            reprice: RepriceConfig::default(),
            read_lock_timeout: default_read_lock_timeout(),
        }
    }
}

mod duration_secs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

mod duration_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.network_retry_delay, Duration::from_secs(1));
        assert_eq!(retry.rate_limit_delay(1), Duration::from_secs(30));
        assert_eq!(retry.rate_limit_delay(2), Duration::from_secs(65));
        assert_eq!(retry.rate_limit_delay(3), Duration::from_secs(65));
    }

    #[test]
    fn test_engine_config_roundtrip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(back.feed.url, DEFAULT_WS_URL);
        assert_eq!(back.retry.max_attempts, 3);
        assert_eq!(back.reprice.settle_delay, Duration::from_secs(1));
        assert_eq!(back.read_lock_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.read_lock_timeout, Duration::from_millis(100));
    }
}
