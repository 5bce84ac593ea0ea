//! Order book and market metadata types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use predict_common::{Outcome, OrderBookLevel, TokenPair};

/// Configuration errors: bad or missing market metadata and settings.
///
/// These are never retried; they indicate the market cannot be quoted
/// until the caller fixes its inputs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("market metadata has no outcomes")]
    MissingOutcomes,

    #[error("market metadata has {0} outcomes, need at least 2")]
    TooFewOutcomes(usize),

    #[error("outcome '{0}' has no token id")]
    MissingTokenId(String),

    #[error("neither position_size_usdt nor position_size_shares is set")]
    PositionSizeUnset,
}

/// Full depth snapshot for the Yes outcome of one market.
///
/// `bids` are sorted descending by price (best bid first), `asks` ascending
/// (best ask first). No depth is derived via `no_price = 1 - yes_price`.
/// Snapshots are immutable once received and replaced wholesale by the next
/// update for the same market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Market this book belongs to.
    pub market_id: String,
    /// Resting buy orders, best (highest) price first.
    pub bids: Vec<OrderBookLevel>,
    /// Resting sell orders, best (lowest) price first.
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Builds a snapshot from raw (price, size) pairs, preserving order.
    pub fn from_levels(
        market_id: impl Into<String>,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            bids: bids
                .into_iter()
                .map(|(p, s)| OrderBookLevel::new(p, s))
                .collect(),
            asks: asks
                .into_iter()
                .map(|(p, s)| OrderBookLevel::new(p, s))
                .collect(),
        }
    }

    /// Best bid price, if any.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price, if any.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price for the Yes outcome: (best bid + best ask) / 2.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// True when either side of the book is empty.
    pub fn has_empty_side(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }
}

/// One outcome entry in market metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeInfo {
    /// Display name, e.g. "Yes" / "No".
    pub name: String,
    /// On-chain token identifier for this outcome.
    #[serde(rename = "onChainId")]
    pub token_id: String,
}

/// Per-market metadata supplied once at controller start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub market_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<OutcomeInfo>,
    /// Fee rate in basis points.
    #[serde(default = "default_fee_rate_bps")]
    pub fee_rate_bps: u32,
    /// Negative-risk market flag, passed through to order signing.
    #[serde(default)]
    pub is_neg_risk: bool,
    /// Yield-bearing collateral flag, passed through to order signing.
    #[serde(default = "default_is_yield_bearing")]
    pub is_yield_bearing: bool,
    /// Number of decimal places in the market's price grid (2 or 3).
    #[serde(default = "default_decimal_precision")]
    pub decimal_precision: u32,
}

fn default_fee_rate_bps() -> u32 {
    200
}

fn default_is_yield_bearing() -> bool {
    true
}

fn default_decimal_precision() -> u32 {
    3
}

impl MarketInfo {
    /// Human-readable label for log lines: title when present, else the id.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.market_id)
    }

    /// Resolves the on-chain token pair from the outcome list.
    ///
    /// Matches outcome names case-insensitively ("yes"/"y", "no"/"n"),
    /// falling back to positional order (index 0 = Yes, index 1 = No) when
    /// a name does not match. Built once per market so the hot path never
    /// does string matching.
    pub fn resolve_tokens(&self) -> Result<TokenPair, ConfigError> {
        if self.outcomes.is_empty() {
            return Err(ConfigError::MissingOutcomes);
        }
        if self.outcomes.len() < 2 {
            return Err(ConfigError::TooFewOutcomes(self.outcomes.len()));
        }

        let yes = self.find_outcome(Outcome::Yes)?;
        let no = self.find_outcome(Outcome::No)?;
        Ok(TokenPair::new(yes, no))
    }

    fn find_outcome(&self, outcome: Outcome) -> Result<&str, ConfigError> {
        let wanted = match outcome {
            Outcome::Yes => ["yes", "y"],
            Outcome::No => ["no", "n"],
        };

        let by_name = self.outcomes.iter().find(|info| {
            let name = info.name.to_lowercase();
            wanted.contains(&name.as_str())
        });

        // Positional fallback when the venue uses non-standard names.
        let fallback_index = match outcome {
            Outcome::Yes => 0,
            Outcome::No => 1,
        };
        let info = by_name.or_else(|| self.outcomes.get(fallback_index));

        match info {
            Some(info) if !info.token_id.is_empty() => Ok(&info.token_id),
            Some(info) => Err(ConfigError::MissingTokenId(info.name.clone())),
            None => Err(ConfigError::TooFewOutcomes(self.outcomes.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> OrderBook {
        OrderBook::from_levels("market-1", bids, asks)
    }

    fn info_with_outcomes(outcomes: Vec<OutcomeInfo>) -> MarketInfo {
        MarketInfo {
            market_id: "market-1".to_string(),
            title: None,
            outcomes,
            fee_rate_bps: 200,
            is_neg_risk: false,
            is_yield_bearing: true,
            decimal_precision: 3,
        }
    }

    fn outcome(name: &str, token: &str) -> OutcomeInfo {
        OutcomeInfo {
            name: name.to_string(),
            token_id: token.to_string(),
        }
    }

    // =========================================================================
    // OrderBook Tests
    // =========================================================================

    #[test]
    fn test_best_bid_ask_and_mid() {
        let book = book(
            vec![(dec!(0.50), dec!(100)), (dec!(0.49), dec!(50))],
            vec![(dec!(0.52), dec!(100)), (dec!(0.53), dec!(50))],
        );

        assert_eq!(book.best_bid(), Some(dec!(0.50)));
        assert_eq!(book.best_ask(), Some(dec!(0.52)));
        assert_eq!(book.mid_price(), Some(dec!(0.51)));
        assert!(!book.has_empty_side());
    }

    #[test]
    fn test_empty_side() {
        let no_bids = book(vec![], vec![(dec!(0.52), dec!(100))]);
        assert!(no_bids.has_empty_side());
        assert_eq!(no_bids.mid_price(), None);

        let no_asks = book(vec![(dec!(0.50), dec!(100))], vec![]);
        assert!(no_asks.has_empty_side());
        assert_eq!(no_asks.mid_price(), None);
    }

    #[test]
    fn test_mid_complement_sums_to_one() {
        let book = book(
            vec![(dec!(0.47), dec!(10))],
            vec![(dec!(0.53), dec!(10))],
        );
        let mid_yes = book.mid_price().unwrap();
        let mid_no = predict_common::Outcome::complement_price(mid_yes);
        assert_eq!(mid_yes + mid_no, Decimal::ONE);
    }

    // =========================================================================
    // MarketInfo Token Resolution Tests
    // =========================================================================

    #[test]
    fn test_resolve_tokens_by_name() {
        let info = info_with_outcomes(vec![
            outcome("No", "token-no"),
            outcome("Yes", "token-yes"),
        ]);

        // Order in metadata is reversed; name matching must win.
        let tokens = info.resolve_tokens().unwrap();
        assert_eq!(tokens.yes_token_id, "token-yes");
        assert_eq!(tokens.no_token_id, "token-no");
    }

    #[test]
    fn test_resolve_tokens_case_insensitive() {
        let info = info_with_outcomes(vec![
            outcome("YES", "token-yes"),
            outcome("no", "token-no"),
        ]);

        let tokens = info.resolve_tokens().unwrap();
        assert_eq!(tokens.yes_token_id, "token-yes");
        assert_eq!(tokens.no_token_id, "token-no");
    }

    #[test]
    fn test_resolve_tokens_positional_fallback() {
        let info = info_with_outcomes(vec![
            outcome("Up", "token-up"),
            outcome("Down", "token-down"),
        ]);

        let tokens = info.resolve_tokens().unwrap();
        assert_eq!(tokens.yes_token_id, "token-up");
        assert_eq!(tokens.no_token_id, "token-down");
    }

    #[test]
    fn test_resolve_tokens_missing_outcomes() {
        let info = info_with_outcomes(vec![]);
        assert_eq!(info.resolve_tokens(), Err(ConfigError::MissingOutcomes));
    }

    #[test]
    fn test_resolve_tokens_too_few_outcomes() {
        let info = info_with_outcomes(vec![outcome("Yes", "token-yes")]);
        assert_eq!(info.resolve_tokens(), Err(ConfigError::TooFewOutcomes(1)));
    }

    #[test]
    fn test_resolve_tokens_empty_token_id() {
        let info = info_with_outcomes(vec![
            outcome("Yes", ""),
            outcome("No", "token-no"),
        ]);
        assert_eq!(
            info.resolve_tokens(),
            Err(ConfigError::MissingTokenId("Yes".to_string()))
        );
    }

    #[test]
    fn test_market_info_label() {
        let mut info = info_with_outcomes(vec![]);
        assert_eq!(info.label(), "market-1");
        info.title = Some("Will it rain?".to_string());
        assert_eq!(info.label(), "Will it rain?");
    }
}
