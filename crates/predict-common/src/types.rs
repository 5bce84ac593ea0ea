//! Shared types for the predict.fun market-making bot.
//!
//! CRITICAL: All prices and quantities use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side for trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Outcome of a binary market. Prices of the two outcomes sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    /// Converts a price quoted for the opposite outcome into this outcome's
    /// price (Yes + No = 1).
    pub fn complement_price(price: Decimal) -> Decimal {
        Decimal::ONE - price
    }

    /// Both outcomes, Yes first. Positional order matches the exchange's
    /// outcome list (index 0 = Yes, index 1 = No).
    pub fn both() -> [Outcome; 2] {
        [Outcome::Yes, Outcome::No]
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

/// A pair of values keyed by outcome.
///
/// Used wherever state is held per outcome slot (quotes, active orders,
/// in-flight flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutcomePair<T> {
    pub yes: T,
    pub no: T,
}

impl<T> OutcomePair<T> {
    pub fn new(yes: T, no: T) -> Self {
        Self { yes, no }
    }

    pub fn get(&self, outcome: Outcome) -> &T {
        match outcome {
            Outcome::Yes => &self.yes,
            Outcome::No => &self.no,
        }
    }

    pub fn get_mut(&mut self, outcome: Outcome) -> &mut T {
        match outcome {
            Outcome::Yes => &mut self.yes,
            Outcome::No => &mut self.no,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> OutcomePair<U> {
        OutcomePair {
            yes: f(&self.yes),
            no: f(&self.no),
        }
    }
}

/// A single level in an order book (price + size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Price in USD (0.00 to 1.00 for binary outcome shares).
    pub price: Decimal,
    /// Quantity of shares resting at this price.
    pub size: Decimal,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Notional value resting at this level.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// On-chain token identifiers for the two outcomes of a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Token ID for the YES outcome.
    pub yes_token_id: String,
    /// Token ID for the NO outcome.
    pub no_token_id: String,
}

impl TokenPair {
    pub fn new(yes_token_id: impl Into<String>, no_token_id: impl Into<String>) -> Self {
        Self {
            yes_token_id: yes_token_id.into(),
            no_token_id: no_token_id.into(),
        }
    }

    /// Token ID for the given outcome.
    pub fn token_id(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Yes => &self.yes_token_id,
            Outcome::No => &self.no_token_id,
        }
    }

    /// Reverse lookup: which outcome does a token ID belong to?
    pub fn outcome_for(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.yes_token_id {
            Some(Outcome::Yes)
        } else if token_id == self.no_token_id {
            Some(Outcome::No)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_outcome_opposite() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
    }

    #[test]
    fn test_complement_price() {
        assert_eq!(Outcome::complement_price(dec!(0.954)), dec!(0.046));
        assert_eq!(Outcome::complement_price(dec!(0.5)), dec!(0.5));
    }

    #[test]
    fn test_outcome_pair_access() {
        let mut pair = OutcomePair::new(1u32, 2u32);
        assert_eq!(*pair.get(Outcome::Yes), 1);
        assert_eq!(*pair.get(Outcome::No), 2);

        *pair.get_mut(Outcome::No) = 5;
        assert_eq!(*pair.get(Outcome::No), 5);
    }

    #[test]
    fn test_outcome_pair_map() {
        let pair = OutcomePair::new(dec!(0.4), dec!(0.6));
        let doubled = pair.map(|v| v * dec!(2));
        assert_eq!(doubled.yes, dec!(0.8));
        assert_eq!(doubled.no, dec!(1.2));
    }

    #[test]
    fn test_order_book_level_notional() {
        let level = OrderBookLevel::new(dec!(0.45), dec!(100));
        assert_eq!(level.notional(), dec!(45));
    }

    #[test]
    fn test_token_pair_lookup() {
        let pair = TokenPair::new("yes-123", "no-456");
        assert_eq!(pair.token_id(Outcome::Yes), "yes-123");
        assert_eq!(pair.token_id(Outcome::No), "no-456");
        assert_eq!(pair.outcome_for("no-456"), Some(Outcome::No));
        assert_eq!(pair.outcome_for("other"), None);
    }
}
