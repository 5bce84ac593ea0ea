//! Types for the order lifecycle manager.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use predict_common::{Outcome, OrderBookLevel, OutcomePair};

use crate::api::ApiError;
use crate::signer::SignerError;
use crate::types::ConfigError;

/// A resting order in one outcome slot.
///
/// Created when a placement succeeds, destroyed when a cancellation
/// succeeds or the order is confirmed gone. Never mutated in place —
/// replaced wholesale on re-price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrder {
    /// Exchange-assigned order id.
    pub order_id: String,
    /// EIP-712 hash of the signed order.
    pub signed_hash: String,
    /// Resting limit price.
    pub price: Decimal,
    /// Resting share count.
    pub shares: Decimal,
    pub placed_at: DateTime<Utc>,
}

impl ActiveOrder {
    /// Our order as a book level, for own-depth subtraction in the
    /// calculator.
    pub fn as_book_level(&self) -> OrderBookLevel {
        OrderBookLevel::new(self.price, self.shares)
    }
}

/// Cumulative per-market counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub placed: u64,
    pub cancelled: u64,
}

/// The state mutex could not be acquired within the caller's timeout.
///
/// Recoverable: the caller skips the current cycle instead of blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("order manager state lock timed out")]
pub struct LockTimeout;

/// Timeout-bounded view of the manager state.
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    pub active: OutcomePair<Option<ActiveOrder>>,
    pub stats: OrderStats,
    pub placing: OutcomePair<bool>,
    pub cancelling: OutcomePair<bool>,
    /// Market-wide guard over the batch placement path.
    pub placing_orders: bool,
}

impl ManagerSnapshot {
    /// Our resting orders as book levels, keyed by outcome.
    pub fn active_levels(&self) -> OutcomePair<Option<OrderBookLevel>> {
        self.active.map(|slot| slot.as_ref().map(ActiveOrder::as_book_level))
    }

    /// True when a place or cancel is in flight for the outcome.
    pub fn in_flight(&self, outcome: Outcome) -> bool {
        *self.placing.get(outcome) || *self.cancelling.get(outcome)
    }
}

/// Outcome of a cancellation request.
#[derive(Debug)]
pub enum CancelResult {
    /// The order was cancelled (or confirmed already gone via 404).
    Cancelled,
    /// The slot was already empty; no network call was made.
    NothingToCancel,
    /// Another cancellation is in flight for this slot; coalesced.
    InFlight,
    /// Cancellation failed after the retry ladder.
    Failed(OrderError),
}

impl CancelResult {
    /// Everything except a hard failure counts as success for cancel-all.
    pub fn is_ok(&self) -> bool {
        !matches!(self, CancelResult::Failed(_))
    }
}

/// Errors surfaced by place/cancel operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Not retried; the market cannot trade until inputs are fixed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("signing failed: {0}")]
    Signer(#[from] SignerError),

    /// Terminal API failure (non-retryable status or logical rejection).
    #[error("exchange rejected the request: {0}")]
    Api(#[from] ApiError),

    /// The token refresh triggered by a 401 itself failed.
    #[error("auth refresh failed: {0}")]
    AuthRefresh(String),

    /// The retry ladder was exhausted.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ApiError },

    /// A placement is already in flight for this slot.
    #[error("placement already in flight for {0}")]
    PlacementInFlight(Outcome),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(price: Decimal, shares: Decimal) -> ActiveOrder {
        ActiveOrder {
            order_id: "order-1".to_string(),
            signed_hash: "0xhash".to_string(),
            price,
            shares,
            placed_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_order_as_book_level() {
        let level = order(dec!(0.495), dec!(202)).as_book_level();
        assert_eq!(level.price, dec!(0.495));
        assert_eq!(level.size, dec!(202));
    }

    #[test]
    fn test_cancel_result_is_ok() {
        assert!(CancelResult::Cancelled.is_ok());
        assert!(CancelResult::NothingToCancel.is_ok());
        assert!(CancelResult::InFlight.is_ok());
        assert!(!CancelResult::Failed(OrderError::AuthRefresh("expired".to_string())).is_ok());
    }

    #[test]
    fn test_snapshot_in_flight() {
        let snapshot = ManagerSnapshot {
            active: OutcomePair::new(None, None),
            stats: OrderStats::default(),
            placing: OutcomePair::new(true, false),
            cancelling: OutcomePair::new(false, false),
            placing_orders: false,
        };

        assert!(snapshot.in_flight(Outcome::Yes));
        assert!(!snapshot.in_flight(Outcome::No));
    }

    #[test]
    fn test_snapshot_active_levels() {
        let snapshot = ManagerSnapshot {
            active: OutcomePair::new(Some(order(dec!(0.4), dec!(10))), None),
            stats: OrderStats::default(),
            placing: OutcomePair::new(false, false),
            cancelling: OutcomePair::new(false, false),
            placing_orders: false,
        };

        let levels = snapshot.active_levels();
        assert_eq!(levels.yes, Some(OrderBookLevel::new(dec!(0.4), dec!(10))));
        assert_eq!(levels.no, None);
    }
}
