//! Pure quote calculation: candidate prices, sizes, and admissibility.
//!
//! Everything in this module is a pure function of an order-book snapshot
//! and the market's settings — no I/O, no state. The reactive controller
//! re-runs it on every book update.
//!
//! ## Pricing modes
//!
//! - **Fixed spread**: `price = mid * (1 - spread_percent/100)`.
//! - **Auto spread**: the depth walker finds the price at which the target
//!   liquidity rests ahead of the order, clamped to at most
//!   `max_auto_spread_cents` below mid.
//!
//! ## Liquidity ahead
//!
//! For Yes, depth ahead of a candidate is every bid strictly above it.
//! For No, asks are converted through `no = 1 - yes` and depth ahead is
//! every converted level strictly above the candidate No price. Our own
//! resting order is subtracted when it sits strictly ahead of the
//! candidate, so an order never inflates its own admissibility signal.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use predict_common::{Outcome, OrderBookLevel, OutcomePair};

use crate::settings::{PositionSize, TokenSettings};
use crate::types::{ConfigError, OrderBook};

/// Minimum notional per order enforced by the exchange.
pub const MIN_ORDER_VALUE_USD: Decimal = dec!(1);
/// Price floor: one tenth of a cent.
pub const MIN_ORDER_PRICE: Decimal = dec!(0.001);
/// Price ceiling.
pub const MAX_ORDER_PRICE: Decimal = dec!(0.999);

/// One price tick for the given decimal precision (2 -> 0.01, 3 -> 0.001).
pub fn tick(decimal_precision: u32) -> Decimal {
    Decimal::new(1, decimal_precision)
}

/// Mid price of the Yes outcome.
pub fn mid_price(best_bid: Decimal, best_ask: Decimal) -> Decimal {
    (best_bid + best_ask) / Decimal::TWO
}

/// Rounds a price to the market's tick grid (2 or 3 decimal places).
pub fn round_price(price: Decimal, decimal_precision: u32) -> Decimal {
    match decimal_precision {
        2 => price.round_dp(2),
        _ => price.round_dp(3),
    }
}

/// Shares purchasable for a USDT notional at the given price.
pub fn shares_from_usdt(usdt: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    usdt / price
}

/// Raises the share count so the order meets the $1 minimum notional.
pub fn ensure_min_order_value(shares: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return shares.max(MIN_ORDER_VALUE_USD / MIN_ORDER_PRICE);
    }
    if shares * price < MIN_ORDER_VALUE_USD {
        MIN_ORDER_VALUE_USD / price
    } else {
        shares
    }
}

/// Rounds shares to one decimal place, then repairs the notional upward in
/// 0.1-share steps until it is back at or above $1. The repair only ever
/// increases the count.
pub fn round_shares_to_tenths(shares: Decimal, price: Decimal) -> Decimal {
    let mut rounded = shares.round_dp(1);
    if price <= Decimal::ZERO {
        return rounded;
    }
    while rounded * price < MIN_ORDER_VALUE_USD {
        rounded += dec!(0.1);
    }
    rounded
}

/// Total notional resting at prices strictly better than `our_price`.
///
/// Subtracts `own_order` when it rests strictly ahead of the candidate
/// (only such orders were counted in the walk); never goes negative.
pub fn liquidity_ahead(
    book: &OrderBook,
    our_price: Decimal,
    outcome: Outcome,
    own_order: Option<OrderBookLevel>,
) -> Decimal {
    if book.has_empty_side() {
        return Decimal::ZERO;
    }

    let mut total = Decimal::ZERO;

    match outcome {
        Outcome::Yes => {
            // Bids are sorted descending; stop at the first level at or
            // below the candidate.
            for level in &book.bids {
                if level.price > our_price {
                    total += level.notional();
                } else {
                    break;
                }
            }
        }
        Outcome::No => {
            // Asks ascend in Yes price, so converted No prices descend.
            for level in &book.asks {
                let no_price = Outcome::complement_price(level.price);
                if no_price > our_price {
                    total += no_price * level.size;
                } else {
                    break;
                }
            }
        }
    }

    if let Some(own) = own_order {
        if own.price > our_price {
            total -= own.notional();
        }
    }

    total.max(Decimal::ZERO)
}

/// Finds the price at which `target_liquidity` of depth rests ahead.
///
/// Walks the relevant side accumulating notional; once the target is
/// reached the candidate is one tick below that level. When the walk
/// exhausts the book the candidate is one tick below the worst level —
/// the caller detects the shortfall through the admissibility check.
/// Returns `None` when either side of the book is empty.
pub fn price_for_target_liquidity(
    book: &OrderBook,
    target_liquidity: Decimal,
    outcome: Outcome,
    decimal_precision: u32,
) -> Option<Decimal> {
    if book.has_empty_side() {
        return None;
    }

    let step = tick(decimal_precision);
    let mut accumulated = Decimal::ZERO;

    match outcome {
        Outcome::Yes => {
            for level in &book.bids {
                accumulated += level.notional();
                if accumulated >= target_liquidity {
                    return Some(round_price(level.price - step, decimal_precision));
                }
            }
            let last = book.bids.last()?.price;
            Some(round_price(last - step, decimal_precision))
        }
        Outcome::No => {
            for level in &book.asks {
                let no_price = Outcome::complement_price(level.price);
                accumulated += no_price * level.size;
                if accumulated >= target_liquidity {
                    return Some(round_price(no_price - step, decimal_precision));
                }
            }
            let last_no = Outcome::complement_price(book.asks.last()?.price);
            Some(round_price(last_no - step, decimal_precision))
        }
    }
}

/// Candidate quote for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeQuote {
    /// Limit price after rounding and clamping.
    pub price: Decimal,
    /// Share count after minimum-notional repair and rounding.
    pub shares: Decimal,
    /// Notional value of the order.
    pub value_usd: Decimal,
    /// Depth resting ahead of the candidate price.
    pub liquidity_ahead: Decimal,
    /// Distance between mid and the candidate price.
    pub spread: Decimal,
    /// Liquidity-sufficiency gate.
    pub can_place_liquidity: bool,
    /// Spread gate; only binding when the price sits at the floor.
    pub can_place_spread: bool,
    /// Overall admissibility: both gates passed.
    pub can_place: bool,
}

/// Result of one quote computation. Pure derived data, recomputed on every
/// book update and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteResult {
    pub mid_yes: Decimal,
    pub mid_no: Decimal,
    pub best_bid_yes: Decimal,
    pub best_ask_yes: Decimal,
    /// Per-outcome candidate quotes.
    pub quotes: OutcomePair<OutcomeQuote>,
    /// Worst-case capital requirement: only one side can fill, so this is
    /// the larger of the two notionals.
    pub total_value_usd: Decimal,
    /// Liquidity threshold that was applied.
    pub min_liquidity: Decimal,
    /// Spread threshold that was applied, in cents.
    pub min_spread_cents: Decimal,
}

impl QuoteResult {
    pub fn quote(&self, outcome: Outcome) -> &OutcomeQuote {
        self.quotes.get(outcome)
    }
}

/// Computes both candidate quotes from a book snapshot.
///
/// Returns `Ok(None)` when the book has an empty bid or ask side (nothing
/// to price against), and `Err` when the settings cannot produce an order
/// at all (no position size configured).
///
/// `active_orders` carries our currently resting orders as (price, size)
/// levels so their own depth is excluded from the admissibility signal.
pub fn calculate_quotes(
    book: &OrderBook,
    settings: &TokenSettings,
    decimal_precision: u32,
    active_orders: &OutcomePair<Option<OrderBookLevel>>,
) -> Result<Option<QuoteResult>, ConfigError> {
    if book.has_empty_side() {
        return Ok(None);
    }
    let (best_bid, best_ask) = match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => (bid, ask),
        _ => return Ok(None),
    };

    let mid_yes = mid_price(best_bid, best_ask);
    let mid_no = Outcome::complement_price(mid_yes);
    let mids = OutcomePair::new(mid_yes, mid_no);

    // 1. Candidate price per outcome.
    let mut prices = OutcomePair::new(Decimal::ZERO, Decimal::ZERO);
    if settings.auto_spread_enabled {
        let cap = settings.max_auto_spread_dollars();
        for outcome in Outcome::both() {
            let walked = price_for_target_liquidity(
                book,
                settings.target_liquidity_usdt,
                outcome,
                decimal_precision,
            )
            .unwrap_or(Decimal::ZERO);
            // Never price further from mid than the configured cap, even
            // when depth is insufficient.
            *prices.get_mut(outcome) = walked.max(*mids.get(outcome) - cap);
        }
    } else {
        let fraction = settings.spread_percent / dec!(100);
        for outcome in Outcome::both() {
            *prices.get_mut(outcome) = *mids.get(outcome) * (Decimal::ONE - fraction);
        }
    }

    // 2. Tick rounding and price limits.
    for outcome in Outcome::both() {
        let p = round_price(*prices.get(outcome), decimal_precision);
        *prices.get_mut(outcome) = p.min(MAX_ORDER_PRICE).max(MIN_ORDER_PRICE);
    }

    // 3. Sizing, identical for both outcomes.
    let position_size = settings
        .position_size
        .ok_or(ConfigError::PositionSizeUnset)?;
    let mut shares = OutcomePair::new(Decimal::ZERO, Decimal::ZERO);
    for outcome in Outcome::both() {
        let price = *prices.get(outcome);
        let raw = match position_size {
            PositionSize::Usdt(usdt) => shares_from_usdt(usdt, price),
            PositionSize::Shares(count) => count,
        };
        let repaired = ensure_min_order_value(raw, price);
        *shares.get_mut(outcome) = round_shares_to_tenths(repaired, price);
    }

    // 4. Admissibility.
    let min_liquidity = settings.effective_min_liquidity();
    let min_spread_dollars = settings.min_spread_dollars();

    let build = |outcome: Outcome| {
        let price = *prices.get(outcome);
        let count = *shares.get(outcome);
        let liquidity =
            liquidity_ahead(book, price, outcome, *active_orders.get(outcome));
        let spread = (*mids.get(outcome) - price).abs();

        let can_place_liquidity = liquidity >= min_liquidity;
        // Spread sufficiency only matters at the absolute floor; everywhere
        // else the candidate is by construction a real distance from mid.
        let can_place_spread = if price <= MIN_ORDER_PRICE {
            spread >= min_spread_dollars
        } else {
            true
        };

        OutcomeQuote {
            price,
            shares: count,
            value_usd: count * price,
            liquidity_ahead: liquidity,
            spread,
            can_place_liquidity,
            can_place_spread,
            can_place: can_place_liquidity && can_place_spread,
        }
    };

    let quotes = OutcomePair::new(build(Outcome::Yes), build(Outcome::No));
    let total_value_usd = quotes.yes.value_usd.max(quotes.no.value_usd);

    Ok(Some(QuoteResult {
        mid_yes,
        mid_no,
        best_bid_yes: best_bid,
        best_ask_yes: best_ask,
        quotes,
        total_value_usd,
        min_liquidity,
        min_spread_cents: settings.min_spread_cents,
    }))
}
