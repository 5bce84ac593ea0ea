//! The per-market order manager.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use predict_common::{Outcome, OutcomePair, Side, TokenPair};

use crate::api::{ApiError, OpenOrder, PlacedOrder, TradingApi};
use crate::calculator::{
    self, ensure_min_order_value, liquidity_ahead, price_for_target_liquidity, round_price,
    round_shares_to_tenths, shares_from_usdt, MAX_ORDER_PRICE, MIN_ORDER_PRICE,
};
use crate::config::{RepriceConfig, RetryConfig};
use crate::settings::{PositionSize, TokenSettings};
use crate::signer::{OrderSigningRequest, Signer};
use crate::types::{ConfigError, MarketInfo, OrderBook};

use super::types::{
    ActiveOrder, CancelResult, LockTimeout, ManagerSnapshot, OrderError, OrderStats,
};

/// Shared handle to the latest book snapshot, written by the controller
/// and read by the re-pricing protocol after its settle delay.
pub type SharedBook = Arc<RwLock<Option<OrderBook>>>;

/// All mutable per-market state, behind a single mutex.
#[derive(Debug, Default)]
struct MarketState {
    active: OutcomePair<Option<ActiveOrder>>,
    placing: OutcomePair<bool>,
    cancelling: OutcomePair<bool>,
    placing_orders: bool,
    stats: OrderStats,
    last_mid_price_yes: Option<Decimal>,
}

#[derive(Debug, Clone, Copy)]
enum Flag {
    Placing(Outcome),
    Cancelling(Outcome),
    Batch,
}

/// Next step after a failed attempt.
enum RetryStep {
    Retry(Duration),
    Exhausted,
    Terminal,
}

impl MarketState {
    fn flag(&mut self, flag: Flag) -> &mut bool {
        match flag {
            Flag::Placing(outcome) => self.placing.get_mut(outcome),
            Flag::Cancelling(outcome) => self.cancelling.get_mut(outcome),
            Flag::Batch => &mut self.placing_orders,
        }
    }
}

/// RAII in-flight marker. The flag is set under the state mutex when the
/// guard is created and cleared on drop, which is the guaranteed path that
/// keeps a panicked or early-returning operation from wedging its slot.
#[must_use]
pub struct InFlightGuard {
    state: Arc<Mutex<MarketState>>,
    flag: Flag,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        *self.state.lock().flag(self.flag) = false;
    }
}

/// Per-market order lifecycle manager.
///
/// Generic over the trading API and signer so tests can substitute mocks
/// for the network boundary.
pub struct OrderManager<A, S> {
    market: MarketInfo,
    tokens: TokenPair,
    api: Arc<A>,
    signer: Arc<S>,
    retry: RetryConfig,
    reprice: RepriceConfig,
    state: Arc<Mutex<MarketState>>,
}

impl<A: TradingApi, S: Signer> OrderManager<A, S> {
    /// Builds a manager for one market, resolving the outcome token pair
    /// up front so the hot path never does metadata lookups.
    pub fn new(
        market: MarketInfo,
        api: Arc<A>,
        signer: Arc<S>,
        retry: RetryConfig,
        reprice: RepriceConfig,
    ) -> Result<Self, ConfigError> {
        let tokens = market.resolve_tokens()?;
        Ok(Self {
            market,
            tokens,
            api,
            signer,
            retry,
            reprice,
            state: Arc::new(Mutex::new(MarketState::default())),
        })
    }

    pub fn market_id(&self) -> &str {
        &self.market.market_id
    }

    pub fn market(&self) -> &MarketInfo {
        &self.market
    }

    // =========================================================================
    // In-flight guards
    // =========================================================================

    fn try_acquire(&self, flag: Flag) -> Option<InFlightGuard> {
        let mut state = self.state.lock();
        let slot = state.flag(flag);
        if *slot {
            return None;
        }
        *slot = true;
        Some(InFlightGuard {
            state: Arc::clone(&self.state),
            flag,
        })
    }

    /// Marks the outcome's cancel path in flight. Returns `None` when a
    /// cancel (or re-price) is already running for the slot, letting the
    /// caller coalesce the trigger before spawning any work.
    pub fn try_begin_cancel(&self, outcome: Outcome) -> Option<InFlightGuard> {
        self.try_acquire(Flag::Cancelling(outcome))
    }

    /// Marks the market-wide batch placement path in flight.
    pub fn try_begin_batch(&self) -> Option<InFlightGuard> {
        self.try_acquire(Flag::Batch)
    }

    // =========================================================================
    // Timeout-bounded reads
    // =========================================================================

    /// Defensive copy of the active order slots, bounded by `timeout`.
    pub fn active_orders(
        &self,
        timeout: Duration,
    ) -> Result<OutcomePair<Option<ActiveOrder>>, LockTimeout> {
        let state = self.state.try_lock_for(timeout).ok_or(LockTimeout)?;
        Ok(state.active.clone())
    }

    /// Defensive copy of the counters, bounded by `timeout`.
    pub fn stats(&self, timeout: Duration) -> Result<OrderStats, LockTimeout> {
        let state = self.state.try_lock_for(timeout).ok_or(LockTimeout)?;
        Ok(state.stats)
    }

    /// Full state snapshot for the reactive path, bounded by `timeout`.
    pub fn snapshot(&self, timeout: Duration) -> Result<ManagerSnapshot, LockTimeout> {
        let state = self.state.try_lock_for(timeout).ok_or(LockTimeout)?;
        Ok(ManagerSnapshot {
            active: state.active.clone(),
            stats: state.stats,
            placing: state.placing,
            cancelling: state.cancelling,
            placing_orders: state.placing_orders,
        })
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Signs and submits a buy order for one outcome.
    ///
    /// On success the slot holds the new `ActiveOrder` and the `placed`
    /// counter is incremented. Failures are returned, never raised as
    /// fatal; the slot stays empty.
    pub async fn place_order(
        &self,
        outcome: Outcome,
        price: Decimal,
        shares: Decimal,
    ) -> Result<ActiveOrder, OrderError> {
        let _guard = self
            .try_acquire(Flag::Placing(outcome))
            .ok_or(OrderError::PlacementInFlight(outcome))?;

        info!(
            market = %self.market.label(),
            %outcome,
            %price,
            %shares,
            "placing order"
        );

        let request = OrderSigningRequest {
            token_id: self.tokens.token_id(outcome).to_string(),
            outcome,
            side: Side::Buy,
            price,
            shares,
            fee_rate_bps: self.market.fee_rate_bps,
            is_neg_risk: self.market.is_neg_risk,
            is_yield_bearing: self.market.is_yield_bearing,
        };
        let payload = self.signer.sign_order(&request).await?;

        let placed = self.submit_with_retries(&payload).await?;

        let order = ActiveOrder {
            order_id: placed.id,
            signed_hash: payload.hash.clone(),
            price,
            shares,
            placed_at: Utc::now(),
        };

        {
            let mut state = self.state.lock();
            *state.active.get_mut(outcome) = Some(order.clone());
            state.stats.placed += 1;
        }

        info!(
            market = %self.market.label(),
            %outcome,
            order_id = %order.order_id,
            "order placed"
        );
        Ok(order)
    }

    async fn submit_with_retries(
        &self,
        payload: &crate::signer::SignedOrderPayload,
    ) -> Result<PlacedOrder, OrderError> {
        let mut attempt: u32 = 1;
        let mut token_refreshed = false;
        let mut collateral_reconciled = false;

        loop {
            let error = match self.api.place_order(payload).await {
                Ok(placed) => return Ok(placed),
                Err(e) => e,
            };

            if error.is_invalid_token() && !token_refreshed {
                token_refreshed = true;
                // One refresh per action, outside the attempt budget.
                self.refresh_auth().await?;
                continue;
            }

            if error.is_insufficient_collateral() {
                if !collateral_reconciled {
                    collateral_reconciled = true;
                    warn!(
                        market = %self.market.label(),
                        "insufficient collateral, reconciling open orders"
                    );
                    if self.reconcile_collateral().await {
                        continue;
                    }
                }
                return Err(OrderError::Api(error));
            }

            let delay = match self.retry_delay(&error, attempt) {
                RetryStep::Retry(delay) => delay,
                RetryStep::Exhausted => {
                    return Err(OrderError::RetriesExhausted {
                        attempts: attempt,
                        last: error,
                    })
                }
                RetryStep::Terminal => return Err(OrderError::Api(error)),
            };

            warn!(
                market = %self.market.label(),
                attempt,
                max_attempts = self.retry.max_attempts,
                ?delay,
                error = %error,
                "placement failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Classifies an error against the attempt budget.
    fn retry_delay(&self, error: &ApiError, attempt: u32) -> RetryStep {
        let retryable =
            error.is_rate_limited() || error.is_transport() || error.is_server_error();
        if !retryable {
            return RetryStep::Terminal;
        }
        if attempt >= self.retry.max_attempts {
            return RetryStep::Exhausted;
        }
        if error.is_rate_limited() {
            RetryStep::Retry(self.retry.rate_limit_delay(attempt))
        } else {
            RetryStep::Retry(self.retry.network_retry_delay)
        }
    }

    async fn refresh_auth(&self) -> Result<(), OrderError> {
        info!(market = %self.market.label(), "auth token expired, refreshing");
        let token = self
            .signer
            .refresh_auth_token()
            .await
            .map_err(|e| OrderError::AuthRefresh(e.to_string()))?;
        self.api.set_auth_token(&token);
        Ok(())
    }

    /// Frees collateral frozen by this market's other open orders: list
    /// them, cancel them all, then wait for funds to release. Returns true
    /// when a retry is worthwhile.
    async fn reconcile_collateral(&self) -> bool {
        let orders = self.list_open_orders_with_retries().await;
        if orders.is_empty() {
            warn!(
                market = %self.market.label(),
                "no open orders found to free collateral from"
            );
            return false;
        }

        let ids: Vec<String> = orders.into_iter().map(|o| o.id).collect();
        warn!(
            market = %self.market.label(),
            count = ids.len(),
            "cancelling open orders to free collateral"
        );

        match self.api.cancel_orders(&ids).await {
            Ok(()) => {
                let mut state = self.state.lock();
                for outcome in Outcome::both() {
                    let was_cancelled = state
                        .active
                        .get(outcome)
                        .as_ref()
                        .map(|order| ids.contains(&order.order_id))
                        .unwrap_or(false);
                    if was_cancelled {
                        *state.active.get_mut(outcome) = None;
                    }
                }
                state.stats.cancelled += ids.len() as u64;
                drop(state);

                tokio::time::sleep(self.retry.collateral_settle_delay).await;
                true
            }
            Err(e) => {
                warn!(
                    market = %self.market.label(),
                    error = %e,
                    "failed to cancel conflicting orders"
                );
                false
            }
        }
    }

    async fn list_open_orders_with_retries(&self) -> Vec<OpenOrder> {
        for attempt in 1..=self.retry.max_attempts {
            match self.api.list_open_orders(&self.market.market_id).await {
                Ok(orders) => return orders,
                Err(e) if e.is_transport() && attempt < self.retry.max_attempts => {
                    warn!(
                        market = %self.market.label(),
                        attempt,
                        error = %e,
                        "open-order listing timed out, retrying"
                    );
                    tokio::time::sleep(self.retry.list_orders_retry_delay).await;
                }
                Err(e) => {
                    warn!(
                        market = %self.market.label(),
                        error = %e,
                        "failed to list open orders"
                    );
                    return Vec::new();
                }
            }
        }
        Vec::new()
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancels the outcome's resting order, if any.
    pub async fn cancel_order(&self, outcome: Outcome) -> CancelResult {
        match self.try_begin_cancel(outcome) {
            Some(guard) => self.run_cancel(outcome, guard).await,
            None => CancelResult::InFlight,
        }
    }

    /// Cancel body for callers that already hold the slot's cancel guard.
    pub async fn run_cancel(&self, outcome: Outcome, guard: InFlightGuard) -> CancelResult {
        let _guard = guard;

        let order = { self.state.lock().active.get(outcome).clone() };
        let Some(order) = order else {
            info!(
                market = %self.market.label(),
                %outcome,
                "nothing to cancel"
            );
            return CancelResult::NothingToCancel;
        };

        info!(
            market = %self.market.label(),
            %outcome,
            order_id = %order.order_id,
            "cancelling order"
        );

        match self.cancel_with_retries(&order.order_id).await {
            Ok(()) => {
                self.clear_slot(outcome, &order.order_id);
                info!(
                    market = %self.market.label(),
                    %outcome,
                    order_id = %order.order_id,
                    "order cancelled"
                );
                CancelResult::Cancelled
            }
            Err(e) => {
                warn!(
                    market = %self.market.label(),
                    %outcome,
                    order_id = %order.order_id,
                    error = %e,
                    "cancel failed"
                );
                CancelResult::Failed(e)
            }
        }
    }

    async fn cancel_with_retries(&self, order_id: &str) -> Result<(), OrderError> {
        let ids = [order_id.to_string()];
        let mut attempt: u32 = 1;
        let mut token_refreshed = false;

        loop {
            let error = match self.api.cancel_orders(&ids).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            // The order is already gone: cancelled or filled. Success.
            if error.is_not_found() {
                debug!(order_id, "order not found on cancel, treating as gone");
                return Ok(());
            }

            if error.is_invalid_token() && !token_refreshed {
                token_refreshed = true;
                self.refresh_auth().await?;
                continue;
            }

            let delay = match self.retry_delay(&error, attempt) {
                RetryStep::Retry(delay) => delay,
                RetryStep::Exhausted => {
                    return Err(OrderError::RetriesExhausted {
                        attempts: attempt,
                        last: error,
                    })
                }
                RetryStep::Terminal => return Err(OrderError::Api(error)),
            };

            warn!(
                market = %self.market.label(),
                attempt,
                max_attempts = self.retry.max_attempts,
                ?delay,
                error = %error,
                "cancel failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Clears the slot if it still holds the cancelled order, and counts
    /// the cancellation. A newer order installed meanwhile is left alone.
    fn clear_slot(&self, outcome: Outcome, order_id: &str) {
        let mut state = self.state.lock();
        let slot = state.active.get_mut(outcome);
        if slot.as_ref().map(|o| o.order_id.as_str()) == Some(order_id) {
            *slot = None;
        }
        state.stats.cancelled += 1;
    }

    /// Cancels both outcome slots concurrently. Returns the logical AND of
    /// the two results.
    pub async fn cancel_all(&self) -> bool {
        let (yes, no) = tokio::join!(
            self.cancel_order(Outcome::Yes),
            self.cancel_order(Outcome::No)
        );
        yes.is_ok() && no.is_ok()
    }

    // =========================================================================
    // Batch placement (reactive path)
    // =========================================================================

    /// Places both admissible outcomes from a computed quote. Overlapping
    /// calls coalesce via the market-wide guard.
    pub async fn place_from_quote(
        &self,
        quote: &calculator::QuoteResult,
        mid_price_yes: Decimal,
    ) -> bool {
        match self.try_begin_batch() {
            Some(guard) => self.run_batch_placement(guard, quote, mid_price_yes).await,
            None => true,
        }
    }

    /// Batch placement body for callers that already hold the batch guard.
    pub async fn run_batch_placement(
        &self,
        guard: InFlightGuard,
        quote: &calculator::QuoteResult,
        mid_price_yes: Decimal,
    ) -> bool {
        let _guard = guard;

        // Stale-price flush: when mid has moved since the previous batch,
        // resting orders are priced off an old book and must go first.
        let mid_moved = {
            let mut state = self.state.lock();
            let moved = state
                .last_mid_price_yes
                .map(|last| (last - mid_price_yes).abs() > self.retry.mid_price_epsilon)
                .unwrap_or(false);
            state.last_mid_price_yes = Some(mid_price_yes);
            moved
        };
        if mid_moved {
            info!(
                market = %self.market.label(),
                mid = %mid_price_yes,
                "mid price moved, flushing stale orders"
            );
            self.cancel_all().await;
        }

        let (yes_ok, no_ok) = tokio::join!(
            self.place_outcome_from_quote(quote, Outcome::Yes),
            self.place_outcome_from_quote(quote, Outcome::No)
        );
        yes_ok && no_ok
    }

    async fn place_outcome_from_quote(
        &self,
        quote: &calculator::QuoteResult,
        outcome: Outcome,
    ) -> bool {
        let candidate = quote.quote(outcome);

        if !candidate.can_place {
            // Not an error: market conditions gate this side right now.
            debug!(
                market = %self.market.label(),
                %outcome,
                liquidity = %candidate.liquidity_ahead,
                min_liquidity = %quote.min_liquidity,
                "skipping placement, conditions not met"
            );
            return true;
        }

        // Re-check the slot right before placing; a concurrent path may
        // have installed an order since the quote was computed.
        if self.state.lock().active.get(outcome).is_some() {
            return true;
        }

        match self
            .place_order(outcome, candidate.price, candidate.shares)
            .await
        {
            Ok(_) => true,
            Err(OrderError::PlacementInFlight(_)) => true,
            Err(e) => {
                warn!(
                    market = %self.market.label(),
                    %outcome,
                    error = %e,
                    "placement from quote failed"
                );
                false
            }
        }
    }

    // =========================================================================
    // Auto-spread re-pricing
    // =========================================================================

    /// Re-pricing protocol: cancel the stale order, wait for the book to
    /// settle, re-walk the depth for the target liquidity, and place at
    /// the new price.
    ///
    /// The caller supplies the slot's cancel guard (acquired before
    /// spawning) so the whole protocol is serialized against other cancel
    /// triggers. Aborts — floor price, still-insufficient depth, or a new
    /// price within one tick of the old — leave the slot absent; the next
    /// qualifying book update retries.
    pub async fn run_reprice(
        &self,
        outcome: Outcome,
        guard: InFlightGuard,
        latest_book: SharedBook,
        settings: TokenSettings,
        mid_price_yes: Decimal,
    ) -> bool {
        let _guard = guard;

        let old_price = {
            self.state
                .lock()
                .active
                .get(outcome)
                .as_ref()
                .map(|o| o.price)
        };

        // Step 1: take down the stale order.
        let order = { self.state.lock().active.get(outcome).clone() };
        if let Some(order) = order {
            match self.cancel_with_retries(&order.order_id).await {
                Ok(()) => self.clear_slot(outcome, &order.order_id),
                Err(e) => {
                    warn!(
                        market = %self.market.label(),
                        %outcome,
                        error = %e,
                        "re-price aborted, could not cancel stale order"
                    );
                    return false;
                }
            }
        }

        // Step 2: let the book reflect the cancellation.
        tokio::time::sleep(self.reprice.settle_delay).await;

        let Some(book) = latest_book.read().await.clone() else {
            return false;
        };

        // Step 3: find the new candidate on the settled book.
        let precision = self.market.decimal_precision;
        let Some(walked) = price_for_target_liquidity(
            &book,
            settings.target_liquidity_usdt,
            outcome,
            precision,
        ) else {
            warn!(
                market = %self.market.label(),
                %outcome,
                "re-price aborted, book has an empty side"
            );
            return false;
        };
        if walked <= Decimal::ZERO {
            warn!(
                market = %self.market.label(),
                %outcome,
                "re-price aborted, walker produced a non-positive price"
            );
            return false;
        }

        let mid = match outcome {
            Outcome::Yes => mid_price_yes,
            Outcome::No => Outcome::complement_price(mid_price_yes),
        };
        let mut new_price = walked.max(mid - settings.max_auto_spread_dollars());
        new_price = round_price(new_price, precision)
            .min(MAX_ORDER_PRICE)
            .max(MIN_ORDER_PRICE);

        // Floor price means the target liquidity is unreachable.
        if new_price <= MIN_ORDER_PRICE {
            warn!(
                market = %self.market.label(),
                %outcome,
                target = %settings.target_liquidity_usdt,
                "re-price aborted, target liquidity unreachable"
            );
            return false;
        }

        // The old order is gone, so the depth check runs without own-order
        // subtraction.
        let depth = liquidity_ahead(&book, new_price, outcome, None);
        if depth < settings.target_liquidity_usdt {
            warn!(
                market = %self.market.label(),
                %outcome,
                %new_price,
                %depth,
                target = %settings.target_liquidity_usdt,
                "re-price aborted, depth ahead of new price still insufficient"
            );
            return false;
        }

        // A price indistinguishable from the old one would re-create the
        // same starved order.
        if let Some(old) = old_price {
            if (new_price - old).abs() < calculator::tick(precision) {
                info!(
                    market = %self.market.label(),
                    %outcome,
                    %new_price,
                    "re-price aborted, new price matches the old one"
                );
                return false;
            }
        }

        // Step 4: resize and place.
        let Some(position_size) = settings.position_size else {
            warn!(
                market = %self.market.label(),
                %outcome,
                "re-price aborted, no position size configured"
            );
            return false;
        };
        let raw = match position_size {
            PositionSize::Usdt(usdt) => shares_from_usdt(usdt, new_price),
            PositionSize::Shares(count) => count,
        };
        let shares = round_shares_to_tenths(ensure_min_order_value(raw, new_price), new_price);

        info!(
            market = %self.market.label(),
            %outcome,
            old_price = ?old_price,
            %new_price,
            target = %settings.target_liquidity_usdt,
            "re-pricing order for target liquidity"
        );

        match self.place_order(outcome, new_price, shares).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    market = %self.market.label(),
                    %outcome,
                    error = %e,
                    "re-price placement failed"
                );
                false
            }
        }
    }
}
