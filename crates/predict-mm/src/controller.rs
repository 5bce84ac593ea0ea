//! Reactive Controller - binds order-book updates to order actions.
//!
//! One `MarketController` task per market consumes book snapshots in
//! arrival order, re-runs the quote calculator, compares the result
//! against the order manager's state, and dispatches place / cancel /
//! re-price work as fire-and-forget tasks so a slow network call never
//! stalls the next book update. The in-flight flags acquired *before*
//! spawning are what linearize actions per (market, outcome).
//!
//! ## Architecture
//!
//! ```text
//! feed ──► [book channel] ──► MarketController ──► OrderManager
//! caller ─► [command channel] ──┘        │
//!                                        └──► [event channel] ──► consumer
//! ```
//!
//! `QuoteEngine` supervises one controller per market; markets are fully
//! independent and one market's persistent failure never stops the others.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use predict_common::{Outcome, OutcomePair};

use crate::api::TradingApi;
use crate::calculator::{calculate_quotes, QuoteResult};
use crate::config::EngineConfig;
use crate::feed::BookUpdate;
use crate::order_manager::{ActiveOrder, OrderManager, OrderStats, SharedBook};
use crate::settings::{SettingsUpdate, TokenSettings};
use crate::signer::Signer;
use crate::types::{ConfigError, MarketInfo, OrderBook};

/// Commands accepted by a market controller.
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    /// Start quoting; evaluates the stored book immediately.
    EnableQuoting,
    /// Stop quoting and cancel all resting orders.
    DisableQuoting,
    /// Partial settings update, applied before the next computation.
    UpdateSettings(SettingsUpdate),
}

/// Events emitted toward the presentation/consumer boundary.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// One processed book update: the computed quote plus current state.
    Quote {
        market_id: String,
        quote: QuoteResult,
        active: OutcomePair<Option<ActiveOrder>>,
        stats: OrderStats,
    },
    /// A place/cancel/re-price task finished and state may have changed.
    OrdersChanged {
        market_id: String,
        active: OutcomePair<Option<ActiveOrder>>,
        stats: OrderStats,
    },
}

/// Reactive controller for a single market.
pub struct MarketController<A, S> {
    manager: Arc<OrderManager<A, S>>,
    settings: TokenSettings,
    latest_book: SharedBook,
    events: mpsc::Sender<ControllerEvent>,
    read_lock_timeout: Duration,
}

impl<A, S> MarketController<A, S>
where
    A: TradingApi + Send + Sync + 'static,
    S: Signer + Send + Sync + 'static,
{
    pub fn new(
        manager: Arc<OrderManager<A, S>>,
        settings: TokenSettings,
        events: mpsc::Sender<ControllerEvent>,
        read_lock_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            settings,
            latest_book: Arc::new(RwLock::new(None)),
            events,
            read_lock_timeout,
        }
    }

    /// Runs until the book channel closes (feed unsubscribed the market).
    pub async fn run(
        mut self,
        mut books: mpsc::Receiver<OrderBook>,
        mut commands: mpsc::Receiver<ControllerCommand>,
    ) {
        info!(market = %self.manager.market().label(), "controller started");
        let mut commands_open = true;

        loop {
            tokio::select! {
                maybe_book = books.recv() => match maybe_book {
                    Some(book) => self.on_book_update(book).await,
                    None => break,
                },
                maybe_command = commands.recv(), if commands_open => match maybe_command {
                    Some(command) => self.on_command(command).await,
                    None => commands_open = false,
                },
            }
        }

        info!(market = %self.manager.market().label(), "controller stopped");
    }

    async fn on_book_update(&mut self, book: OrderBook) {
        // The snapshot replaces the previous book wholesale.
        *self.latest_book.write().await = Some(book.clone());
        self.evaluate(&book).await;
    }

    async fn on_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::EnableQuoting => {
                self.settings.enabled = true;
                info!(market = %self.manager.market().label(), "quoting enabled");
                let book = self.latest_book.read().await.clone();
                match book {
                    Some(book) => self.evaluate(&book).await,
                    None => debug!(
                        market = %self.manager.market().label(),
                        "no book yet, waiting for the first update"
                    ),
                }
            }
            ControllerCommand::DisableQuoting => {
                self.settings.enabled = false;
                info!(
                    market = %self.manager.market().label(),
                    "quoting disabled, cancelling resting orders"
                );
                let manager = Arc::clone(&self.manager);
                let events = self.events.clone();
                let timeout = self.read_lock_timeout;
                tokio::spawn(async move {
                    manager.cancel_all().await;
                    emit_orders_changed(&manager, &events, timeout);
                });
            }
            ControllerCommand::UpdateSettings(update) => {
                self.settings.apply(update);
                debug!(market = %self.manager.market().label(), "settings updated");
            }
        }
    }

    /// One evaluation cycle: compute the quote, emit it, and reconcile the
    /// two outcome slots against it.
    async fn evaluate(&mut self, book: &OrderBook) {
        let market_id = self.manager.market_id().to_string();
        let precision = self.manager.market().decimal_precision;

        // State temporarily unknown: skip this cycle rather than block the
        // update stream.
        let snapshot = match self.manager.snapshot(self.read_lock_timeout) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                debug!(market = %market_id, "state lock busy, skipping cycle");
                return;
            }
        };

        let quote = match calculate_quotes(book, &self.settings, precision, &snapshot.active_levels())
        {
            Ok(Some(quote)) => quote,
            Ok(None) => return,
            Err(e) => {
                warn!(market = %market_id, error = %e, "quote computation failed");
                return;
            }
        };

        // Computed quotes are always published for display, even when
        // quoting is off.
        let _ = self.events.try_send(ControllerEvent::Quote {
            market_id: market_id.clone(),
            quote: quote.clone(),
            active: snapshot.active.clone(),
            stats: snapshot.stats,
        });

        if !self.settings.enabled {
            return;
        }

        let mid_price_yes = quote.mid_yes;

        // Active orders whose admissibility just turned false come down,
        // either through the re-pricing protocol or a plain cancel. Both
        // outcomes are handled independently in the same cycle.
        for outcome in Outcome::both() {
            let candidate = quote.quote(outcome);
            let is_active = snapshot.active.get(outcome).is_some();
            if !is_active || candidate.can_place || *snapshot.cancelling.get(outcome) {
                continue;
            }

            if self.settings.auto_spread_enabled && !candidate.can_place_liquidity {
                let Some(guard) = self.manager.try_begin_cancel(outcome) else {
                    continue;
                };
                info!(
                    market = %market_id,
                    %outcome,
                    liquidity = %candidate.liquidity_ahead,
                    min_liquidity = %quote.min_liquidity,
                    "liquidity fell below target, re-pricing"
                );
                let manager = Arc::clone(&self.manager);
                let events = self.events.clone();
                let latest_book = Arc::clone(&self.latest_book);
                let settings = self.settings.clone();
                let timeout = self.read_lock_timeout;
                tokio::spawn(async move {
                    manager
                        .run_reprice(outcome, guard, latest_book, settings, mid_price_yes)
                        .await;
                    emit_orders_changed(&manager, &events, timeout);
                });
            } else {
                let Some(guard) = self.manager.try_begin_cancel(outcome) else {
                    continue;
                };
                if !candidate.can_place_liquidity {
                    info!(
                        market = %market_id,
                        %outcome,
                        liquidity = %candidate.liquidity_ahead,
                        min_liquidity = %quote.min_liquidity,
                        "liquidity fell below minimum, cancelling"
                    );
                } else {
                    info!(
                        market = %market_id,
                        %outcome,
                        spread = %candidate.spread,
                        min_spread_cents = %quote.min_spread_cents,
                        "spread insufficient, cancelling"
                    );
                }
                let manager = Arc::clone(&self.manager);
                let events = self.events.clone();
                let timeout = self.read_lock_timeout;
                tokio::spawn(async move {
                    manager.run_cancel(outcome, guard).await;
                    emit_orders_changed(&manager, &events, timeout);
                });
            }
        }

        // Empty slots that are now admissible get (re)placed, unless a
        // place or cancel is already in flight for them.
        let need = OutcomePair::new(
            snapshot.active.yes.is_none()
                && quote.quotes.yes.can_place
                && !snapshot.in_flight(Outcome::Yes),
            snapshot.active.no.is_none()
                && quote.quotes.no.can_place
                && !snapshot.in_flight(Outcome::No),
        );

        if (need.yes || need.no) && !snapshot.placing_orders {
            let Some(guard) = self.manager.try_begin_batch() else {
                return;
            };
            for outcome in Outcome::both() {
                if *need.get(outcome) {
                    info!(
                        market = %market_id,
                        %outcome,
                        liquidity = %quote.quote(outcome).liquidity_ahead,
                        min_liquidity = %quote.min_liquidity,
                        "conditions met, placing order"
                    );
                }
            }
            let manager = Arc::clone(&self.manager);
            let events = self.events.clone();
            let timeout = self.read_lock_timeout;
            tokio::spawn(async move {
                manager
                    .run_batch_placement(guard, &quote, mid_price_yes)
                    .await;
                emit_orders_changed(&manager, &events, timeout);
            });
        }
    }
}

/// Publishes an `OrdersChanged` event from the manager's current state.
/// Best-effort: a busy lock or a full channel just drops the event.
fn emit_orders_changed<A: TradingApi, S: Signer>(
    manager: &OrderManager<A, S>,
    events: &mpsc::Sender<ControllerEvent>,
    timeout: Duration,
) {
    if let Ok(snapshot) = manager.snapshot(timeout) {
        let _ = events.try_send(ControllerEvent::OrdersChanged {
            market_id: manager.market_id().to_string(),
            active: snapshot.active,
            stats: snapshot.stats,
        });
    }
}

/// Channels into one market's controller task.
struct MarketHandle {
    books: mpsc::Sender<OrderBook>,
    commands: mpsc::Sender<ControllerCommand>,
    task: JoinHandle<()>,
}

/// Supervisor owning one controller task per market.
pub struct QuoteEngine<A, S> {
    api: Arc<A>,
    signer: Arc<S>,
    config: EngineConfig,
    events: mpsc::Sender<ControllerEvent>,
    markets: DashMap<String, MarketHandle>,
}

impl<A, S> QuoteEngine<A, S>
where
    A: TradingApi + Send + Sync + 'static,
    S: Signer + Send + Sync + 'static,
{
    pub fn new(
        api: Arc<A>,
        signer: Arc<S>,
        config: EngineConfig,
        events: mpsc::Sender<ControllerEvent>,
    ) -> Self {
        Self {
            api,
            signer,
            config,
            events,
            markets: DashMap::new(),
        }
    }

    /// Registers a market and spawns its controller.
    ///
    /// Metadata is validated here (token resolution), so a market with
    /// broken outcome data is rejected before any task exists for it.
    pub fn add_market(
        &self,
        info: MarketInfo,
        settings: TokenSettings,
    ) -> Result<(), ConfigError> {
        let market_id = info.market_id.clone();
        let manager = Arc::new(OrderManager::new(
            info,
            Arc::clone(&self.api),
            Arc::clone(&self.signer),
            self.config.retry.clone(),
            self.config.reprice.clone(),
        )?);

        let (book_tx, book_rx) = mpsc::channel(self.config.feed.buffer_size);
        let (command_tx, command_rx) = mpsc::channel(16);

        let controller = MarketController::new(
            manager,
            settings,
            self.events.clone(),
            self.config.read_lock_timeout,
        );
        let task = tokio::spawn(controller.run(book_rx, command_rx));

        self.markets.insert(
            market_id,
            MarketHandle {
                books: book_tx,
                commands: command_tx,
                task,
            },
        );
        Ok(())
    }

    /// Drops a market's channels; its controller loop ends on the closed
    /// book channel. Resting orders are left alone — use `DisableQuoting`
    /// first to flatten.
    pub fn remove_market(&self, market_id: &str) -> bool {
        self.markets.remove(market_id).is_some()
    }

    /// Routes a feed update to its market. Unknown markets are ignored.
    pub async fn route_update(&self, update: BookUpdate) {
        // Clone the sender out of the map so no shard lock is held across
        // the send.
        let sender = self
            .markets
            .get(&update.market_id)
            .map(|handle| handle.books.clone());
        if let Some(sender) = sender {
            if sender.send(update.book).await.is_err() {
                warn!(market = %update.market_id, "controller gone, dropping update");
            }
        }
    }

    /// Sends a command to one market's controller.
    pub async fn send_command(&self, market_id: &str, command: ControllerCommand) -> bool {
        let sender = self
            .markets
            .get(market_id)
            .map(|handle| handle.commands.clone());
        match sender {
            Some(sender) => sender.send(command).await.is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.markets.contains_key(market_id)
    }

    pub fn market_ids(&self) -> Vec<String> {
        self.markets.iter().map(|e| e.key().clone()).collect()
    }

    /// Aborts every controller task. For shutdown paths that do not care
    /// about resting orders.
    pub fn shutdown(&self) {
        for entry in self.markets.iter() {
            entry.value().task.abort();
        }
        self.markets.clear();
    }
}
