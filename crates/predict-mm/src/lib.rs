//! Two-sided quoting engine for predict.fun binary markets.
//!
//! For each subscribed market the engine computes a Yes bid and a No bid
//! from the live order book, decides whether quoting conditions are met,
//! and keeps at most one resting order per outcome synchronized with
//! changing depth.
//!
//! ## Architecture
//!
//! ```text
//! MarketFeed ──► MarketController ──► calculator (pure) ──► decision
//!                      │                                       │
//!                      ◄── ControllerEvent ◄── OrderManager ◄──┘
//!                                                  │
//!                                            TradingApi / Signer
//! ```
//!
//! ## Modules
//!
//! - `calculator`: pure quote math (depth walker, tick/share rounding)
//! - `order_manager`: per-market order lifecycle with retry/reconciliation
//! - `controller`: reactive loop binding book updates to order actions
//! - `api`: trading REST boundary
//! - `signer`: opaque order-signing and auth-refresh boundary
//! - `feed`: WebSocket order-book feed
//! - `config`: engine configuration with the venue's defaults

pub mod api;
pub mod calculator;
pub mod config;
pub mod controller;
pub mod feed;
pub mod order_manager;
pub mod settings;
pub mod signer;
pub mod types;

pub use api::{ApiError, OpenOrder, PlacedOrder, RestTradingApi, TradingApi};
pub use calculator::{OutcomeQuote, QuoteResult};
pub use config::{ApiConfig, EngineConfig, FeedConfig, RepriceConfig, RetryConfig};
pub use controller::{ControllerCommand, ControllerEvent, MarketController, QuoteEngine};
pub use feed::{BookUpdate, FeedError, MarketFeed};
pub use order_manager::{
    ActiveOrder, CancelResult, LockTimeout, ManagerSnapshot, OrderError, OrderManager,
    OrderStats, SharedBook,
};
pub use settings::{PositionSize, SettingsUpdate, TokenSettings};
pub use signer::{OrderSigningRequest, SignedOrderPayload, Signer, SignerError};
pub use types::{ConfigError, MarketInfo, OrderBook, OutcomeInfo};
