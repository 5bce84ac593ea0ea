//! Shared types for the predict.fun market-making bot.

pub mod types;

pub use types::{Outcome, OutcomePair, Side, OrderBookLevel, TokenPair};
