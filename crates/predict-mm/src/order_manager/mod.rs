//! Order Lifecycle Manager - owns per-market order state and trading I/O.
//!
//! Exactly one resting order per (market, outcome) at any time. Slot
//! transitions follow `Absent -> Placing -> Active -> Cancelling -> Absent`
//! with boolean in-flight flags checked-and-set under the market mutex
//! before any network call and cleared on every exit path, so concurrent
//! triggers (a manual toggle racing a reactive re-price) coalesce instead
//! of double-placing or double-cancelling.
//!
//! ## Failure protocol
//!
//! Place and cancel share one retry ladder (hard ceiling of 3 attempts):
//!
//! - network errors and 5xx: retry after a short fixed delay
//! - 429: retry on the venue's long fixed schedule (30 s, then 65 s)
//! - 401 "Invalid JWT": one token refresh via the signer, retried outside
//!   the attempt budget
//! - 400 insufficient collateral: list this market's open orders, cancel
//!   them, wait for funds to free, retry once
//! - any other 4xx: terminal
//!
//! All failures are contained here and returned as typed results; nothing
//! in this module panics the controller.

mod manager;
mod types;

pub use manager::{InFlightGuard, OrderManager, SharedBook};
pub use types::{ActiveOrder, CancelResult, LockTimeout, ManagerSnapshot, OrderError, OrderStats};
