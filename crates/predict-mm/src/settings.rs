//! Per-market quoting settings.
//!
//! Settings are owned by the caller's configuration layer; the engine only
//! reads them. Position size is either a USDT notional or a share count,
//! never both — the enum makes the invariant unrepresentable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Position size for one quote, in exactly one of two denominations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSize {
    /// Notional in USDT; shares are derived as `usdt / price`.
    Usdt(Decimal),
    /// Fixed share count, used directly.
    Shares(Decimal),
}

/// Quoting settings for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Fixed-spread mode: distance from mid as a percentage.
    pub spread_percent: Decimal,
    /// Position size; `None` means the market cannot be quoted until the
    /// caller sets one (a configuration error, not a transient failure).
    pub position_size: Option<PositionSize>,
    /// Minimum resting depth ahead of our order, in USDT (fixed-spread mode).
    pub min_liquidity_usdt: Decimal,
    /// Minimum distance from mid, in cents, checked only at the price floor.
    pub min_spread_cents: Decimal,
    /// Whether quoting is enabled for this market.
    pub enabled: bool,
    /// Auto-spread mode: price at a target depth instead of a fixed spread.
    pub auto_spread_enabled: bool,
    /// Target depth ahead of our order for auto-spread, in USDT.
    pub target_liquidity_usdt: Decimal,
    /// Cap on how far from mid auto-spread may price, in cents.
    pub max_auto_spread_cents: Decimal,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            spread_percent: dec!(3.0),
            position_size: Some(PositionSize::Usdt(dec!(100))),
            min_liquidity_usdt: dec!(300),
            min_spread_cents: dec!(0.2),
            enabled: true,
            auto_spread_enabled: false,
            target_liquidity_usdt: dec!(1000),
            max_auto_spread_cents: dec!(6.0),
        }
    }
}

impl TokenSettings {
    /// Liquidity threshold that gates placement: the auto-spread target when
    /// auto-spread is on, else the plain minimum.
    pub fn effective_min_liquidity(&self) -> Decimal {
        if self.auto_spread_enabled {
            self.target_liquidity_usdt
        } else {
            self.min_liquidity_usdt
        }
    }

    /// Minimum spread converted from cents to dollars.
    pub fn min_spread_dollars(&self) -> Decimal {
        self.min_spread_cents / dec!(100)
    }

    /// Auto-spread cap converted from cents to dollars.
    pub fn max_auto_spread_dollars(&self) -> Decimal {
        self.max_auto_spread_cents / dec!(100)
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.spread_percent {
            self.spread_percent = v;
        }
        if let Some(v) = update.position_size {
            self.position_size = Some(v);
        }
        if let Some(v) = update.min_liquidity_usdt {
            self.min_liquidity_usdt = v;
        }
        if let Some(v) = update.min_spread_cents {
            self.min_spread_cents = v;
        }
        if let Some(v) = update.enabled {
            self.enabled = v;
        }
        if let Some(v) = update.auto_spread_enabled {
            self.auto_spread_enabled = v;
        }
        if let Some(v) = update.target_liquidity_usdt {
            self.target_liquidity_usdt = v;
        }
        if let Some(v) = update.max_auto_spread_cents {
            self.max_auto_spread_cents = v;
        }
    }
}

/// Partial settings update; `None` fields are left unchanged.
///
/// Setting `position_size` replaces the previous denomination wholesale, so
/// switching between USDT and shares clears the other automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub spread_percent: Option<Decimal>,
    pub position_size: Option<PositionSize>,
    pub min_liquidity_usdt: Option<Decimal>,
    pub min_spread_cents: Option<Decimal>,
    pub enabled: Option<bool>,
    pub auto_spread_enabled: Option<bool>,
    pub target_liquidity_usdt: Option<Decimal>,
    pub max_auto_spread_cents: Option<Decimal>,
}

impl SettingsUpdate {
    pub fn position_size_usdt(usdt: Decimal) -> Self {
        Self {
            position_size: Some(PositionSize::Usdt(usdt)),
            ..Default::default()
        }
    }

    pub fn position_size_shares(shares: Decimal) -> Self {
        Self {
            position_size: Some(PositionSize::Shares(shares)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_venue_conventions() {
        let settings = TokenSettings::default();
        assert_eq!(settings.spread_percent, dec!(3.0));
        assert_eq!(settings.position_size, Some(PositionSize::Usdt(dec!(100))));
        assert_eq!(settings.min_liquidity_usdt, dec!(300));
        assert_eq!(settings.min_spread_cents, dec!(0.2));
        assert!(settings.enabled);
        assert!(!settings.auto_spread_enabled);
        assert_eq!(settings.target_liquidity_usdt, dec!(1000));
        assert_eq!(settings.max_auto_spread_cents, dec!(6.0));
    }

    #[test]
    fn test_position_size_is_mutually_exclusive() {
        let mut settings = TokenSettings::default();

        settings.apply(SettingsUpdate::position_size_shares(dec!(50)));
        assert_eq!(settings.position_size, Some(PositionSize::Shares(dec!(50))));

        settings.apply(SettingsUpdate::position_size_usdt(dec!(200)));
        assert_eq!(settings.position_size, Some(PositionSize::Usdt(dec!(200))));

        // After any sequence of updates exactly one denomination is active.
        match settings.position_size {
            Some(PositionSize::Usdt(_)) | Some(PositionSize::Shares(_)) | None => {}
        }
    }

    #[test]
    fn test_apply_leaves_unset_fields_untouched() {
        let mut settings = TokenSettings::default();
        settings.apply(SettingsUpdate {
            min_liquidity_usdt: Some(dec!(500)),
            ..Default::default()
        });

        assert_eq!(settings.min_liquidity_usdt, dec!(500));
        assert_eq!(settings.spread_percent, dec!(3.0));
        assert!(settings.enabled);
    }

    #[test]
    fn test_effective_min_liquidity() {
        let mut settings = TokenSettings::default();
        assert_eq!(settings.effective_min_liquidity(), dec!(300));

        settings.auto_spread_enabled = true;
        assert_eq!(settings.effective_min_liquidity(), dec!(1000));
    }

    #[test]
    fn test_cent_conversions() {
        let settings = TokenSettings::default();
        assert_eq!(settings.min_spread_dollars(), dec!(0.002));
        assert_eq!(settings.max_auto_spread_dollars(), dec!(0.06));
    }
}
