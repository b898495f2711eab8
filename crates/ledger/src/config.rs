//! Ledger configuration loaded from environment variables.

use std::time::Duration;

/// Tunables for the ledger engine.
///
/// Reads from environment variables:
/// - `LEDGER_RESERVATION_MINUTES`: default reservation lifetime (default: `30`)
/// - `LEDGER_MAX_RESERVATION_MINUTES`: longest lifetime a caller may request (default: `525600`, one year)
/// - `LEDGER_LARGE_ADJUSTMENT_THRESHOLD`: adjustment size that needs approval (default: `100`)
/// - `LEDGER_SWEEP_INTERVAL_SECS`: expiry sweep period (default: `60`)
/// - `LEDGER_RECENT_MOVEMENT_LIMIT`: movements shown in a stock summary (default: `10`)
/// - `LEDGER_RECENT_MOVEMENT_DAYS`: look-back window of a stock summary (default: `7`)
/// - `LEDGER_EVENT_CAPACITY`: buffered events per subscriber (default: `1024`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub default_reservation_minutes: i64,
    pub max_reservation_minutes: i64,
    pub large_adjustment_threshold: i64,
    pub sweep_interval: Duration,
    pub recent_movement_limit: usize,
    pub recent_movement_days: i64,
    pub event_capacity: usize,
}

impl LedgerConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;

        Self {
            default_reservation_minutes: parsed(lookup, "LEDGER_RESERVATION_MINUTES")
                .filter(|m: &i64| *m > 0)
                .unwrap_or(defaults.default_reservation_minutes),
            max_reservation_minutes: parsed(lookup, "LEDGER_MAX_RESERVATION_MINUTES")
                .filter(|m: &i64| *m > 0)
                .unwrap_or(defaults.max_reservation_minutes),
            large_adjustment_threshold: parsed(lookup, "LEDGER_LARGE_ADJUSTMENT_THRESHOLD")
                .unwrap_or(defaults.large_adjustment_threshold),
            sweep_interval: parsed(lookup, "LEDGER_SWEEP_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            recent_movement_limit: parsed(lookup, "LEDGER_RECENT_MOVEMENT_LIMIT")
                .unwrap_or(defaults.recent_movement_limit),
            recent_movement_days: parsed(lookup, "LEDGER_RECENT_MOVEMENT_DAYS")
                .unwrap_or(defaults.recent_movement_days),
            event_capacity: parsed(lookup, "LEDGER_EVENT_CAPACITY")
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.event_capacity),
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_reservation_minutes: 30,
            max_reservation_minutes: 525_600,
            large_adjustment_threshold: 100,
            sweep_interval: Duration::from_secs(60),
            recent_movement_limit: 10,
            recent_movement_days: 7,
            event_capacity: 1024,
        }
    }
}
