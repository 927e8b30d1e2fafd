//! Oracle-reported portfolio valuation and its freshness.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Default age after which the portfolio value is considered stale (1 hour).
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3_600;

/// Age after which an update is shown as merely "updated" rather than live.
const UPDATED_AFTER_SECS: u64 = 900;

/// Age after which a fresh update is shown as "active".
const ACTIVE_AFTER_SECS: u64 = 300;

/// Snapshot returned by `getSafeValue()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSnapshot {
    /// Total portfolio value in USD, 18-decimal fixed point.
    pub total_value_usd: U256,
    /// Unix timestamp of the last oracle update.
    pub last_updated: u64,
    /// Number of updates the oracle has pushed.
    pub update_count: u64,
}

impl OracleSnapshot {
    /// Seconds since the last update, saturating at zero for clock skew.
    #[must_use]
    pub const fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_updated)
    }

    /// `true` when the snapshot is older than `threshold_secs` or the
    /// contract flagged it stale itself.
    #[must_use]
    pub const fn is_stale(&self, now: u64, threshold_secs: u64, contract_flag: bool) -> bool {
        contract_flag || self.age_secs(now) > threshold_secs
    }

    /// Display classification of the oracle feed.
    #[must_use]
    pub const fn health(&self, now: u64, contract_flag: bool) -> OracleHealth {
        OracleHealth::classify(self.age_secs(now), contract_flag)
    }
}

/// How confident the displayed figures are, based on oracle age.
///
/// `Stale` degrades confidence but never blocks interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleHealth {
    /// Updated within the last five minutes.
    Fresh,
    /// Updated within the last fifteen minutes.
    Active,
    /// Updated within the last hour.
    Updated,
    /// Older than an hour, or flagged stale by the contract.
    Stale,
}

impl OracleHealth {
    /// Classifies an update age.
    #[must_use]
    pub const fn classify(age_secs: u64, contract_flag: bool) -> Self {
        if contract_flag || age_secs > DEFAULT_STALE_THRESHOLD_SECS {
            Self::Stale
        } else if age_secs > UPDATED_AFTER_SECS {
            Self::Updated
        } else if age_secs > ACTIVE_AFTER_SECS {
            Self::Active
        } else {
            Self::Fresh
        }
    }

    /// Returns the state as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Active => "active",
            Self::Updated => "updated",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for OracleHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
