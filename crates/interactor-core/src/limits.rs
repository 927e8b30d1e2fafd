//! Sub-account spending limits and their client-side validation.
//!
//! A limit caps how much of the total portfolio value (in basis points) a
//! sub-account may move within a rolling window. The contract is the final
//! arbiter; [`SubAccountLimits::validate`] only rejects values the contract
//! would refuse anyway, before a proposal is built.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis-points denominator: 10 000 bps = 100 %.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Shortest window accepted for a proposal (one hour).
pub const MIN_WINDOW_SECS: u64 = 3_600;

/// Longest window accepted for a proposal (one week).
pub const MAX_WINDOW_SECS: u64 = 604_800;

/// Range errors raised before proposing new limits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitsError {
    /// The spending share exceeds 100 %.
    #[error("max spending must be between 0 and {max} bps, got {value}")]
    BpsOutOfRange {
        /// The rejected value.
        value: u64,
        /// Upper bound.
        max: u16,
    },

    /// The window is shorter than an hour or longer than a week.
    #[error("window duration must be between {min}s and {max}s, got {value}s")]
    WindowOutOfRange {
        /// The rejected value.
        value: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// A user-entered number was negative, NaN or infinite.
    #[error("invalid {field}: {value}")]
    InvalidInput {
        /// Which input was rejected.
        field: &'static str,
        /// The rejected input, as entered.
        value: String,
    },
}

/// Spending limits configured for one sub-account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubAccountLimits {
    /// Maximum share of the portfolio spendable per window, in bps.
    pub max_spending_bps: u16,
    /// Rolling window length in seconds.
    pub window_duration_secs: u64,
}

impl SubAccountLimits {
    /// Creates limits without validating them.
    #[must_use]
    pub const fn new(max_spending_bps: u16, window_duration_secs: u64) -> Self {
        Self {
            max_spending_bps,
            window_duration_secs,
        }
    }

    /// Creates limits and validates them for a proposal.
    pub fn checked(max_spending_bps: u64, window_duration_secs: u64) -> Result<Self, LimitsError> {
        let bps = u16::try_from(max_spending_bps)
            .ok()
            .filter(|bps| *bps <= BPS_DENOMINATOR)
            .ok_or(LimitsError::BpsOutOfRange {
                value: max_spending_bps,
                max: BPS_DENOMINATOR,
            })?;
        let limits = Self::new(bps, window_duration_secs);
        limits.validate()?;
        Ok(limits)
    }

    /// Converts form input (a percentage and a window in hours) into limits.
    ///
    /// Both values are floored, so `12.345 %` becomes `1234` bps and `1.5 h`
    /// becomes `5400` s.
    pub fn from_percent_and_hours(percent: f64, hours: f64) -> Result<Self, LimitsError> {
        let bps = floor_non_negative("spending percentage", percent * 100.0)?;
        let window = floor_non_negative("window hours", hours * 3_600.0)?;
        Self::checked(bps, window)
    }

    /// Decodes the pair returned by `getSubAccountLimits`.
    ///
    /// Returns `None` if either word does not fit the local representation.
    #[must_use]
    pub fn from_words(max_spending_bps: U256, window_duration: U256) -> Option<Self> {
        Some(Self::new(
            u16::try_from(max_spending_bps).ok()?,
            u64::try_from(window_duration).ok()?,
        ))
    }

    /// Checks the proposal ranges: `bps <= 10000` and
    /// `3600 <= window <= 604800`.
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.max_spending_bps > BPS_DENOMINATOR {
            return Err(LimitsError::BpsOutOfRange {
                value: u64::from(self.max_spending_bps),
                max: BPS_DENOMINATOR,
            });
        }
        if self.window_duration_secs < MIN_WINDOW_SECS
            || self.window_duration_secs > MAX_WINDOW_SECS
        {
            return Err(LimitsError::WindowOutOfRange {
                value: self.window_duration_secs,
                min: MIN_WINDOW_SECS,
                max: MAX_WINDOW_SECS,
            });
        }
        Ok(())
    }

    /// Spending share as a percentage, e.g. `500` bps → `5.0`.
    #[must_use]
    pub fn max_spending_percent(&self) -> f64 {
        f64::from(self.max_spending_bps) / 100.0
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // guarded above
fn floor_non_negative(field: &'static str, value: f64) -> Result<u64, LimitsError> {
    if !value.is_finite() || value < 0.0 {
        return Err(LimitsError::InvalidInput {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.floor() as u64)
}
