//! Remaining spending allowance and its risk tier.
//!
//! Everything here is pure integer arithmetic on 18-decimal USD amounts.
//! The maximum allowance truncates toward zero exactly like the contract's
//! fixed-point math, so the figure shown never exceeds what the contract will
//! actually let a sub-account spend.
//!
//! # Percentages
//!
//! Percentages are tracked in hundredths of a percent. `percent_remaining` is
//! floored to that precision and `percent_used` is its complement, so a value
//! just below a tier boundary never rounds across it.

use std::fmt;

use alloy_primitives::{Address, U256, address};
use serde::{Deserialize, Serialize};

use crate::limits::{BPS_DENOMINATOR, SubAccountLimits};
use crate::oracle::OracleSnapshot;

/// How long tokens received from protocol interactions stay exempt from the
/// spending limit (24 hours).
pub const ACQUIRED_BALANCE_EXEMPTION_SECS: u64 = 86_400;

/// Hundredths of a percent in 100 %.
const FULL_HUNDREDTHS: u16 = 10_000;

/// Below this share remaining the allowance is `Critical` (25.00 %).
const CRITICAL_BELOW: u16 = 2_500;

/// Below this share remaining the allowance is `Warning` (50.00 %).
const WARNING_BELOW: u16 = 5_000;

/// Display classification of how much allowance is left.
///
/// The thresholds are fixed display policy. The contract enforces only the
/// limit itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Less than 25 % of the allowance remains.
    Critical,
    /// Less than 50 % of the allowance remains.
    Warning,
    /// At least 50 % of the allowance remains.
    Normal,
}

impl RiskTier {
    /// Classifies a remaining share given in hundredths of a percent.
    #[must_use]
    pub const fn from_hundredths(remaining: u16) -> Self {
        if remaining < CRITICAL_BELOW {
            Self::Critical
        } else if remaining < WARNING_BELOW {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Classifies a remaining share given as a percentage.
    #[must_use]
    pub fn from_percent_remaining(percent: f64) -> Self {
        if percent < 25.0 {
            Self::Critical
        } else if percent < 50.0 {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Returns the tier as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived allowance figures for one sub-account. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendingAllowance {
    /// Portfolio value the allowance was derived from.
    pub total_value_usd: U256,
    /// `total * bps / 10000`, truncated.
    pub max_allowance_usd: U256,
    /// Amount already spent in the current window.
    pub used_usd: U256,
    /// `max - used`, clamped at zero.
    pub remaining_usd: U256,
    /// Share of the allowance spent, `0.0..=100.0`.
    pub percent_used: f64,
    /// Share of the allowance left, `0.0..=100.0`.
    pub percent_remaining: f64,
    /// Display classification of `percent_remaining`.
    pub risk_tier: RiskTier,
}

impl SpendingAllowance {
    /// Computes the allowance from the window's spent amount.
    #[must_use]
    pub fn calculate(limits: &SubAccountLimits, used_usd: U256, oracle: &OracleSnapshot) -> Self {
        let total = oracle.total_value_usd;
        let max = max_allowance(total, limits.max_spending_bps);
        let remaining = max.saturating_sub(used_usd);
        let remaining_hundredths = remaining_hundredths(remaining, max);
        let used_hundredths = if max.is_zero() {
            0
        } else {
            FULL_HUNDREDTHS - remaining_hundredths
        };

        Self {
            total_value_usd: total,
            max_allowance_usd: max,
            used_usd,
            remaining_usd: remaining,
            percent_used: f64::from(used_hundredths) / 100.0,
            percent_remaining: f64::from(remaining_hundredths) / 100.0,
            risk_tier: RiskTier::from_hundredths(remaining_hundredths),
        }
    }

    /// Computes the allowance when the contract reports the remaining amount
    /// (`getSpendingAllowance`) instead of the spent amount.
    #[must_use]
    pub fn from_remaining(
        limits: &SubAccountLimits,
        remaining_usd: U256,
        oracle: &OracleSnapshot,
    ) -> Self {
        let max = max_allowance(oracle.total_value_usd, limits.max_spending_bps);
        Self::calculate(limits, max.saturating_sub(remaining_usd), oracle)
    }
}

/// `total * bps / 10000` with truncation, without intermediate overflow.
///
/// For `bps <= 10000` this equals the truncated full-width product.
#[must_use]
pub fn max_allowance(total: U256, bps: u16) -> U256 {
    let denominator = U256::from(BPS_DENOMINATOR);
    let bps = U256::from(bps.min(BPS_DENOMINATOR));
    (total / denominator) * bps + (total % denominator) * bps / denominator
}

/// `floor(remaining / max * 10000)`, or `0` when `max` is zero.
fn remaining_hundredths(remaining: U256, max: U256) -> u16 {
    if max.is_zero() {
        return 0;
    }
    let full = U256::from(FULL_HUNDREDTHS);
    let scaled = remaining.checked_mul(full).map_or_else(
        || remaining / (max / full),
        |numerator| numerator / max,
    );
    u16::try_from(scaled.min(full)).unwrap_or(FULL_HUNDREDTHS)
}

/// A token whose acquired balance is shown to sub-accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackedToken {
    /// Ticker symbol.
    pub symbol: String,
    /// Token contract.
    pub address: Address,
    /// ERC-20 decimals.
    pub decimals: u8,
}

impl TrackedToken {
    /// Creates a tracked token entry.
    #[must_use]
    pub fn new(symbol: impl Into<String>, address: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            address,
            decimals,
        }
    }
}

/// Common Base mainnet tokens.
#[must_use]
pub fn default_tracked_tokens() -> Vec<TrackedToken> {
    vec![
        TrackedToken::new("USDC", address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), 6),
        TrackedToken::new("WETH", address!("4200000000000000000000000000000000000006"), 18),
        TrackedToken::new("USDT", address!("fde4C96c8593536E31F229EA8f37b2ADa2699bb2"), 6),
        TrackedToken::new("WBTC", address!("29f2D40B0605204364af54EC677bD022dA425d03"), 8),
        TrackedToken::new("DAI", address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb"), 18),
    ]
}

/// Balance a sub-account received from protocol interactions.
///
/// These tokens are exempt from the spending limit for
/// [`ACQUIRED_BALANCE_EXEMPTION_SECS`] and are never subtracted from the
/// window's spent amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredBalance {
    /// Token contract.
    pub token: Address,
    /// Ticker symbol.
    pub symbol: String,
    /// ERC-20 decimals.
    pub decimals: u8,
    /// Raw balance in the token's smallest unit.
    pub balance: U256,
}

impl AcquiredBalance {
    /// Returns `true` if anything was acquired.
    #[must_use]
    pub fn is_nonzero(&self) -> bool {
        !self.balance.is_zero()
    }
}
