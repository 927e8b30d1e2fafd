//! Display formatting for on-chain quantities.
//!
//! All amount formatting is integer arithmetic on [`U256`], so values beyond
//! `f64` precision still print exactly.

use alloy_primitives::U256;

/// Decimals of the oracle's USD valuation.
pub const USD_DECIMALS: u8 = 18;

/// `value` scaled down by `decimals` and rounded half-up to `places`
/// fractional digits, as `(whole, fraction)`.
fn fixed_point(value: U256, decimals: u8, places: u8) -> (U256, U256) {
    let ten = U256::from(10u8);
    let scaled = if decimals >= places {
        let divisor = ten.pow(U256::from(decimals - places));
        value.saturating_add(divisor / U256::from(2u8)) / divisor
    } else {
        value.saturating_mul(ten.pow(U256::from(places - decimals)))
    };
    let unit = ten.pow(U256::from(places));
    (scaled / unit, scaled % unit)
}

/// Inserts `,` between groups of three digits.
fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Formats a USD amount with exactly two decimals, e.g. `1,234.56`.
#[must_use]
pub fn format_usd(value: U256, decimals: u8) -> String {
    let (whole, fraction) = fixed_point(value, decimals, 2);
    format!("{}.{:0>2}", group_thousands(&whole.to_string()), fraction.to_string())
}

/// Formats a token amount with up to six decimals, e.g. `1,234.5`.
#[must_use]
pub fn format_token_amount(value: U256, decimals: u8) -> String {
    let (whole, fraction) = fixed_point(value, decimals, 6);
    let whole = group_thousands(&whole.to_string());
    if fraction.is_zero() {
        return whole;
    }
    let fraction = format!("{:0>6}", fraction.to_string());
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Formats basis points as a percentage, e.g. `500` → `5.00%`.
#[must_use]
pub fn format_bps(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

/// Formats the age of `timestamp` relative to `now`, e.g. `5m ago`.
///
/// A timestamp in the future reads as `0s ago`.
#[must_use]
pub fn format_time_ago(timestamp: u64, now: u64) -> String {
    let diff = now.saturating_sub(timestamp);
    if diff < 60 {
        format!("{diff}s ago")
    } else if diff < 3_600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86_400 {
        format!("{}h ago", diff / 3_600)
    } else {
        format!("{}d ago", diff / 86_400)
    }
}

/// Formats a window length, e.g. `24h`, `7d 12h`, `1h 30m`.
#[must_use]
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let mins = (secs % 3_600) / 60;

    if days > 0 {
        if hours > 0 {
            format!("{days}d {hours}h")
        } else {
            format!("{days}d")
        }
    } else if hours > 0 {
        if mins > 0 {
            format!("{hours}h {mins}m")
        } else {
            format!("{hours}h")
        }
    } else {
        format!("{mins}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(whole: u64) -> U256 {
        U256::from(whole) * U256::from(10u64).pow(U256::from(18u8))
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(usd(1_234_567), 18), "1,234,567.00");
        assert_eq!(format_usd(U256::ZERO, 18), "0.00");
        assert_eq!(format_usd(U256::from(123_456u64), 2), "1,234.56");
        // 0.005 rounds up
        assert_eq!(format_usd(U256::from(5u64) * U256::from(10u64).pow(U256::from(15u8)), 18), "0.01");
        assert_eq!(format_usd(U256::from(7u64), 0), "7.00");
    }

    #[test]
    fn test_format_usd_beyond_f64() {
        let value = U256::from(u128::MAX);
        assert_eq!(
            format_usd(value, 18),
            "340,282,366,920,938,463,463.37"
        );
    }

    #[test]
    fn test_format_token_amount() {
        assert_eq!(format_token_amount(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_token_amount(U256::from(1_000_000_000u64), 6), "1,000");
        assert_eq!(format_token_amount(U256::from(1u64), 18), "0");
        assert_eq!(format_token_amount(U256::from(123_456_789u64), 8), "1.234568");
        assert_eq!(format_token_amount(U256::from(42u64), 0), "42");
    }

    #[test]
    fn test_format_bps() {
        assert_eq!(format_bps(500), "5.00%");
        assert_eq!(format_bps(1), "0.01%");
        assert_eq!(format_bps(10_000), "100.00%");
    }

    #[test]
    fn test_format_time_ago() {
        let now = 1_700_000_000;
        assert_eq!(format_time_ago(now - 5, now), "5s ago");
        assert_eq!(format_time_ago(now - 300, now), "5m ago");
        assert_eq!(format_time_ago(now - 7_200, now), "2h ago");
        assert_eq!(format_time_ago(now - 3 * 86_400, now), "3d ago");
        assert_eq!(format_time_ago(now + 10, now), "0s ago");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(86_400), "1d");
        assert_eq!(format_duration(7 * 86_400 + 12 * 3_600), "7d 12h");
        assert_eq!(format_duration(24 * 3_600 - 1), "23h 59m");
        assert_eq!(format_duration(5_400), "1h 30m");
        assert_eq!(format_duration(3_600), "1h");
        assert_eq!(format_duration(1_800), "30m");
    }
}
