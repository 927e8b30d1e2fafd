//! Canonical account-address syntax.
//!
//! An address is accepted when it is `0x` followed by exactly 40 hex digits.
//! All-lowercase and all-uppercase digits are taken as-is; mixed case must be
//! a valid EIP-55 checksum, otherwise the input is rejected. This matches what
//! wallets and block explorers treat as a well-formed address.

use alloy_primitives::Address;
use thiserror::Error;

/// Number of hex digits in a 20-byte account address.
const ADDRESS_HEX_LEN: usize = 40;

/// Errors produced while parsing an account address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The input is not `0x` + 40 hex digits.
    #[error("invalid address format: {input:?}")]
    InvalidFormat {
        /// The rejected input.
        input: String,
    },

    /// The input mixes letter case but is not a valid EIP-55 checksum.
    #[error("invalid address checksum: {input}")]
    InvalidChecksum {
        /// The rejected input.
        input: String,
    },
}

impl AddressError {
    fn invalid_format(input: &str) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
        }
    }
}

/// Parses `input` as a canonical account address.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`AddressError::InvalidFormat`] if the syntax is wrong and
/// [`AddressError::InvalidChecksum`] if a mixed-case input fails EIP-55.
pub fn parse_account_address(input: &str) -> Result<Address, AddressError> {
    let trimmed = input.trim();
    let Some(digits) = trimmed.strip_prefix("0x") else {
        return Err(AddressError::invalid_format(input));
    };
    if digits.len() != ADDRESS_HEX_LEN || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AddressError::invalid_format(input));
    }

    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(trimmed, None).map_err(|_| {
            AddressError::InvalidChecksum {
                input: trimmed.to_string(),
            }
        });
    }

    trimmed
        .parse::<Address>()
        .map_err(|_| AddressError::invalid_format(input))
}

/// Returns `true` if `input` is a canonical account address.
#[must_use]
pub fn is_account_address(input: &str) -> bool {
    parse_account_address(input).is_ok()
}

/// Lowercase `0x`-prefixed hex form, used for storage keys and comparisons.
#[must_use]
pub fn lower_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}
