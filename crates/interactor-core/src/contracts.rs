//! Typed ABI bindings for the interactor contract and its controlling Safe.
//!
//! Uses alloy's `sol!` macro to generate call encoders and return decoders.
//! Only the surface this client touches is declared.

use std::fmt;

use alloy_sol_types::{SolCall, sol};
use serde::{Deserialize, Serialize};

sol! {
    /// Read and write surface of the delegated-permission interactor module.
    interface IDeFiInteractor {
        function hasRole(address member, uint16 roleId) external view returns (bool);
        function getSubAccountLimits(address subAccount) external view returns (uint256 maxSpendingBps, uint256 windowDuration);
        function allowedAddresses(address subAccount, address target) external view returns (bool);
        function paused() external view returns (bool);
        function avatar() external view returns (address);
        function getSafeValue() external view returns (uint256 totalValueUSD, uint256 lastUpdated, uint256 updateCount);
        function isValueStale(uint256 maxAge) external view returns (bool);
        function getAcquiredBalance(address subAccount, address token) external view returns (uint256);
        function getSubaccountsByRole(uint16 roleId) external view returns (address[]);
        function getSpendingAllowance(address subAccount) external view returns (uint256);

        function grantRole(address member, uint16 roleId) external;
        function revokeRole(address member, uint16 roleId) external;
        function setSubAccountLimits(address subAccount, uint256 maxSpendingBps, uint256 windowDuration) external;
        function setAllowedAddresses(address subAccount, address[] targets, bool allowed) external;
        function pause() external;
        function unpause() external;

        function approveProtocol(address token, address target, uint256 amount) external;
        function executeOnProtocol(address target, bytes data) external returns (bytes result);
        function transferToken(address token, address recipient, uint256 amount) external returns (bool success);
    }

    /// Aave V3 pool deposit, wrapped in `executeOnProtocol`.
    interface IAaveV3Pool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
    }

    /// Owner query on the Safe itself.
    interface ISafe {
        function getOwners() external view returns (address[]);
    }
}

/// Returns the bare function name of a generated call type, e.g. `hasRole`.
///
/// This is the name used as the first component of every read cache key.
#[must_use]
pub fn function_name<C: SolCall>() -> &'static str {
    let signature = C::SIGNATURE;
    signature.split_once('(').map_or(signature, |(name, _)| name)
}

/// A sub-account capability granted through the interactor's role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May execute generic protocol interactions, bounded by the portfolio
    /// loss limit.
    Execute,
    /// May transfer tokens out of the Safe, bounded by the spending limit.
    Transfer,
}

impl Role {
    /// Every role, in display order.
    pub const ALL: [Self; 2] = [Self::Execute, Self::Transfer];

    /// The on-chain role id.
    #[must_use]
    pub const fn id(self) -> u16 {
        match self {
            Self::Execute => 3,
            Self::Transfer => 4,
        }
    }

    /// Looks up a role by its on-chain id.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            3 => Some(Self::Execute),
            4 => Some(Self::Transfer),
            _ => None,
        }
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Execute => "Execute",
            Self::Transfer => "Transfer",
        }
    }

    /// One-line description of what holding the role allows.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Execute => {
                "Can execute generic protocol interactions (limited by portfolio loss %)"
            },
            Self::Transfer => "Can transfer tokens from Safe (configurable % per window)",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
