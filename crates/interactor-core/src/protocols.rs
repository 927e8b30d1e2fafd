//! Catalog of DeFi protocol contracts a sub-account can be allowed to call.

use alloy_primitives::{Address, address};
use serde::Serialize;

/// One callable protocol contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtocolContract {
    /// Stable identifier, e.g. `aave-pool`.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Contract address.
    pub address: Address,
    /// What the contract is used for.
    pub description: &'static str,
}

/// A protocol and its callable contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Protocol {
    /// Stable identifier, e.g. `uniswap`.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Callable contracts.
    pub contracts: &'static [ProtocolContract],
}

/// Uniswap routers and position managers.
pub const UNISWAP: Protocol = Protocol {
    id: "uniswap",
    name: "Uniswap",
    description: "Decentralized exchange protocol",
    contracts: &[
        ProtocolContract {
            id: "uniswap-swap-router-v3",
            name: "SwapRouter02 (V3)",
            address: address!("3bFA4769FB09eefC5a80d6E87c3B9C650f7Ae48E"),
            description: "Uniswap V3 swap router for token swaps",
        },
        ProtocolContract {
            id: "uniswap-position-manager-v3",
            name: "NonfungiblePositionManager (V3)",
            address: address!("1238536071E1c677A632429e3655c799b22cDA52"),
            description: "Manage Uniswap V3 liquidity positions",
        },
        ProtocolContract {
            id: "uniswap-universal-router",
            name: "Universal Router",
            address: address!("3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD"),
            description: "Universal router for swaps and liquidity",
        },
        ProtocolContract {
            id: "uniswap-position-manager-v4",
            name: "PositionManager (V4)",
            address: address!("429ba70129df741b2ca2a85bc3a2a3328e5c09b4"),
            description: "Manage Uniswap V4 liquidity positions",
        },
    ],
};

/// Aave V3 pool on Base.
pub const AAVE_V3_POOL: Address = address!("6Ae43d3271ff6888e7Fc43Fd7321a503ff738951");

/// Aave V3 lending pool and rewards.
pub const AAVE: Protocol = Protocol {
    id: "aave",
    name: "Aave V3",
    description: "Decentralized lending and borrowing protocol",
    contracts: &[
        ProtocolContract {
            id: "aave-pool",
            name: "Pool",
            address: AAVE_V3_POOL,
            description: "Main Aave V3 lending pool",
        },
        ProtocolContract {
            id: "aave-rewards-controller",
            name: "RewardsController",
            address: address!("8164Cc65827dcFe994AB23944CBC90e0aa80bFcb"),
            description: "Claim Aave protocol rewards",
        },
    ],
};

/// Merkl reward distribution.
pub const MERKL: Protocol = Protocol {
    id: "merkl",
    name: "Merkl",
    description: "Merkl reward distribution protocol",
    contracts: &[ProtocolContract {
        id: "merkl-distributor",
        name: "Distributor",
        address: address!("3Ef3D8bA38EBe18DB133cEc108f4D14CE00Dd9Ae"),
        description: "Claim Merkl protocol rewards",
    }],
};

/// Every known protocol, in display order.
pub const PROTOCOLS: &[Protocol] = &[UNISWAP, AAVE, MERKL];

/// Looks up a protocol by id.
#[must_use]
pub fn protocol_by_id(id: &str) -> Option<&'static Protocol> {
    PROTOCOLS.iter().find(|protocol| protocol.id == id)
}

/// Contract addresses of protocol `id`; empty for an unknown id.
#[must_use]
pub fn contract_addresses(id: &str) -> Vec<Address> {
    protocol_by_id(id)
        .map(|protocol| protocol.contracts.iter().map(|c| c.address).collect())
        .unwrap_or_default()
}

/// Returns `true` if `address` belongs to any known protocol.
#[must_use]
pub fn is_protocol_contract(address: &Address) -> bool {
    PROTOCOLS
        .iter()
        .flat_map(|protocol| protocol.contracts)
        .any(|contract| contract.address == *address)
}

/// Every protocol contract address, in catalog order.
#[must_use]
pub fn all_contract_addresses() -> Vec<Address> {
    PROTOCOLS
        .iter()
        .flat_map(|protocol| protocol.contracts)
        .map(|contract| contract.address)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::address::parse_account_address;

    #[test]
    fn test_lookup() {
        assert_eq!(protocol_by_id("aave").map(|p| p.name), Some("Aave V3"));
        assert!(protocol_by_id("compound").is_none());
        assert_eq!(contract_addresses("uniswap").len(), 4);
        assert!(contract_addresses("compound").is_empty());
    }

    #[test]
    fn test_membership_ignores_input_case() {
        let lower = parse_account_address("0x6ae43d3271ff6888e7fc43fd7321a503ff738951").unwrap();
        assert!(is_protocol_contract(&lower));
        assert!(!is_protocol_contract(&Address::ZERO));
    }

    #[test]
    fn test_ids_and_addresses_unique() {
        let all = all_contract_addresses();
        assert_eq!(all.len(), 7);
        assert_eq!(all.iter().collect::<HashSet<_>>().len(), all.len());

        let ids: HashSet<_> = PROTOCOLS
            .iter()
            .flat_map(|p| p.contracts)
            .map(|c| c.id)
            .collect();
        assert_eq!(ids.len(), 7);
    }
}
