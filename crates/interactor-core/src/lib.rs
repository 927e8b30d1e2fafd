//! # interactor-core
//!
//! Client library for a delegated-permission DeFi interactor: a contract,
//! controlled by a Safe multisig, that lets sub-accounts interact with DeFi
//! protocols and move funds within owner-defined limits.
//!
//! The crate covers everything between the user and the chain:
//!
//! - [`registry`]: which interactor contract is selected, and where that
//!   choice is persisted
//! - [`reader`]: cached, typed reads of roles, limits, allowed targets, the
//!   oracle valuation and acquired balances
//! - [`allowance`]: the remaining spending allowance and its risk tier
//! - [`proposal`]: building, signing and confirming Safe transactions that
//!   change permissions, followed by cache invalidation
//! - [`accounts`]: the union of every account holding a role
//! - [`operations`]: calls a sub-account sends itself, such as an Aave
//!   supply routed through `executeOnProtocol`, with a permission preflight
//!
//! ## Data flow
//!
//! ```text
//! AddressRegistry ──watch──► PermissionReader ──► ReadCache ◄── ProposalLifecycle
//!        │                         │                               │
//!        ▼                         ▼                               ▼
//!   AddressStore              ChainClient                    MultisigSigner
//! ```
//!
//! The registry is the only writer of the selected contract; every other
//! component holds a `watch::Receiver` of it.
//!
//! ## Example
//!
//! ```rust
//! use alloy_primitives::U256;
//! use interactor_core::{OracleSnapshot, RiskTier, SpendingAllowance, SubAccountLimits};
//!
//! // 5 % of a 1,000,000 portfolio per day, half of it spent.
//! let limits = SubAccountLimits::new(500, 86_400);
//! let oracle = OracleSnapshot {
//!     total_value_usd: U256::from(1_000_000u64),
//!     last_updated: 0,
//!     update_count: 1,
//! };
//! let allowance = SpendingAllowance::calculate(&limits, U256::from(25_000u64), &oracle);
//!
//! assert_eq!(allowance.max_allowance_usd, U256::from(50_000u64));
//! assert_eq!(allowance.remaining_usd, U256::from(25_000u64));
//! assert_eq!(allowance.risk_tier, RiskTier::Normal);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accounts;
pub mod address;
pub mod allowance;
pub mod cache;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod format;
pub mod limits;
pub mod log;
pub mod operations;
pub mod oracle;
pub mod proposal;
pub mod protocols;
pub mod reader;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export main types at crate root for convenience
pub use accounts::{ManagedAccountAggregator, SubAccount, merge_role_sets};
pub use address::{AddressError, is_account_address, parse_account_address};
pub use allowance::{AcquiredBalance, RiskTier, SpendingAllowance, TrackedToken};
pub use cache::{
    Generation, QueryKey, ReadCache, ReadCacheConfig, SharedReadCache, new_shared_cache,
};
pub use chain::{ChainClient, ChainError, JsonRpcChainClient, SharedChainClient, TxReceipt};
pub use config::{ClientConfig, ConfigError};
pub use contracts::Role;
pub use error::{ErrorClass, InteractorError};
pub use limits::{LimitsError, SubAccountLimits};
pub use operations::{OperationError, SubAccountOperation, parse_amount, parse_calldata, preflight};
pub use oracle::{OracleHealth, OracleSnapshot};
pub use proposal::{
    MultisigSigner, ProposalError, ProposalLifecycle, ProposalOutcome, ProposalStatus,
    ProposeOptions, TransactionBatch, TransactionRequest, TransactionType,
};
pub use reader::{PermissionReader, ReadError};
pub use registry::{
    AddressRegistry, AddressStore, ContractAddressConfig, FileAddressStore, MemoryAddressStore,
    QueryParams, RegistryError,
};
