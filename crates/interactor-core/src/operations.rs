//! Operations a sub-account sends to the interactor from its own wallet.
//!
//! Proposals change permissions and go through the Safe owners. These calls
//! are the other side: a sub-account holding a role asks the interactor to
//! approve a protocol, call a protocol, or transfer a token on the Safe's
//! behalf. The contract enforces role, target and spending window;
//! [`preflight`] checks role, target and pause state against current chain
//! state so a transaction that would revert is caught before it is signed.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::contracts::{IAaveV3Pool, IDeFiInteractor, Role};
use crate::proposal::TransactionRequest;
use crate::reader::{PermissionReader, ReadError};

/// Errors raised while building or checking a sub-account operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The amount is not a non-negative integer in base units.
    #[error("invalid amount '{input}': expected an integer in token base units")]
    InvalidAmount {
        /// The rejected input.
        input: String,
    },

    /// A zero amount would be a no-op the contract rejects.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The protocol call data is not hex.
    #[error("invalid call data '{input}': expected 0x-prefixed hex")]
    InvalidCalldata {
        /// The rejected input.
        input: String,
    },

    /// Protocol call data needs at least a function selector.
    #[error("protocol call data must start with a 4-byte function selector")]
    MissingSelector,

    /// The interactor is paused.
    #[error("interactor is paused; sub-account operations are rejected")]
    Paused,

    /// The account lacks the role the operation needs.
    #[error("{account} does not hold the {role} role")]
    MissingRole {
        /// The sub-account.
        account: Address,
        /// The required role.
        role: Role,
    },

    /// The protocol contract is not on the account's allow list.
    #[error("{account} is not allowed to call {target}")]
    TargetNotAllowed {
        /// The sub-account.
        account: Address,
        /// The protocol contract.
        target: Address,
    },

    /// A permission read failed.
    #[error(transparent)]
    Read(#[from] ReadError),
}

impl OperationError {
    /// Returns `true` if the input itself was malformed.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::ZeroAmount
                | Self::InvalidCalldata { .. }
                | Self::MissingSelector
        )
    }
}

/// A call a sub-account makes on the interactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubAccountOperation {
    /// Let `target` pull `amount` of `token` from the Safe.
    ApproveProtocol {
        /// Token to approve.
        token: Address,
        /// Protocol contract receiving the allowance.
        target: Address,
        /// Allowance in token base units.
        amount: U256,
    },

    /// Forward `data` to `target` from the Safe.
    ExecuteOnProtocol {
        /// Protocol contract.
        target: Address,
        /// ABI-encoded protocol call.
        data: Bytes,
    },

    /// Move `amount` of `token` from the Safe to `recipient`.
    TransferToken {
        /// Token to move.
        token: Address,
        /// Receiver.
        recipient: Address,
        /// Amount in token base units.
        amount: U256,
    },
}

impl SubAccountOperation {
    /// Aave V3 `supply` of `amount` of `asset` into `pool`, credited to
    /// `safe`.
    #[must_use]
    pub fn aave_supply(pool: Address, asset: Address, amount: U256, safe: Address) -> Self {
        let supply = IAaveV3Pool::supplyCall {
            asset,
            amount,
            onBehalfOf: safe,
            referralCode: 0,
        };
        Self::ExecuteOnProtocol {
            target: pool,
            data: Bytes::from(supply.abi_encode()),
        }
    }

    /// The two calls of an Aave deposit: approve the pool for `asset`, then
    /// supply through it.
    #[must_use]
    pub fn aave_deposit(pool: Address, asset: Address, amount: U256, safe: Address) -> [Self; 2] {
        [
            Self::ApproveProtocol {
                token: asset,
                target: pool,
                amount,
            },
            Self::aave_supply(pool, asset, amount, safe),
        ]
    }

    /// Interactor function the operation calls.
    #[must_use]
    pub const fn function_name(&self) -> &'static str {
        match self {
            Self::ApproveProtocol { .. } => "approveProtocol",
            Self::ExecuteOnProtocol { .. } => "executeOnProtocol",
            Self::TransferToken { .. } => "transferToken",
        }
    }

    /// Role the sender must hold.
    #[must_use]
    pub const fn required_role(&self) -> Role {
        match self {
            Self::ApproveProtocol { .. } | Self::ExecuteOnProtocol { .. } => Role::Execute,
            Self::TransferToken { .. } => Role::Transfer,
        }
    }

    /// Protocol contract that must be on the sender's allow list.
    #[must_use]
    pub const fn protocol_target(&self) -> Option<Address> {
        match self {
            Self::ApproveProtocol { target, .. } | Self::ExecuteOnProtocol { target, .. } => {
                Some(*target)
            },
            Self::TransferToken { .. } => None,
        }
    }

    /// Rejects inputs the contract would refuse regardless of permissions.
    pub fn validate(&self) -> Result<(), OperationError> {
        match self {
            Self::ApproveProtocol { amount, .. } | Self::TransferToken { amount, .. }
                if amount.is_zero() =>
            {
                Err(OperationError::ZeroAmount)
            },
            Self::ExecuteOnProtocol { data, .. } if data.len() < 4 => {
                Err(OperationError::MissingSelector)
            },
            _ => Ok(()),
        }
    }

    /// Encodes the call against `interactor`.
    pub fn request(&self, interactor: Address) -> Result<TransactionRequest, OperationError> {
        self.validate()?;
        let request = match self {
            Self::ApproveProtocol {
                token,
                target,
                amount,
            } => TransactionRequest::call(
                interactor,
                &IDeFiInteractor::approveProtocolCall {
                    token: *token,
                    target: *target,
                    amount: *amount,
                },
            ),
            Self::ExecuteOnProtocol { target, data } => TransactionRequest::call(
                interactor,
                &IDeFiInteractor::executeOnProtocolCall {
                    target: *target,
                    data: data.clone(),
                },
            ),
            Self::TransferToken {
                token,
                recipient,
                amount,
            } => TransactionRequest::call(
                interactor,
                &IDeFiInteractor::transferTokenCall {
                    token: *token,
                    recipient: *recipient,
                    amount: *amount,
                },
            ),
        };
        Ok(request)
    }
}

/// Checks pause state, role and allow list for `account` sending `operation`.
///
/// Reads run concurrently. The first failing check is reported in that
/// order: paused, role, target.
pub async fn preflight(
    reader: &PermissionReader,
    account: Address,
    operation: &SubAccountOperation,
) -> Result<(), OperationError> {
    let role = operation.required_role();
    let target_check = async {
        match operation.protocol_target() {
            Some(target) => reader.try_read_allowed_address(account, target).await,
            None => Ok(true),
        }
    };
    let (paused, has_role, target_allowed) = tokio::try_join!(
        reader.try_read_paused_state(),
        reader.try_read_role_membership(account, role),
        target_check,
    )?;

    if paused {
        return Err(OperationError::Paused);
    }
    if !has_role {
        return Err(OperationError::MissingRole { account, role });
    }
    if let (false, Some(target)) = (target_allowed, operation.protocol_target()) {
        return Err(OperationError::TargetNotAllowed { account, target });
    }
    debug!(
        account = %account,
        function = operation.function_name(),
        "sub-account operation passed preflight"
    );
    Ok(())
}

/// Parses a decimal or `0x`-hex integer amount in token base units.
pub fn parse_amount(input: &str) -> Result<U256, OperationError> {
    input
        .trim()
        .parse::<U256>()
        .map_err(|_| OperationError::InvalidAmount {
            input: input.to_string(),
        })
}

/// Parses hex call data, with or without the `0x` prefix.
pub fn parse_calldata(input: &str) -> Result<Bytes, OperationError> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|_| OperationError::InvalidCalldata {
            input: input.to_string(),
        })
}
