//! Call builders for every state-changing interactor function.
//!
//! Each builder ABI-encodes one call against the interactor and tags it with
//! the [`TransactionType`] that decides what a confirmed execution
//! invalidates. Input is validated here, before anything reaches a signer.

use alloy_primitives::{Address, Bytes, U256, keccak256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::ProposalError;
use super::invalidation::TransactionType;
use crate::contracts::{IDeFiInteractor, Role};
use crate::limits::{LimitsError, SubAccountLimits};

/// Errors raised while building a call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallBuildError {
    /// The proposed limits are out of range.
    #[error(transparent)]
    Limits(#[from] LimitsError),

    /// `setAllowedAddresses` needs at least one target.
    #[error("at least one target address is required")]
    EmptyTargets,

    /// Adding a sub-account needs at least one role.
    #[error("at least one role must be selected")]
    NoRolesSelected,
}

/// One call the Safe executes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Call target.
    pub to: Address,
    /// Native value sent along, in wei.
    #[serde(default)]
    pub value: U256,
    /// ABI-encoded call data.
    pub data: Bytes,
}

impl TransactionRequest {
    /// Creates a zero-value call of `call` on `to`.
    #[must_use]
    pub fn call<C: SolCall>(to: Address, call: &C) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: Bytes::from(call.abi_encode()),
        }
    }
}

/// A non-empty, ordered list of calls executed atomically by the Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TransactionRequest>", into = "Vec<TransactionRequest>")]
pub struct TransactionBatch {
    transactions: Vec<TransactionRequest>,
}

impl TransactionBatch {
    /// A batch of one call.
    #[must_use]
    pub fn single(transaction: TransactionRequest) -> Self {
        Self {
            transactions: vec![transaction],
        }
    }

    /// The calls, in execution order.
    #[must_use]
    pub fn transactions(&self) -> &[TransactionRequest] {
        &self.transactions
    }

    /// Number of calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Always `false`; an empty batch cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Content-derived identity used to detect duplicate submissions.
    ///
    /// Two batches with the same calls in the same order share a key.
    #[must_use]
    pub fn action_key(&self) -> String {
        let mut preimage = Vec::new();
        for transaction in &self.transactions {
            preimage.extend_from_slice(transaction.to.as_slice());
            preimage.extend_from_slice(&transaction.value.to_be_bytes::<32>());
            preimage.extend_from_slice(&(transaction.data.len() as u64).to_be_bytes());
            preimage.extend_from_slice(&transaction.data);
        }
        keccak256(&preimage).to_string()
    }
}

impl From<TransactionRequest> for TransactionBatch {
    fn from(transaction: TransactionRequest) -> Self {
        Self::single(transaction)
    }
}

impl TryFrom<Vec<TransactionRequest>> for TransactionBatch {
    type Error = ProposalError;

    fn try_from(transactions: Vec<TransactionRequest>) -> Result<Self, Self::Error> {
        if transactions.is_empty() {
            return Err(ProposalError::EmptyBatch);
        }
        Ok(Self { transactions })
    }
}

impl From<TransactionBatch> for Vec<TransactionRequest> {
    fn from(batch: TransactionBatch) -> Self {
        batch.transactions
    }
}

/// Calls built for one user action, with the type that drives invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallBundle {
    /// What the calls change.
    pub transaction_type: TransactionType,
    /// The encoded calls, in execution order.
    pub requests: Vec<TransactionRequest>,
}

impl CallBundle {
    fn single(transaction_type: TransactionType, request: TransactionRequest) -> Self {
        Self {
            transaction_type,
            requests: vec![request],
        }
    }

    /// Normalizes the calls into a batch.
    pub fn batch(&self) -> Result<TransactionBatch, ProposalError> {
        TransactionBatch::try_from(self.requests.clone())
    }
}

/// `grantRole(member, role)`.
#[must_use]
pub fn grant_role(interactor: Address, member: Address, role: Role) -> CallBundle {
    let call = IDeFiInteractor::grantRoleCall {
        member,
        roleId: role.id(),
    };
    CallBundle::single(
        TransactionType::GrantRole,
        TransactionRequest::call(interactor, &call),
    )
}

/// `revokeRole(member, role)`.
#[must_use]
pub fn revoke_role(interactor: Address, member: Address, role: Role) -> CallBundle {
    let call = IDeFiInteractor::revokeRoleCall {
        member,
        roleId: role.id(),
    };
    CallBundle::single(
        TransactionType::RevokeRole,
        TransactionRequest::call(interactor, &call),
    )
}

/// One `grantRole` per selected role, executed as a single batch.
pub fn add_sub_account(
    interactor: Address,
    account: Address,
    roles: &[Role],
) -> Result<CallBundle, CallBuildError> {
    if roles.is_empty() {
        return Err(CallBuildError::NoRolesSelected);
    }
    let mut requests = Vec::with_capacity(roles.len());
    for role in roles {
        let call = IDeFiInteractor::grantRoleCall {
            member: account,
            roleId: role.id(),
        };
        let request = TransactionRequest::call(interactor, &call);
        if !requests.contains(&request) {
            requests.push(request);
        }
    }
    Ok(CallBundle {
        transaction_type: TransactionType::GrantRole,
        requests,
    })
}

/// `setSubAccountLimits(account, bps, window)` after range validation.
pub fn set_sub_account_limits(
    interactor: Address,
    account: Address,
    limits: SubAccountLimits,
) -> Result<CallBundle, CallBuildError> {
    limits.validate()?;
    let call = IDeFiInteractor::setSubAccountLimitsCall {
        subAccount: account,
        maxSpendingBps: U256::from(limits.max_spending_bps),
        windowDuration: U256::from(limits.window_duration_secs),
    };
    Ok(CallBundle::single(
        TransactionType::SetSubAccountLimits,
        TransactionRequest::call(interactor, &call),
    ))
}

/// `setAllowedAddresses(account, targets, allowed)`.
pub fn set_allowed_addresses(
    interactor: Address,
    account: Address,
    targets: &[Address],
    allowed: bool,
) -> Result<CallBundle, CallBuildError> {
    if targets.is_empty() {
        return Err(CallBuildError::EmptyTargets);
    }
    let call = IDeFiInteractor::setAllowedAddressesCall {
        subAccount: account,
        targets: targets.to_vec(),
        allowed,
    };
    Ok(CallBundle::single(
        TransactionType::SetAllowedAddresses,
        TransactionRequest::call(interactor, &call),
    ))
}

/// `pause()`.
#[must_use]
pub fn pause(interactor: Address) -> CallBundle {
    CallBundle::single(
        TransactionType::Pause,
        TransactionRequest::call(interactor, &IDeFiInteractor::pauseCall {}),
    )
}

/// `unpause()`.
#[must_use]
pub fn unpause(interactor: Address) -> CallBundle {
    CallBundle::single(
        TransactionType::Unpause,
        TransactionRequest::call(interactor, &IDeFiInteractor::unpauseCall {}),
    )
}
