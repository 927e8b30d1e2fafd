//! Proposal failures.

use alloy_primitives::B256;
use thiserror::Error;

use super::status::ProposalStatus;

/// Errors that end a proposal.
///
/// A user rejection is not an error; it ends the proposal as
/// [`ProposalOutcome::Cancelled`](super::ProposalOutcome::Cancelled).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProposalError {
    /// No wallet is connected.
    #[error("wallet not connected")]
    NotConnected,

    /// The controlling Safe has not been read from the contract yet.
    #[error("safe address not found")]
    SafeAddressUnresolved,

    /// No chain client is available to wait for the receipt.
    #[error("chain client not available")]
    ClientUnavailable,

    /// The batch holds no calls.
    #[error("transaction batch is empty")]
    EmptyBatch,

    /// The same action is already being proposed.
    #[error("a proposal for {action_key} is already in flight")]
    DuplicateInFlight {
        /// Identity of the in-flight action.
        action_key: String,
    },

    /// Building, hashing or signing the multisig transaction failed.
    #[error("signing failed: {message}")]
    Signing {
        /// Raw signer message.
        message: String,
    },

    /// Executing the signed transaction failed.
    #[error("submission failed: {message}")]
    Submission {
        /// Raw signer message.
        message: String,
    },

    /// Waiting for the receipt failed.
    #[error("confirmation failed: {message}")]
    Chain {
        /// Raw chain client message.
        message: String,
    },

    /// The transaction was mined but reverted.
    #[error("transaction {transaction_hash} reverted on chain")]
    OnChainRevert {
        /// Hash of the reverted transaction.
        transaction_hash: B256,
    },

    /// No receipt arrived within the confirmation timeout.
    #[error("transaction {transaction_hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout {
        /// Hash of the submitted transaction.
        transaction_hash: B256,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// The lifecycle attempted an illegal state change.
    #[error("invalid proposal transition from {from} to {to}")]
    InvalidTransition {
        /// State before the attempted change.
        from: ProposalStatus,
        /// Requested state.
        to: ProposalStatus,
    },
}

impl ProposalError {
    /// Creates a new signing error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new submission error.
    #[must_use]
    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
        }
    }

    /// Creates a new chain error.
    #[must_use]
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Creates a new duplicate in-flight error.
    #[must_use]
    pub fn duplicate_in_flight(action_key: impl Into<String>) -> Self {
        Self::DuplicateInFlight {
            action_key: action_key.into(),
        }
    }

    /// Returns `true` if proposing again later may succeed.
    ///
    /// Nothing is retried automatically; this only informs the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::DuplicateInFlight { .. }
            | Self::Chain { .. }
            | Self::ConfirmationTimeout { .. } => true,
            Self::NotConnected
            | Self::SafeAddressUnresolved
            | Self::ClientUnavailable
            | Self::EmptyBatch
            | Self::Signing { .. }
            | Self::Submission { .. }
            | Self::OnChainRevert { .. }
            | Self::InvalidTransition { .. } => false,
        }
    }

    /// Returns `true` if the error was raised before anything was signed.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::SafeAddressUnresolved
                | Self::ClientUnavailable
                | Self::EmptyBatch
                | Self::DuplicateInFlight { .. }
        )
    }
}
