//! Crate-level error type.
//!
//! Each module raises its own error enum. [`InteractorError`] wraps them for
//! callers that drive several modules at once, such as the CLI, and
//! classifies them for exit codes and structured output.

use std::fmt;

use thiserror::Error;

use crate::address::AddressError;
use crate::chain::ChainError;
use crate::config::ConfigError;
use crate::limits::LimitsError;
use crate::operations::OperationError;
use crate::proposal::{CallBuildError, ProposalError};
use crate::reader::ReadError;
use crate::registry::RegistryError;

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum InteractorError {
    /// Malformed account address.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Contract selection or persistence failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A contract read failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// Proposed limits are out of range.
    #[error(transparent)]
    Limits(#[from] LimitsError),

    /// A call could not be built.
    #[error(transparent)]
    CallBuild(#[from] CallBuildError),

    /// A proposal failed.
    #[error(transparent)]
    Proposal(#[from] ProposalError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The chain endpoint failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A sub-account operation was malformed or would be rejected.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Error classification for exit codes and structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or invalid setup: no contract, bad config, no wallet.
    Configuration,
    /// Reading chain state failed.
    Read,
    /// User input was rejected before anything was sent.
    Validation,
    /// A submitted proposal did not confirm.
    Proposal,
    /// Transport or storage failures.
    Infrastructure,
}

impl ErrorClass {
    /// Returns the class as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Read => "read",
            Self::Validation => "validation",
            Self::Proposal => "proposal",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InteractorError {
    /// Returns the error classification for this error.
    #[must_use]
    pub const fn error_class(&self) -> ErrorClass {
        match self {
            Self::Address(_)
            | Self::Limits(_)
            | Self::CallBuild(_)
            | Self::Registry(RegistryError::InvalidAddressFormat(_)) => ErrorClass::Validation,
            Self::Registry(RegistryError::ContractNotConfigured)
            | Self::Read(ReadError::ContractNotConfigured)
            | Self::Operation(OperationError::Read(ReadError::ContractNotConfigured))
            | Self::Config(_) => ErrorClass::Configuration,
            Self::Read(_) | Self::Operation(OperationError::Read(_)) => ErrorClass::Read,
            Self::Operation(_) => ErrorClass::Validation,
            Self::Proposal(error) => match error {
                ProposalError::NotConnected
                | ProposalError::SafeAddressUnresolved
                | ProposalError::ClientUnavailable => ErrorClass::Configuration,
                ProposalError::EmptyBatch | ProposalError::DuplicateInFlight { .. } => {
                    ErrorClass::Validation
                },
                _ => ErrorClass::Proposal,
            },
            Self::Registry(RegistryError::Store(_)) | Self::Chain(_) => ErrorClass::Infrastructure,
        }
    }

    /// Returns `true` if repeating the operation may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Read(error) | Self::Operation(OperationError::Read(error)) => {
                error.is_recoverable()
            },
            Self::Proposal(error) => error.is_recoverable(),
            Self::Chain(error) => error.is_recoverable(),
            Self::Registry(RegistryError::Store(_)) => true,
            Self::Address(_)
            | Self::Registry(_)
            | Self::Limits(_)
            | Self::CallBuild(_)
            | Self::Config(_)
            | Self::Operation(_) => false,
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use alloy_primitives::B256;

    use super::*;

    #[test]
    fn test_validation_errors() {
        let err = InteractorError::from(AddressError::InvalidFormat {
            input: "0x12".to_string(),
        });
        assert_eq!(err.error_class(), ErrorClass::Validation);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("0x12"));

        let err = InteractorError::from(CallBuildError::EmptyTargets);
        assert_eq!(err.error_class(), ErrorClass::Validation);
    }

    #[test]
    fn test_unconfigured_contract() {
        let err = InteractorError::from(ReadError::ContractNotConfigured);
        assert_eq!(err.error_class(), ErrorClass::Configuration);

        let err = InteractorError::from(RegistryError::ContractNotConfigured);
        assert_eq!(err.error_class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_read_error_recoverable_when_transport() {
        let err = InteractorError::from(ReadError::Chain {
            function: "paused",
            source: ChainError::transport("connection refused"),
        });
        assert_eq!(err.error_class(), ErrorClass::Read);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_proposal_classes() {
        let err = InteractorError::from(ProposalError::NotConnected);
        assert_eq!(err.error_class(), ErrorClass::Configuration);

        let err = InteractorError::from(ProposalError::OnChainRevert {
            transaction_hash: B256::ZERO,
        });
        assert_eq!(err.error_class(), ErrorClass::Proposal);
        assert!(!err.is_recoverable());

        let err = InteractorError::from(ProposalError::ConfirmationTimeout {
            transaction_hash: B256::ZERO,
            timeout_secs: 600,
        });
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_operation_classes() {
        let err = InteractorError::from(OperationError::ZeroAmount);
        assert_eq!(err.error_class(), ErrorClass::Validation);
        assert!(!err.is_recoverable());

        let err = InteractorError::from(OperationError::Paused);
        assert_eq!(err.error_class(), ErrorClass::Validation);

        let err = InteractorError::from(OperationError::Read(ReadError::ContractNotConfigured));
        assert_eq!(err.error_class(), ErrorClass::Configuration);

        let err = InteractorError::from(OperationError::Read(ReadError::Chain {
            function: "hasRole",
            source: ChainError::transport("connection reset"),
        }));
        assert_eq!(err.error_class(), ErrorClass::Read);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_chain_error_is_infrastructure() {
        let err = InteractorError::from(ChainError::rpc(-32_000, "boom"));
        assert_eq!(err.error_class(), ErrorClass::Infrastructure);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_class_display() {
        assert_eq!(ErrorClass::Configuration.to_string(), "configuration");
        assert_eq!(ErrorClass::Read.to_string(), "read");
        assert_eq!(ErrorClass::Validation.to_string(), "validation");
        assert_eq!(ErrorClass::Proposal.to_string(), "proposal");
        assert_eq!(ErrorClass::Infrastructure.to_string(), "infrastructure");
    }
}
