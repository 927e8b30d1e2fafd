//! Multisig signing seam.
//!
//! Building, hashing, signing and executing a Safe transaction is delegated to
//! an external signing library behind [`MultisigSigner`]. The lifecycle only
//! needs to tell a user rejection apart from every other failure, which
//! [`is_user_rejection`] does.

use std::fmt;

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::calls::{TransactionBatch, TransactionRequest};

/// A multisig transaction prepared for the controlling Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTransaction {
    /// The Safe that executes the batch.
    pub safe: Address,
    /// Calls executed atomically, in order.
    pub transactions: Vec<TransactionRequest>,
    /// Owner signatures collected so far.
    pub signatures: Vec<Bytes>,
}

impl SafeTransaction {
    /// Creates an unsigned transaction for `batch`.
    #[must_use]
    pub fn unsigned(safe: Address, batch: &TransactionBatch) -> Self {
        Self {
            safe,
            transactions: batch.transactions().to_vec(),
            signatures: Vec::new(),
        }
    }

    /// Returns `true` once at least one owner has signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }
}

/// Coarse category of a signer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerErrorKind {
    /// The connected owner declined the request.
    UserRejected,
    /// The wallet or node answered with an error.
    Rpc,
    /// Anything the signer could not categorize.
    Other,
}

/// Error reported by a [`MultisigSigner`].
///
/// `name` carries the error type name reported by the wallet, e.g.
/// `UserRejectedRequestError`, when the signer cannot map it to a kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{name}: {message}")]
pub struct SignerError {
    /// Failure category.
    pub kind: SignerErrorKind,
    /// Error type name as reported by the wallet.
    pub name: String,
    /// Raw error message.
    pub message: String,
}

impl SignerError {
    /// Creates a new signer error.
    #[must_use]
    pub fn new(kind: SignerErrorKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new user-rejection error.
    #[must_use]
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::new(SignerErrorKind::UserRejected, "UserRejectedRequestError", message)
    }

    /// Creates a new uncategorized error.
    #[must_use]
    pub fn other(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SignerErrorKind::Other, name, message)
    }
}

/// Phrases wallets use in rejection messages, matched case-insensitively.
const REJECTION_PHRASES: &[&str] = &[
    "user rejected",
    "user denied",
    "user cancelled",
    "rejected the request",
];

/// Fragments of rejection error type names, matched case-insensitively.
const REJECTION_NAMES: &[&str] = &["userrejected", "actionrejected"];

/// Returns `true` if `error` means the owner declined to sign.
///
/// The typed kind wins; the message and name heuristics cover signers that
/// only forward the wallet's text.
#[must_use]
pub fn is_user_rejection(error: &SignerError) -> bool {
    if error.kind == SignerErrorKind::UserRejected {
        return true;
    }
    let message = error.message.to_lowercase();
    let name = error.name.to_lowercase();
    REJECTION_PHRASES.iter().any(|phrase| message.contains(phrase))
        || REJECTION_NAMES.iter().any(|fragment| name.contains(fragment))
}

/// External multisig signing library.
#[async_trait]
pub trait MultisigSigner: Send + Sync {
    /// The connected owner account, `None` when no wallet is connected.
    fn owner(&self) -> Option<Address>;

    /// Builds the multisig transaction executing `batch` through `safe`.
    async fn create_transaction(
        &self,
        safe: Address,
        batch: &TransactionBatch,
    ) -> Result<SafeTransaction, SignerError>;

    /// The Safe transaction hash owners sign.
    async fn transaction_hash(&self, transaction: &SafeTransaction) -> Result<B256, SignerError>;

    /// Adds the connected owner's signature.
    async fn sign(&self, transaction: SafeTransaction) -> Result<SafeTransaction, SignerError>;

    /// Executes a sufficiently signed transaction and returns the hash of the
    /// submitted chain transaction.
    async fn execute(&self, transaction: SafeTransaction) -> Result<B256, SignerError>;
}

impl fmt::Debug for dyn MultisigSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultisigSigner")
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_rejection() {
        let error = SignerError::new(SignerErrorKind::UserRejected, "Error", "no");
        assert!(is_user_rejection(&error));
    }

    #[test]
    fn test_message_heuristics() {
        for message in [
            "User rejected the request.",
            "MetaMask Tx Signature: User denied transaction signature.",
            "user cancelled",
            "The owner rejected the request",
        ] {
            assert!(is_user_rejection(&SignerError::other("Error", message)), "{message}");
        }
    }

    #[test]
    fn test_name_heuristics() {
        assert!(is_user_rejection(&SignerError::other("UserRejectedRequestError", "")));
        assert!(is_user_rejection(&SignerError::other("ActionRejectedError", "")));
        assert!(!is_user_rejection(&SignerError::other("ACTION_REJECTED", "")));
    }

    #[test]
    fn test_other_failures_are_not_rejections() {
        let error = SignerError::new(SignerErrorKind::Rpc, "RpcError", "insufficient funds for gas");
        assert!(!is_user_rejection(&error));
        assert_eq!(error.to_string(), "RpcError: insufficient funds for gas");
    }
}
