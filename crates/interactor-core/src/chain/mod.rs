//! Chain access seam.
//!
//! Every contract read and every receipt wait goes through [`ChainClient`].
//! The production implementation speaks JSON-RPC over HTTP
//! ([`JsonRpcChainClient`]); tests substitute in-memory fakes.

mod rpc;

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rpc::JsonRpcChainClient;

/// Errors raised by a chain client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The endpoint could not be reached or returned a non-success status.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying error text.
        message: String,
    },

    /// The endpoint answered with a JSON-RPC error object.
    ///
    /// Reverted `eth_call`s land here with the node's revert message.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the node.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with it.
        message: String,
    },
}

impl ChainError {
    /// Creates a new transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new JSON-RPC error.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Creates a new invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Execution outcome recorded in a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// The transaction executed.
    Success,
    /// The transaction was mined but reverted.
    Reverted,
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Reverted => write!(f, "reverted"),
        }
    }
}

/// The parts of a transaction receipt the client acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Hash of the mined transaction.
    pub transaction_hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Execution outcome.
    pub status: ReceiptStatus,
}

impl TxReceipt {
    /// Returns `true` if the transaction reverted.
    #[must_use]
    pub fn is_reverted(&self) -> bool {
        self.status == ReceiptStatus::Reverted
    }
}

/// Read access to the chain plus receipt waiting.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id of the connected network.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Executes a read-only call against `to` at the latest block and returns
    /// the raw ABI-encoded return data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Waits until `tx_hash` is mined with at least `confirmations` blocks
    /// (inclusion counts as one).
    ///
    /// Does not time out on its own; callers bound the wait.
    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<TxReceipt, ChainError>;
}

/// Shared handle to a chain client.
pub type SharedChainClient = Arc<dyn ChainClient>;
