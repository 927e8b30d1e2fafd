//! JSON-RPC over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::{ChainClient, ChainError, ReceiptStatus, TxReceipt};
use crate::config::ChainSection;
use crate::log::redact_url;

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Connect timeout for the HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`ChainClient`] backed by an Ethereum JSON-RPC endpoint.
pub struct JsonRpcChainClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
    poll_interval: Duration,
    chain_id: OnceCell<u64>,
}

impl JsonRpcChainClient {
    /// Creates a client for `url` with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, ChainError> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|error| ChainError::transport(error.to_string()))?;

        debug!(rpc_url = %redact_url(&url), "created JSON-RPC client");
        Ok(Self {
            http,
            url,
            next_id: AtomicU64::new(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
            chain_id: OnceCell::new(),
        })
    }

    /// Creates a client from the `[chain]` configuration section.
    ///
    /// A configured `chain_id` is trusted and never queried.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(section: &ChainSection) -> Result<Self, ChainError> {
        let client = Self::new(section.rpc_url.trim(), section.request_timeout())?;
        if let Some(chain_id) = section.chain_id {
            // A fresh cell cannot already be initialised.
            let _ = client.chain_id.set(chain_id);
        }
        Ok(client)
    }

    /// Overrides the receipt polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        trace!(id, method, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|error| ChainError::transport(redact_url(&error.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::transport(format!("HTTP {status}")));
        }

        let response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|error| ChainError::invalid_response(error.to_string()))?;
        response.into_result()
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let quantity: String = self
            .request("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| ChainError::invalid_response("eth_blockNumber returned null"))?;
        parse_quantity(&quantity)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let raw: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        raw.map(RawReceipt::into_receipt).transpose()
    }
}

impl std::fmt::Debug for JsonRpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcChainClient")
            .field("url", &redact_url(&self.url))
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.chain_id
            .get_or_try_init(|| async {
                let quantity: String = self
                    .request("eth_chainId", json!([]))
                    .await?
                    .ok_or_else(|| ChainError::invalid_response("eth_chainId returned null"))?;
                parse_quantity(&quantity)
            })
            .await
            .copied()
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?
            .ok_or_else(|| ChainError::invalid_response("eth_call returned null"))
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<TxReceipt, ChainError> {
        let confirmations = confirmations.max(1);
        loop {
            if let Some(receipt) = self.receipt(tx_hash).await? {
                let head = self.block_number().await?;
                let depth = head.saturating_sub(receipt.block_number).saturating_add(1);
                if depth >= confirmations {
                    debug!(
                        tx_hash = %tx_hash,
                        block = receipt.block_number,
                        status = %receipt.status,
                        "transaction confirmed"
                    );
                    return Ok(receipt);
                }
                trace!(tx_hash = %tx_hash, depth, confirmations, "waiting for confirmations");
            } else {
                trace!(tx_hash = %tx_hash, "receipt not yet available");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<Option<T>, ChainError> {
        match self.error {
            Some(error) => Err(ChainError::rpc(error.code, error.message)),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<String>,
    status: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<TxReceipt, ChainError> {
        let block_number = self
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .ok_or_else(|| ChainError::invalid_response("receipt without block number"))?;
        let status = match self.status.as_deref().map(parse_quantity).transpose()? {
            Some(1) => ReceiptStatus::Success,
            Some(0) => ReceiptStatus::Reverted,
            other => {
                return Err(ChainError::invalid_response(format!(
                    "unexpected receipt status {other:?}"
                )));
            },
        };
        Ok(TxReceipt {
            transaction_hash: self.transaction_hash,
            block_number,
            status,
        })
    }
}

/// Parses a JSON-RPC hex quantity such as `0x2105`.
fn parse_quantity(quantity: &str) -> Result<u64, ChainError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::invalid_response(format!("not a hex quantity: {quantity}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| ChainError::invalid_response(format!("not a hex quantity: {quantity}")))
}
