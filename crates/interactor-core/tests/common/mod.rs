//! Shared fakes for integration tests, built only on the public API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use interactor_core::chain::ReceiptStatus;
use interactor_core::proposal::{SafeTransaction, SignerError};
use interactor_core::{
    ChainClient, ChainError, ContractAddressConfig, MultisigSigner, PermissionReader,
    ReadCacheConfig, SharedReadCache, TransactionBatch, TxReceipt, new_shared_cache,
};
use tokio::sync::watch;

pub const CHAIN_ID: u64 = 8_453;
pub const INTERACTOR: Address = Address::repeat_byte(0xaa);
pub const SAFE: Address = Address::repeat_byte(0x5a);
pub const OWNER: Address = Address::repeat_byte(0x01);
pub const SAFE_TX_HASH: B256 = B256::repeat_byte(0x55);
pub const CHAIN_TX_HASH: B256 = B256::repeat_byte(0x77);

/// Chain answering canned calls, counting them per function selector.
pub struct MockChain {
    responses: Mutex<HashMap<(Address, Bytes), Bytes>>,
    calls: Mutex<HashMap<[u8; 4], usize>>,
    receipts: watch::Sender<HashMap<B256, TxReceipt>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            receipts: watch::Sender::new(HashMap::new()),
        })
    }

    pub fn respond<C: SolCall>(&self, to: Address, call: C, ret: Vec<u8>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((to, Bytes::from(call.abi_encode())), Bytes::from(ret));
    }

    /// Number of `eth_call`s made to function `C`.
    pub fn calls_to<C: SolCall>(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&C::SELECTOR)
            .copied()
            .unwrap_or(0)
    }

    pub fn mine(&self, transaction_hash: B256, status: ReceiptStatus) {
        self.receipts.send_modify(|receipts| {
            receipts.insert(
                transaction_hash,
                TxReceipt {
                    transaction_hash,
                    block_number: 42,
                    status,
                },
            );
        });
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(CHAIN_ID)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        if let Some(selector) = data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) {
            *self
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(selector)
                .or_default() += 1;
        }
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| ChainError::rpc(-32_000, "execution reverted"))
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        _confirmations: u64,
    ) -> Result<TxReceipt, ChainError> {
        let mut receipts = self.receipts.subscribe();
        loop {
            let found = receipts.borrow_and_update().get(&tx_hash).copied();
            if let Some(receipt) = found {
                return Ok(receipt);
            }
            receipts
                .changed()
                .await
                .map_err(|_| ChainError::transport("receipt feed closed"))?;
        }
    }
}

/// Signer that either succeeds or fails signing with a fixed error.
pub struct MockSigner {
    sign_error: Option<SignerError>,
    executed: AtomicUsize,
}

impl MockSigner {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self {
            sign_error: None,
            executed: AtomicUsize::new(0),
        })
    }

    pub fn failing_sign(error: SignerError) -> Arc<Self> {
        Arc::new(Self {
            sign_error: Some(error),
            executed: AtomicUsize::new(0),
        })
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MultisigSigner for MockSigner {
    fn owner(&self) -> Option<Address> {
        Some(OWNER)
    }

    async fn create_transaction(
        &self,
        safe: Address,
        batch: &TransactionBatch,
    ) -> Result<SafeTransaction, SignerError> {
        Ok(SafeTransaction::unsigned(safe, batch))
    }

    async fn transaction_hash(&self, _transaction: &SafeTransaction) -> Result<B256, SignerError> {
        Ok(SAFE_TX_HASH)
    }

    async fn sign(&self, mut transaction: SafeTransaction) -> Result<SafeTransaction, SignerError> {
        if let Some(error) = &self.sign_error {
            return Err(error.clone());
        }
        transaction.signatures.push(Bytes::from_static(&[0x01; 65]));
        Ok(transaction)
    }

    async fn execute(&self, _transaction: SafeTransaction) -> Result<B256, SignerError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(CHAIN_TX_HASH)
    }
}

/// Selection with both the interactor and its Safe known.
pub fn selected() -> watch::Receiver<ContractAddressConfig> {
    // The receiver keeps the last value after the sender is dropped.
    let (_tx, rx) = watch::channel(ContractAddressConfig {
        interactor_address: Some(INTERACTOR),
        safe_address: Some(SAFE),
    });
    rx
}

pub fn reader(chain: &Arc<MockChain>, cache: &SharedReadCache) -> PermissionReader {
    PermissionReader::new(chain.clone(), cache.clone(), selected())
}

pub fn shared_cache() -> SharedReadCache {
    new_shared_cache(ReadCacheConfig::default())
}
