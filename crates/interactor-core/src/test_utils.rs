//! In-memory chain and signer fakes for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::chain::{ChainClient, ChainError, ReceiptStatus, TxReceipt};
use crate::proposal::{MultisigSigner, SafeTransaction, SignerError, TransactionBatch};

pub(crate) const CHAIN_ID: u64 = 8_453;

/// Chain client answering canned `eth_call`s.
///
/// Unknown calls revert. Receipts never arrive unless set with
/// [`FakeChain::set_receipt`], which may happen while a wait is in progress.
/// [`FakeChain::hold_calls`] parks calls after their answer was looked up, so
/// a test can change chain state while a read is in flight.
pub(crate) struct FakeChain {
    responses: Mutex<HashMap<(Address, Bytes), Bytes>>,
    calls: AtomicUsize,
    receipts: watch::Sender<HashMap<B256, TxReceipt>>,
    open: watch::Sender<bool>,
}

impl FakeChain {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            receipts: watch::Sender::new(HashMap::new()),
            open: watch::Sender::new(true),
        }
    }

    pub(crate) fn hold_calls(&self) {
        self.open.send_replace(false);
    }

    pub(crate) fn release_calls(&self) {
        self.open.send_replace(true);
    }

    pub(crate) fn respond<C: SolCall>(&self, to: Address, call: C, ret: Vec<u8>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((to, Bytes::from(call.abi_encode())), Bytes::from(ret));
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_receipt(&self, transaction_hash: B256, status: ReceiptStatus) {
        self.receipts.send_modify(|receipts| {
            receipts.insert(
                transaction_hash,
                TxReceipt {
                    transaction_hash,
                    block_number: 100,
                    status,
                },
            );
        });
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(CHAIN_ID)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let answer = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(to, data))
            .cloned();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| ChainError::transport("call gate closed"))?;
        answer.ok_or_else(|| ChainError::rpc(-32_000, "execution reverted"))
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

/// Signer step that [`FakeSigner::fail_at`] can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignerStage {
    Create,
    Hash,
    Sign,
    Execute,
}

/// Signer that succeeds instantly with fixed hashes.
pub(crate) struct FakeSigner {
    owner: Option<Address>,
    failure: Mutex<Option<(SignerStage, SignerError)>>,
    created: AtomicUsize,
}

impl FakeSigner {
    pub(crate) fn connected(owner: Address) -> Self {
        Self {
            owner: Some(owner),
            failure: Mutex::new(None),
            created: AtomicUsize::new(0),
        }
    }

    pub(crate) fn disconnected() -> Self {
        Self {
            owner: None,
            ..Self::connected(Address::ZERO)
        }
    }

    pub(crate) fn fail_at(&self, stage: SignerStage, error: SignerError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some((stage, error));
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn safe_tx_hash(&self) -> B256 {
        B256::repeat_byte(0x55)
    }

    pub(crate) fn chain_tx_hash(&self) -> B256 {
        B256::repeat_byte(0x77)
    }

    fn check(&self, stage: SignerStage) -> Result<(), SignerError> {
        match &*self.failure.lock().unwrap_or_else(PoisonError::into_inner) {
            Some((failing, error)) if *failing == stage => Err(error.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MultisigSigner for FakeSigner {
    fn owner(&self) -> Option<Address> {
        self.owner
    }

    async fn create_transaction(
        &self,
        safe: Address,
        batch: &TransactionBatch,
    ) -> Result<SafeTransaction, SignerError> {
        self.check(SignerStage::Create)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(SafeTransaction::unsigned(safe, batch))
    }

    async fn transaction_hash(&self, _transaction: &SafeTransaction) -> Result<B256, SignerError> {
        self.check(SignerStage::Hash)?;
        Ok(self.safe_tx_hash())
    }

    async fn sign(&self, mut transaction: SafeTransaction) -> Result<SafeTransaction, SignerError> {
        self.check(SignerStage::Sign)?;
        transaction.signatures.push(Bytes::from_static(&[0x01; 65]));
        Ok(transaction)
    }

    async fn execute(&self, transaction: SafeTransaction) -> Result<B256, SignerError> {
        self.check(SignerStage::Execute)?;
        if !transaction.is_signed() {
            return Err(SignerError::other("GS020", "signatures data too short"));
        }
        Ok(self.chain_tx_hash())
    }
}
