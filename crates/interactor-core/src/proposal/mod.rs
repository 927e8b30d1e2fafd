//! Proposing state changes to the controlling Safe.
//!
//! A proposal takes one call or a batch of calls, has the connected owner
//! sign and execute it through the Safe, waits for the receipt and, only
//! after a confirmed success, invalidates the cached reads the change makes
//! stale.
//!
//! ```text
//! propose(input, options)
//!   ├── preconditions: signer connected, Safe resolved, chain client present
//!   ├── normalize input into a TransactionBatch (non-empty)
//!   ├── claim the in-flight slot for the action key
//!   ├── create → hash → sign → execute            (MultisigSigner)
//!   ├── wait for the receipt, bounded by the timeout (ChainClient)
//!   └── invalidate cache entries for the transaction type
//! ```
//!
//! A user rejection at any signing step ends the proposal as
//! [`ProposalOutcome::Cancelled`], which is logged at `info` and leaves the
//! cache untouched. Nothing is retried automatically.

mod calls;
mod error;
mod export;
mod invalidation;
mod signer;
mod status;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::B256;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use calls::{
    CallBuildError, CallBundle, TransactionBatch, TransactionRequest, add_sub_account, grant_role,
    pause, revoke_role, set_allowed_addresses, set_sub_account_limits, unpause,
};
pub use error::ProposalError;
pub use export::{
    TX_BUILDER_FORMAT_VERSION, TxBuilderBatch, TxBuilderMeta, TxBuilderTransaction,
};
pub use invalidation::TransactionType;
pub use signer::{
    MultisigSigner, SafeTransaction, SignerError, SignerErrorKind, is_user_rejection,
};
pub use status::ProposalStatus;

use crate::cache::SharedReadCache;
use crate::chain::SharedChainClient;
use crate::config::ProposalSection;
use crate::registry::ContractAddressConfig;

/// Default upper bound on waiting for the execution receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(600);

/// A single call or a list of calls, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionInput {
    /// One call.
    Single(TransactionRequest),
    /// Calls executed atomically, in order.
    Batch(Vec<TransactionRequest>),
}

impl TransactionInput {
    /// Normalizes the input into a batch.
    pub fn into_batch(self) -> Result<TransactionBatch, ProposalError> {
        match self {
            Self::Single(request) => Ok(TransactionBatch::single(request)),
            Self::Batch(requests) => TransactionBatch::try_from(requests),
        }
    }
}

impl From<TransactionRequest> for TransactionInput {
    fn from(request: TransactionRequest) -> Self {
        Self::Single(request)
    }
}

impl From<Vec<TransactionRequest>> for TransactionInput {
    fn from(requests: Vec<TransactionRequest>) -> Self {
        Self::Batch(requests)
    }
}

impl From<TransactionBatch> for TransactionInput {
    fn from(batch: TransactionBatch) -> Self {
        Self::Batch(batch.into())
    }
}

/// Per-proposal options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposeOptions {
    /// What the calls change; drives invalidation after confirmation.
    pub transaction_type: Option<TransactionType>,
    /// Identity of the logical action for duplicate detection. Derived from
    /// the batch contents when absent.
    pub action_key: Option<String>,
}

impl ProposeOptions {
    /// Options invalidating `transaction_type` on success.
    #[must_use]
    pub const fn for_type(transaction_type: TransactionType) -> Self {
        Self {
            transaction_type: Some(transaction_type),
            action_key: None,
        }
    }

    /// Sets an explicit action key.
    #[must_use]
    pub fn with_action_key(mut self, action_key: impl Into<String>) -> Self {
        self.action_key = Some(action_key.into());
        self
    }
}

/// How a proposal ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    /// Executed and confirmed on chain.
    Confirmed {
        /// Safe transaction hash the owners signed.
        safe_tx_hash: B256,
        /// Hash of the mined chain transaction.
        transaction_hash: B256,
    },

    /// The owner declined to sign.
    Cancelled,

    /// Submitted, but no receipt arrived in time. The transaction may still
    /// be mined later.
    TimedOut {
        /// Safe transaction hash the owners signed.
        safe_tx_hash: B256,
        /// Hash of the submitted chain transaction.
        transaction_hash: B256,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Any other failure.
    Failed(ProposalError),
}

impl ProposalOutcome {
    /// Returns `true` if the proposal was confirmed.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// The terminal lifecycle state this outcome corresponds to.
    #[must_use]
    pub const fn status(&self) -> ProposalStatus {
        match self {
            Self::Confirmed { .. } => ProposalStatus::Confirmed,
            Self::Cancelled => ProposalStatus::Cancelled,
            Self::TimedOut { .. } => ProposalStatus::TimedOut,
            Self::Failed(ProposalError::OnChainRevert { .. }) => ProposalStatus::Reverted,
            Self::Failed(_) => ProposalStatus::Failed,
        }
    }

    /// The error to report, `None` for confirmed and cancelled proposals.
    #[must_use]
    pub fn error(&self) -> Option<ProposalError> {
        match self {
            Self::Confirmed { .. } | Self::Cancelled => None,
            Self::TimedOut {
                transaction_hash,
                timeout,
                ..
            } => Some(ProposalError::ConfirmationTimeout {
                transaction_hash: *transaction_hash,
                timeout_secs: timeout.as_secs(),
            }),
            Self::Failed(error) => Some(error.clone()),
        }
    }
}

/// Receipt-wait settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalSettings {
    /// Upper bound on waiting for the execution receipt.
    pub confirmation_timeout: Duration,
    /// Blocks to wait for, inclusion counting as one.
    pub confirmations: u64,
}

impl Default for ProposalSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            confirmations: 1,
        }
    }
}

impl From<&ProposalSection> for ProposalSettings {
    fn from(section: &ProposalSection) -> Self {
        Self {
            confirmation_timeout: section.confirmation_timeout(),
            confirmations: section.confirmations.max(1),
        }
    }
}

/// State history of one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProposal {
    history: Vec<ProposalStatus>,
}

impl Default for PendingProposal {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingProposal {
    /// A proposal in [`ProposalStatus::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: vec![ProposalStatus::Idle],
        }
    }

    /// The current state.
    #[must_use]
    pub fn status(&self) -> ProposalStatus {
        self.history.last().copied().unwrap_or_default()
    }

    /// Every state visited, oldest first.
    #[must_use]
    pub fn history(&self) -> &[ProposalStatus] {
        &self.history
    }

    /// Moves to `to` if the lifecycle allows it.
    pub fn advance(&mut self, to: ProposalStatus) -> Result<(), ProposalError> {
        let from = self.status();
        if !from.can_transition_to(to) {
            return Err(ProposalError::InvalidTransition { from, to });
        }
        debug!(from = %from, to = %to, "proposal transition");
        self.history.push(to);
        Ok(())
    }
}

/// Why [`ProposalLifecycle::run`] stopped early.
enum Halt {
    Cancelled(SignerError),
    Failed(ProposalError),
}

impl From<ProposalError> for Halt {
    fn from(error: ProposalError) -> Self {
        Self::Failed(error)
    }
}

fn signer_step<T>(
    result: Result<T, SignerError>,
    wrap: fn(String) -> ProposalError,
) -> Result<T, Halt> {
    result.map_err(|error| {
        if is_user_rejection(&error) {
            Halt::Cancelled(error)
        } else {
            Halt::Failed(wrap(error.to_string()))
        }
    })
}

/// Releases an action key when the proposal holding it ends.
struct InFlightSlot<'a> {
    keys: &'a Mutex<HashSet<String>>,
    key: String,
}

impl<'a> InFlightSlot<'a> {
    fn acquire(keys: &'a Mutex<HashSet<String>>, key: &str) -> Result<Self, ProposalError> {
        if !lock(keys).insert(key.to_string()) {
            return Err(ProposalError::duplicate_in_flight(key));
        }
        Ok(Self {
            keys,
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        lock(self.keys).remove(&self.key);
    }
}

fn lock(keys: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    keys.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives proposals from input to a terminal [`ProposalOutcome`].
pub struct ProposalLifecycle {
    signer: Option<Arc<dyn MultisigSigner>>,
    client: Option<SharedChainClient>,
    config: watch::Receiver<ContractAddressConfig>,
    cache: SharedReadCache,
    settings: ProposalSettings,
    in_flight: Mutex<HashSet<String>>,
}

impl ProposalLifecycle {
    /// Creates a lifecycle with no signer or chain client attached.
    #[must_use]
    pub fn new(config: watch::Receiver<ContractAddressConfig>, cache: SharedReadCache) -> Self {
        Self {
            signer: None,
            client: None,
            config,
            cache,
            settings: ProposalSettings::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Attaches the multisig signer.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn MultisigSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attaches the chain client used to wait for receipts.
    #[must_use]
    pub fn with_client(mut self, client: SharedChainClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Overrides the receipt-wait settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: ProposalSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns `true` while any proposal is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !lock(&self.in_flight).is_empty()
    }

    /// Number of proposals in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Proposes the calls of `bundle`, invalidating for its type.
    pub async fn propose_bundle(&self, bundle: &CallBundle) -> ProposalOutcome {
        self.propose(
            bundle.requests.clone(),
            ProposeOptions::for_type(bundle.transaction_type),
        )
        .await
    }

    /// Proposes `input` and waits for it to reach a terminal state.
    pub async fn propose(
        &self,
        input: impl Into<TransactionInput>,
        options: ProposeOptions,
    ) -> ProposalOutcome {
        let mut proposal = PendingProposal::new();
        let outcome = match self.run(&mut proposal, input.into(), &options).await {
            Ok(outcome) => outcome,
            Err(Halt::Cancelled(error)) => {
                info!(reason = %error, "proposal cancelled by user");
                ProposalOutcome::Cancelled
            },
            Err(Halt::Failed(error)) => {
                warn!(error = %error, status = %proposal.status(), "proposal failed");
                ProposalOutcome::Failed(error)
            },
        };

        let terminal = outcome.status();
        if proposal.status() != terminal {
            if let Err(error) = proposal.advance(terminal) {
                warn!(error = %error, "proposal ended outside its lifecycle");
            }
        }
        debug!(
            history = ?proposal.history(),
            transaction_type = ?options.transaction_type,
            "proposal finished"
        );
        outcome
    }

    async fn run(
        &self,
        proposal: &mut PendingProposal,
        input: TransactionInput,
        options: &ProposeOptions,
    ) -> Result<ProposalOutcome, Halt> {
        let (signer, owner) = self
            .signer
            .as_ref()
            .and_then(|signer| signer.owner().map(|owner| (signer, owner)))
            .ok_or(ProposalError::NotConnected)?;
        let safe = self
            .config
            .borrow()
            .safe_address
            .ok_or(ProposalError::SafeAddressUnresolved)?;
        let client = self.client.as_ref().ok_or(ProposalError::ClientUnavailable)?;
        let batch = input.into_batch()?;

        let action_key = options
            .action_key
            .clone()
            .unwrap_or_else(|| batch.action_key());
        let _slot = InFlightSlot::acquire(&self.in_flight, &action_key)?;

        proposal.advance(ProposalStatus::Building)?;
        debug!(safe = %safe, owner = %owner, calls = batch.len(), "building safe transaction");
        let transaction = signer_step(
            signer.create_transaction(safe, &batch).await,
            ProposalError::signing,
        )?;
        let safe_tx_hash = signer_step(
            signer.transaction_hash(&transaction).await,
            ProposalError::signing,
        )?;
        info!(safe_tx_hash = %safe_tx_hash, "safe transaction created");

        proposal.advance(ProposalStatus::AwaitingSignature)?;
        let signed = signer_step(signer.sign(transaction).await, ProposalError::signing)?;

        proposal.advance(ProposalStatus::Submitting)?;
        let transaction_hash =
            signer_step(signer.execute(signed).await, ProposalError::submission)?;
        info!(transaction_hash = %transaction_hash, "safe transaction executed");

        proposal.advance(ProposalStatus::AwaitingConfirmation)?;
        let timeout = self.settings.confirmation_timeout;
        let wait = client.wait_for_receipt(transaction_hash, self.settings.confirmations);
        let Ok(receipt) = tokio::time::timeout(timeout, wait).await else {
            warn!(
                transaction_hash = %transaction_hash,
                timeout_secs = timeout.as_secs(),
                "no receipt within confirmation timeout"
            );
            return Ok(ProposalOutcome::TimedOut {
                safe_tx_hash,
                transaction_hash,
                timeout,
            });
        };
        let receipt = receipt.map_err(|error| ProposalError::chain(error.to_string()))?;
        if receipt.is_reverted() {
            return Err(ProposalError::OnChainRevert {
                transaction_hash: receipt.transaction_hash,
            }
            .into());
        }

        if let Some(transaction_type) = options.transaction_type {
            let removed = transaction_type.invalidate(&self.cache).await;
            debug!(transaction_type = %transaction_type, removed, "invalidated stale reads");
        }
        info!(
            transaction_hash = %transaction_hash,
            block = receipt.block_number,
            "proposal confirmed"
        );
        Ok(ProposalOutcome::Confirmed {
            safe_tx_hash,
            transaction_hash,
        })
    }
}

impl fmt::Debug for ProposalLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProposalLifecycle")
            .field("settings", &self.settings)
            .field("has_signer", &self.signer.is_some())
            .field("has_client", &self.client.is_some())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes};

    use super::*;
    use crate::cache::{CacheKey, ReadCache, ReadKey};
    use crate::chain::ReceiptStatus;
    use crate::contracts::Role;
    use crate::test_utils::{FakeChain, FakeSigner, SignerStage};

    const INTERACTOR: Address = Address::repeat_byte(0xaa);
    const SAFE: Address = Address::repeat_byte(0x5a);
    const ALICE: Address = Address::repeat_byte(0x01);

    struct Harness {
        chain: Arc<FakeChain>,
        signer: Arc<FakeSigner>,
        cache: SharedReadCache,
        lifecycle: ProposalLifecycle,
        _config: watch::Sender<ContractAddressConfig>,
    }

    fn harness() -> Harness {
        let chain = Arc::new(FakeChain::new());
        let signer = Arc::new(FakeSigner::connected(ALICE));
        let cache = Arc::new(ReadCache::with_defaults());
        let (tx, rx) = watch::channel(ContractAddressConfig {
            interactor_address: Some(INTERACTOR),
            safe_address: Some(SAFE),
        });
        let lifecycle = ProposalLifecycle::new(rx, cache.clone())
            .with_signer(signer.clone())
            .with_client(chain.clone());
        Harness {
            chain,
            signer,
            cache,
            lifecycle,
            _config: tx,
        }
    }

    fn read(function_name: &'static str) -> CacheKey {
        CacheKey::Read(ReadKey {
            function_name,
            contract: INTERACTOR,
            args: Bytes::new(),
            chain_id: 8_453,
        })
    }

    #[tokio::test]
    async fn test_confirmed_invalidates_after_receipt() {
        let h = harness();
        h.chain.set_receipt(h.signer.chain_tx_hash(), ReceiptStatus::Success);
        h.cache.insert(read("paused"), Bytes::new()).await;

        let outcome = h.lifecycle.propose_bundle(&pause(INTERACTOR)).await;

        assert_eq!(
            outcome,
            ProposalOutcome::Confirmed {
                safe_tx_hash: h.signer.safe_tx_hash(),
                transaction_hash: h.signer.chain_tx_hash(),
            }
        );
        assert!(!h.cache.contains(&read("paused")).await);
        assert_eq!(h.cache.invalidation_count(), 1);
        assert!(!h.lifecycle.is_pending());
    }

    #[tokio::test]
    async fn test_not_connected_checked_first() {
        let cache = Arc::new(ReadCache::with_defaults());
        let (_tx, rx) = watch::channel(ContractAddressConfig::default());
        let lifecycle = ProposalLifecycle::new(rx, cache)
            .with_signer(Arc::new(FakeSigner::disconnected()));

        let outcome = lifecycle.propose(Vec::<TransactionRequest>::new(), ProposeOptions::default()).await;
        assert_eq!(outcome, ProposalOutcome::Failed(ProposalError::NotConnected));
        assert_eq!(outcome.status(), ProposalStatus::Failed);
    }

    #[tokio::test]
    async fn test_precondition_order() {
        let cache = Arc::new(ReadCache::with_defaults());
        let (tx, rx) = watch::channel(ContractAddressConfig {
            interactor_address: Some(INTERACTOR),
            safe_address: None,
        });
        let lifecycle =
            ProposalLifecycle::new(rx, cache).with_signer(Arc::new(FakeSigner::connected(ALICE)));

        let outcome = lifecycle.propose(Vec::<TransactionRequest>::new(), ProposeOptions::default()).await;
        assert_eq!(outcome, ProposalOutcome::Failed(ProposalError::SafeAddressUnresolved));

        tx.send_modify(|config| config.safe_address = Some(SAFE));
        let outcome = lifecycle.propose(Vec::<TransactionRequest>::new(), ProposeOptions::default()).await;
        assert_eq!(outcome, ProposalOutcome::Failed(ProposalError::ClientUnavailable));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let h = harness();
        let outcome = h.lifecycle.propose(Vec::<TransactionRequest>::new(), ProposeOptions::default()).await;
        assert_eq!(outcome, ProposalOutcome::Failed(ProposalError::EmptyBatch));
        assert_eq!(h.signer.created(), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_cancelled_without_invalidation() {
        let h = harness();
        h.signer.fail_at(
            SignerStage::Sign,
            SignerError::other("Error", "User rejected the request."),
        );
        h.cache.insert(read("hasRole"), Bytes::new()).await;

        let outcome = h
            .lifecycle
            .propose_bundle(&grant_role(INTERACTOR, ALICE, Role::Execute))
            .await;

        assert_eq!(outcome, ProposalOutcome::Cancelled);
        assert_eq!(outcome.error(), None);
        assert_eq!(h.cache.invalidation_count(), 0);
        assert!(h.cache.contains(&read("hasRole")).await);
    }

    #[tokio::test]
    async fn test_signer_failure_keeps_raw_message() {
        let h = harness();
        h.signer.fail_at(
            SignerStage::Execute,
            SignerError::other("RpcError", "insufficient funds for gas"),
        );

        let outcome = h.lifecycle.propose_bundle(&unpause(INTERACTOR)).await;

        assert_eq!(
            outcome,
            ProposalOutcome::Failed(ProposalError::submission(
                "RpcError: insufficient funds for gas"
            ))
        );
    }

    #[tokio::test]
    async fn test_revert_is_reported() {
        let h = harness();
        h.chain.set_receipt(h.signer.chain_tx_hash(), ReceiptStatus::Reverted);
        h.cache.insert(read("paused"), Bytes::new()).await;

        let outcome = h.lifecycle.propose_bundle(&pause(INTERACTOR)).await;

        assert_eq!(
            outcome,
            ProposalOutcome::Failed(ProposalError::OnChainRevert {
                transaction_hash: h.signer.chain_tx_hash(),
            })
        );
        assert_eq!(outcome.status(), ProposalStatus::Reverted);
        assert!(h.cache.contains(&read("paused")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout() {
        let mut h = harness();
        h.lifecycle = h.lifecycle.with_settings(ProposalSettings {
            confirmation_timeout: Duration::from_secs(30),
            confirmations: 1,
        });

        let outcome = h.lifecycle.propose_bundle(&pause(INTERACTOR)).await;

        assert!(matches!(outcome, ProposalOutcome::TimedOut { timeout, .. } if timeout == Duration::from_secs(30)));
        assert!(matches!(
            outcome.error(),
            Some(ProposalError::ConfirmationTimeout { timeout_secs: 30, .. })
        ));
        assert_eq!(h.cache.invalidation_count(), 0);
        assert!(!h.lifecycle.is_pending());
    }

    #[tokio::test]
    async fn test_duplicate_in_flight() {
        let h = harness();
        let lifecycle = Arc::new(h.lifecycle);
        let bundle = pause(INTERACTOR);

        let first = tokio::spawn({
            let lifecycle = lifecycle.clone();
            let bundle = bundle.clone();
            async move { lifecycle.propose_bundle(&bundle).await }
        });
        while !lifecycle.is_pending() {
            tokio::task::yield_now().await;
        }

        let second = lifecycle.propose_bundle(&bundle).await;
        assert!(matches!(
            second,
            ProposalOutcome::Failed(ProposalError::DuplicateInFlight { .. })
        ));

        h.chain.set_receipt(h.signer.chain_tx_hash(), ReceiptStatus::Success);
        let first = first.await.unwrap();
        assert!(first.is_confirmed());
        assert!(!lifecycle.is_pending());
    }

    #[test]
    fn test_pending_proposal_rejects_illegal_transition() {
        let mut proposal = PendingProposal::new();
        proposal.advance(ProposalStatus::Building).unwrap();
        assert_eq!(
            proposal.advance(ProposalStatus::Confirmed),
            Err(ProposalError::InvalidTransition {
                from: ProposalStatus::Building,
                to: ProposalStatus::Confirmed,
            })
        );
        assert_eq!(
            proposal.history(),
            &[ProposalStatus::Idle, ProposalStatus::Building]
        );
    }

    #[test]
    fn test_single_and_batch_input() {
        let request = pause(INTERACTOR).requests.remove(0);
        let batch = TransactionInput::from(request.clone()).into_batch().unwrap();
        assert_eq!(batch.transactions(), &[request.clone()]);

        let batch = TransactionInput::from(vec![request.clone(), request])
            .into_batch()
            .unwrap();
        assert_eq!(batch.len(), 2);
    }
}
