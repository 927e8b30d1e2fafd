//! Contract selection across restarts and its effect on reads and proposals.

mod common;

use std::sync::Arc;

use alloy_sol_types::SolValue;
use common::{CHAIN_TX_HASH, INTERACTOR, MockChain, MockSigner, SAFE};
use interactor_core::chain::ReceiptStatus;
use interactor_core::contracts::IDeFiInteractor;
use interactor_core::proposal::{self, ProposalError};
use interactor_core::{
    AddressRegistry, FileAddressStore, PermissionReader, ProposalLifecycle, ProposalOutcome,
    QueryParams, RegistryError,
};
use tempfile::tempdir;

const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

fn file_registry(dir: &std::path::Path, query: &str) -> AddressRegistry {
    let store = Arc::new(FileAddressStore::new(dir.join("state.json")));
    AddressRegistry::new(store, QueryParams::parse(query))
}

#[test]
fn selection_survives_restart() {
    let dir = tempdir().unwrap();

    let registry = file_registry(dir.path(), "");
    assert!(!registry.is_configured());
    let selected = registry
        .set_interactor(&CHECKSUMMED.to_lowercase())
        .unwrap();

    let reloaded = file_registry(dir.path(), "");
    assert_eq!(reloaded.config().interactor_address, Some(selected));
    assert_eq!(reloaded.recent(), vec![selected]);
    assert_eq!(reloaded.config().safe_address, None);

    reloaded.clear();
    assert!(!file_registry(dir.path(), "").is_configured());
}

#[test]
fn query_parameter_overrides_persisted_choice() {
    let dir = tempdir().unwrap();
    file_registry(dir.path(), "")
        .set_interactor("0x1111111111111111111111111111111111111111")
        .unwrap();

    let registry = file_registry(dir.path(), &format!("?defiInteractor={CHECKSUMMED}"));
    assert_eq!(
        registry.config().interactor_address.map(|a| a.to_checksum(None)),
        Some(CHECKSUMMED.to_string())
    );

    let reloaded = file_registry(dir.path(), "");
    assert_eq!(
        reloaded.config().interactor_address,
        registry.config().interactor_address
    );
}

#[test]
fn corrupt_state_file_reads_as_unconfigured() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), b"{not json").unwrap();

    let registry = file_registry(dir.path(), "");
    assert!(!registry.is_configured());
}

#[tokio::test]
async fn proposals_wait_for_safe_address() {
    let dir = tempdir().unwrap();
    let registry = file_registry(dir.path(), "");
    registry.set_interactor(&INTERACTOR.to_checksum(None)).unwrap();

    let chain = MockChain::new();
    chain.respond(
        INTERACTOR,
        IDeFiInteractor::avatarCall {},
        (SAFE,).abi_encode_params(),
    );
    chain.mine(CHAIN_TX_HASH, ReceiptStatus::Success);

    let cache = common::shared_cache();
    let reader = PermissionReader::new(chain.clone(), cache.clone(), registry.subscribe());
    let lifecycle = ProposalLifecycle::new(registry.subscribe(), cache)
        .with_signer(MockSigner::approving())
        .with_client(chain.clone());

    let bundle = proposal::pause(INTERACTOR);
    assert_eq!(
        lifecycle.propose_bundle(&bundle).await,
        ProposalOutcome::Failed(ProposalError::SafeAddressUnresolved)
    );

    assert_eq!(
        registry.refresh_safe_address(&reader).await.unwrap(),
        Some(SAFE)
    );
    assert!(lifecycle.propose_bundle(&bundle).await.is_confirmed());
}

#[tokio::test]
async fn refresh_requires_selection() {
    let dir = tempdir().unwrap();
    let registry = file_registry(dir.path(), "");
    let reader = PermissionReader::new(
        MockChain::new(),
        common::shared_cache(),
        registry.subscribe(),
    );

    assert!(matches!(
        registry.refresh_safe_address(&reader).await,
        Err(RegistryError::ContractNotConfigured)
    ));
    assert_eq!(reader.read_paused_state().await, None);
}
