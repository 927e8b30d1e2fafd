//! Selection and persistence of the active interactor contract.
//!
//! The registry is the single owner of [`ContractAddressConfig`]. Every
//! component that needs the active contract receives a
//! [`watch::Receiver`] from [`AddressRegistry::subscribe`] and observes
//! changes through it.
//!
//! # Resolution order
//!
//! 1. the `defiInteractor` query parameter, when it is a valid address (it is
//!    then persisted)
//! 2. the persisted `defiInteractor` value, when it is a valid address
//! 3. unconfigured
//!
//! The Safe address is never chosen by the user. It is read from the
//! contract's `avatar()` by [`AddressRegistry::refresh_safe_address`] and
//! cleared whenever the interactor changes.

mod recent;
mod store;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use recent::{MAX_RECENT, RECENT_ADDRESSES_KEY, RecentAddresses};
pub use store::{AddressStore, FileAddressStore, MemoryAddressStore, StoreError};

use crate::address::{AddressError, parse_account_address};
use crate::reader::PermissionReader;

/// Query parameter and storage key of the selected interactor.
pub const INTERACTOR_KEY: &str = "defiInteractor";

/// Legacy query parameter and storage key that held a Safe address.
pub const LEGACY_SAFE_KEY: &str = "safe";

/// Errors raised by the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The supplied interactor address is malformed.
    #[error(transparent)]
    InvalidAddressFormat(#[from] AddressError),

    /// The operation needs a selected interactor.
    #[error("no interactor contract configured")]
    ContractNotConfigured,

    /// Persisting the selection failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The active contract pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddressConfig {
    /// The selected interactor contract.
    pub interactor_address: Option<Address>,
    /// The Safe controlling the interactor, as last read from the contract.
    pub safe_address: Option<Address>,
}

impl ContractAddressConfig {
    /// Returns `true` if an interactor is selected.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.interactor_address.is_some()
    }
}

/// Ordered `key=value` pairs of a URL query string.
///
/// Stands in for the location bar: the CLI maps `--contract` to
/// `defiInteractor` and prints the normalized query back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parses `a=1&b=2`, with or without a leading `?`.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces every value of `key` with one `value`, keeping its position.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.pairs[index].1 = value;
                let mut seen = 0usize;
                self.pairs.retain(|(k, _)| {
                    if k == key {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            },
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    /// Removes every value of `key`.
    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    /// Returns `true` if there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.pairs.iter().enumerate() {
            if index > 0 {
                f.write_str("&")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Owner of the active contract selection.
pub struct AddressRegistry {
    store: Arc<dyn AddressStore>,
    query: Mutex<QueryParams>,
    recent: Mutex<RecentAddresses>,
    state: watch::Sender<ContractAddressConfig>,
}

impl AddressRegistry {
    /// Creates a registry and resolves the initial selection from `query`
    /// and `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AddressStore>, query: QueryParams) -> Self {
        let recent = RecentAddresses::load(store.as_ref());
        let (state, _) = watch::channel(ContractAddressConfig::default());
        let registry = Self {
            store,
            query: Mutex::new(query),
            recent: Mutex::new(recent),
            state,
        };
        registry.resolve();
        registry
    }

    /// Re-runs resolution against the current query and store.
    pub fn resolve(&self) -> ContractAddressConfig {
        let from_query = self
            .query()
            .get(INTERACTOR_KEY)
            .and_then(|value| parse_account_address(value).ok());

        let interactor = if let Some(address) = from_query {
            self.persist_interactor(address);
            let mut query = self.query();
            query.set(INTERACTOR_KEY, address.to_checksum(None));
            query.remove(LEGACY_SAFE_KEY);
            Some(address)
        } else {
            self.persisted_interactor()
        };

        self.state.send_if_modified(|config| {
            if config.interactor_address == interactor {
                return false;
            }
            config.interactor_address = interactor;
            config.safe_address = None;
            true
        });
        debug!(interactor = ?interactor, "resolved interactor");
        self.config()
    }

    /// Selects a new interactor.
    ///
    /// Persists the choice, forgets the derived Safe address, drops the legacy
    /// `safe` key, updates the query string, records the address as recent
    /// and notifies subscribers. A failure to persist is logged and does not
    /// fail the call.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidAddressFormat`] if `input` is not a
    /// valid account address. Nothing changes in that case.
    pub fn set_interactor(&self, input: &str) -> Result<Address, RegistryError> {
        let address = parse_account_address(input)?;

        self.persist_interactor(address);
        if let Err(error) = self.store.remove(LEGACY_SAFE_KEY) {
            warn!(error = %error, "failed to remove legacy safe key");
        }

        {
            let mut query = self.query();
            query.set(INTERACTOR_KEY, address.to_checksum(None));
            query.remove(LEGACY_SAFE_KEY);
        }

        {
            let mut recent = self.recent_guard();
            recent.add(address);
            if let Err(error) = recent.save(self.store.as_ref()) {
                warn!(error = %error, "failed to persist recent addresses");
            }
        }

        self.state.send_modify(|config| {
            config.interactor_address = Some(address);
            config.safe_address = None;
        });
        info!(interactor = %address, "interactor selected");
        Ok(address)
    }

    /// Forgets the selected interactor and its persisted value.
    pub fn clear(&self) {
        if let Err(error) = self.store.remove(INTERACTOR_KEY) {
            warn!(error = %error, "failed to remove persisted interactor");
        }
        self.query().remove(INTERACTOR_KEY);
        self.state.send_replace(ContractAddressConfig::default());
        info!("interactor cleared");
    }

    /// Returns `true` if an interactor is selected.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.borrow().is_configured()
    }

    /// Snapshot of the current selection.
    #[must_use]
    pub fn config(&self) -> ContractAddressConfig {
        *self.state.borrow()
    }

    /// Receiver observing every change to the selection.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ContractAddressConfig> {
        self.state.subscribe()
    }

    /// The normalized query string.
    #[must_use]
    pub fn query_string(&self) -> String {
        self.query().to_string()
    }

    /// Recently selected interactors, newest first.
    #[must_use]
    pub fn recent(&self) -> Vec<Address> {
        self.recent_guard().as_slice().to_vec()
    }

    /// Removes one address from the recent list.
    pub fn remove_recent(&self, address: &Address) -> Result<bool, RegistryError> {
        let mut recent = self.recent_guard();
        let removed = recent.remove(address);
        if removed {
            recent.save(self.store.as_ref())?;
        }
        Ok(removed)
    }

    /// Forgets the recent list.
    pub fn clear_recent(&self) -> Result<(), RegistryError> {
        let mut recent = self.recent_guard();
        recent.clear();
        recent.save(self.store.as_ref())?;
        Ok(())
    }

    /// Re-reads the Safe address from the selected contract's `avatar()`.
    ///
    /// Returns `Ok(None)` when the read fails or the selection changed while
    /// it was in flight; the stale result is discarded in that case.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ContractNotConfigured`] if nothing is
    /// selected.
    pub async fn refresh_safe_address(
        &self,
        reader: &PermissionReader,
    ) -> Result<Option<Address>, RegistryError> {
        let interactor = self
            .config()
            .interactor_address
            .ok_or(RegistryError::ContractNotConfigured)?;

        let Some(safe) = reader.read_safe_address_at(interactor).await else {
            return Ok(None);
        };

        let applied = self.state.send_if_modified(|config| {
            if config.interactor_address != Some(interactor) {
                return false;
            }
            let changed = config.safe_address != Some(safe);
            config.safe_address = Some(safe);
            changed
        });
        if self.config().interactor_address != Some(interactor) {
            debug!(interactor = %interactor, "discarding safe address for replaced interactor");
            return Ok(None);
        }
        if applied {
            debug!(interactor = %interactor, safe = %safe, "safe address updated");
        }
        Ok(Some(safe))
    }

    fn persist_interactor(&self, address: Address) {
        if let Err(error) = self.store.set(INTERACTOR_KEY, &address.to_checksum(None)) {
            warn!(interactor = %address, error = %error, "failed to persist interactor");
        }
    }

    fn persisted_interactor(&self) -> Option<Address> {
        match self.store.get(INTERACTOR_KEY) {
            Ok(Some(value)) => match parse_account_address(&value) {
                Ok(address) => Some(address),
                Err(error) => {
                    debug!(error = %error, "ignoring invalid persisted interactor");
                    None
                },
            },
            Ok(None) => None,
            Err(error) => {
                warn!(error = %error, "failed to read persisted interactor");
                None
            },
        }
    }

    fn query(&self) -> MutexGuard<'_, QueryParams> {
        self.query.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recent_guard(&self) -> MutexGuard<'_, RecentAddresses> {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AddressRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRegistry")
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}
