//! Most-recently-used interactor addresses.

use alloy_primitives::Address;
use tracing::debug;

use super::store::{AddressStore, StoreError};
use crate::address::parse_account_address;

/// Storage key of the recent-address list.
pub const RECENT_ADDRESSES_KEY: &str = "recentDefiInteractors";

/// Maximum number of remembered addresses.
pub const MAX_RECENT: usize = 5;

/// Newest-first list of interactor addresses the user has selected.
///
/// Entries compare by address bytes, so re-adding an address in a different
/// letter case moves the existing entry instead of duplicating it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentAddresses {
    addresses: Vec<Address>,
}

impl RecentAddresses {
    /// Loads the list from `store`.
    ///
    /// Unreadable or unparsable storage yields an empty list and invalid
    /// entries are dropped.
    #[must_use]
    pub fn load(store: &dyn AddressStore) -> Self {
        let raw = match store.get(RECENT_ADDRESSES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(error) => {
                debug!(error = %error, "recent addresses unavailable");
                return Self::default();
            },
        };
        let Ok(entries) = serde_json::from_str::<Vec<String>>(&raw) else {
            debug!("ignoring unparsable recent addresses");
            return Self::default();
        };

        let mut recent = Self::default();
        for address in entries.iter().filter_map(|e| parse_account_address(e).ok()) {
            if !recent.addresses.contains(&address) {
                recent.addresses.push(address);
            }
        }
        recent.addresses.truncate(MAX_RECENT);
        recent
    }

    /// Writes the list to `store`. An empty list removes the key.
    pub fn save(&self, store: &dyn AddressStore) -> Result<(), StoreError> {
        if self.addresses.is_empty() {
            return store.remove(RECENT_ADDRESSES_KEY);
        }
        let entries: Vec<String> = self.addresses.iter().map(|a| a.to_checksum(None)).collect();
        let raw = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string());
        store.set(RECENT_ADDRESSES_KEY, &raw)
    }

    /// Moves `address` to the front, dropping the oldest entry past the cap.
    pub fn add(&mut self, address: Address) {
        self.addresses.retain(|existing| *existing != address);
        self.addresses.insert(0, address);
        self.addresses.truncate(MAX_RECENT);
    }

    /// Removes `address`. Returns `true` if it was present.
    pub fn remove(&mut self, address: &Address) -> bool {
        let before = self.addresses.len();
        self.addresses.retain(|existing| existing != address);
        self.addresses.len() != before
    }

    /// Forgets every address.
    pub fn clear(&mut self) {
        self.addresses.clear();
    }

    /// Addresses, newest first.
    #[must_use]
    pub fn as_slice(&self) -> &[Address] {
        &self.addresses
    }

    /// Number of remembered addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns `true` if nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
