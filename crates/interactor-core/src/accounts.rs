//! Managed sub-accounts: everyone holding at least one interactor role.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cache::QueryKey;
use crate::contracts::Role;
use crate::reader::{PermissionReader, ReadError};

/// One managed sub-account and the roles it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubAccount {
    /// The account.
    pub address: Address,
    /// Holds [`Role::Execute`].
    pub has_execute_role: bool,
    /// Holds [`Role::Transfer`].
    pub has_transfer_role: bool,
    /// When the account was first granted a role, if known.
    pub added_at: Option<u64>,
}

impl SubAccount {
    /// Returns `true` if the account holds `role`.
    #[must_use]
    pub const fn has_role(&self, role: Role) -> bool {
        match role {
            Role::Execute => self.has_execute_role,
            Role::Transfer => self.has_transfer_role,
        }
    }

    /// Roles held, in display order.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        Role::ALL.into_iter().filter(|role| self.has_role(*role)).collect()
    }
}

/// Unions the per-role account lists.
///
/// Order is the `execute` list followed by accounts only in `transfer`.
/// Each account appears once with both flags set from list membership.
#[must_use]
pub fn merge_role_sets(execute: &[Address], transfer: &[Address]) -> Vec<SubAccount> {
    let mut merged: Vec<SubAccount> = Vec::with_capacity(execute.len() + transfer.len());
    for (role, accounts) in [(Role::Execute, execute), (Role::Transfer, transfer)] {
        for address in accounts {
            let index = match merged.iter().position(|entry| entry.address == *address) {
                Some(index) => index,
                None => {
                    merged.push(SubAccount {
                        address: *address,
                        has_execute_role: false,
                        has_transfer_role: false,
                        added_at: None,
                    });
                    merged.len() - 1
                },
            };
            let entry = &mut merged[index];
            match role {
                Role::Execute => entry.has_execute_role = true,
                Role::Transfer => entry.has_transfer_role = true,
            }
        }
    }
    merged
}

/// Lists the managed sub-accounts of the selected interactor.
#[derive(Debug, Clone)]
pub struct ManagedAccountAggregator {
    reader: PermissionReader,
}

impl ManagedAccountAggregator {
    /// Creates an aggregator reading through `reader`.
    #[must_use]
    pub const fn new(reader: PermissionReader) -> Self {
        Self { reader }
    }

    /// Fetches both role lists concurrently and merges them.
    ///
    /// The merged list is cached under [`QueryKey::ManagedAccounts`] until a
    /// role change is confirmed.
    pub async fn aggregate(&self) -> Result<Vec<SubAccount>, ReadError> {
        let key = self.reader.query_key(QueryKey::ManagedAccounts, "").await?;
        if let Some(cached) = self.reader.cache().get_query::<Vec<SubAccount>>(&key).await {
            trace!(accounts = cached.len(), "managed accounts cache hit");
            return Ok(cached);
        }
        let started = self.reader.cache().query_generation(&key).await;

        let (execute, transfer) = tokio::try_join!(
            self.reader.try_read_subaccounts_by_role(Role::Execute),
            self.reader.try_read_subaccounts_by_role(Role::Transfer),
        )?;
        let accounts = merge_role_sets(&execute, &transfer);
        debug!(
            execute = execute.len(),
            transfer = transfer.len(),
            merged = accounts.len(),
            "aggregated managed accounts"
        );

        self.reader
            .cache()
            .insert_query_if_current(key, &accounts, started)
            .await;
        Ok(accounts)
    }
}
