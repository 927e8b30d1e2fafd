//! Which cached reads a confirmed transaction makes stale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{QueryKey, ReadCache};

/// Kind of state-changing transaction proposed to the Safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionType {
    /// `grantRole`
    GrantRole,
    /// `revokeRole`
    RevokeRole,
    /// `setSubAccountLimits`
    SetSubAccountLimits,
    /// `setAllowedAddresses`
    SetAllowedAddresses,
    /// `pause`
    Pause,
    /// `unpause`
    Unpause,
}

impl TransactionType {
    /// Every transaction type.
    pub const ALL: [Self; 6] = [
        Self::GrantRole,
        Self::RevokeRole,
        Self::SetSubAccountLimits,
        Self::SetAllowedAddresses,
        Self::Pause,
        Self::Unpause,
    ];

    /// The contract function the transaction calls.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GrantRole => "grantRole",
            Self::RevokeRole => "revokeRole",
            Self::SetSubAccountLimits => "setSubAccountLimits",
            Self::SetAllowedAddresses => "setAllowedAddresses",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }

    /// Contract read functions whose cached results become stale.
    #[must_use]
    pub const fn read_functions(&self) -> &'static [&'static str] {
        match self {
            Self::GrantRole | Self::RevokeRole => &["hasRole", "getSubaccountsByRole"],
            Self::SetSubAccountLimits => &["getSubAccountLimits"],
            Self::SetAllowedAddresses => &["allowedAddresses"],
            Self::Pause | Self::Unpause => &["paused"],
        }
    }

    /// Aggregated queries whose cached results become stale.
    #[must_use]
    pub const fn query_keys(&self) -> &'static [QueryKey] {
        match self {
            Self::GrantRole | Self::RevokeRole => &[QueryKey::ManagedAccounts],
            Self::SetAllowedAddresses => &[QueryKey::AllowedAddresses],
            Self::SetSubAccountLimits | Self::Pause | Self::Unpause => &[],
        }
    }

    /// Removes every cached entry this transaction type makes stale.
    ///
    /// Returns the number of removed entries.
    pub async fn invalidate(&self, cache: &ReadCache) -> usize {
        cache.invalidate(self.read_functions(), self.query_keys()).await
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes};

    use super::*;
    use crate::cache::{CacheKey, QueryCacheKey, ReadKey};
    use crate::contracts::{IDeFiInteractor, function_name};

    fn read(function_name: &'static str) -> CacheKey {
        CacheKey::Read(ReadKey {
            function_name,
            contract: Address::repeat_byte(0xaa),
            args: Bytes::new(),
            chain_id: 8_453,
        })
    }

    #[test]
    fn test_read_functions_match_bindings() {
        let known = [
            function_name::<IDeFiInteractor::hasRoleCall>(),
            function_name::<IDeFiInteractor::getSubaccountsByRoleCall>(),
            function_name::<IDeFiInteractor::getSubAccountLimitsCall>(),
            function_name::<IDeFiInteractor::allowedAddressesCall>(),
            function_name::<IDeFiInteractor::pausedCall>(),
        ];
        for ty in TransactionType::ALL {
            for function in ty.read_functions() {
                assert!(known.contains(function), "{ty}: {function}");
            }
        }
    }

    #[test]
    fn test_names_match_write_bindings() {
        assert_eq!(
            TransactionType::SetSubAccountLimits.as_str(),
            function_name::<IDeFiInteractor::setSubAccountLimitsCall>()
        );
        assert_eq!(
            TransactionType::GrantRole.as_str(),
            function_name::<IDeFiInteractor::grantRoleCall>()
        );
    }

    #[tokio::test]
    async fn test_role_change_invalidates_accounts() {
        let cache = ReadCache::with_defaults();
        let accounts = QueryCacheKey {
            query: QueryKey::ManagedAccounts,
            contract: Address::repeat_byte(0xaa),
            chain_id: 8_453,
            scope: String::new(),
        };
        cache.insert(read("hasRole"), Bytes::new()).await;
        cache.insert(read("paused"), Bytes::new()).await;
        cache.insert_query(accounts.clone(), &Vec::<Address>::new()).await;

        let removed = TransactionType::RevokeRole.invalidate(&cache).await;

        assert_eq!(removed, 2);
        assert!(cache.contains(&read("paused")).await);
        assert!(!cache.contains(&CacheKey::Query(accounts)).await);
    }

    #[tokio::test]
    async fn test_limits_change_keeps_role_reads() {
        let cache = ReadCache::with_defaults();
        cache.insert(read("getSubAccountLimits"), Bytes::new()).await;
        cache.insert(read("hasRole"), Bytes::new()).await;

        TransactionType::SetSubAccountLimits.invalidate(&cache).await;

        assert!(!cache.contains(&read("getSubAccountLimits")).await);
        assert!(cache.contains(&read("hasRole")).await);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TransactionType::SetAllowedAddresses).unwrap();
        assert_eq!(json, "\"setAllowedAddresses\"");
    }
}
