//! Typed, cached reads of interactor and Safe state.
//!
//! Every accessor is an independent idempotent read against the contract
//! currently selected in the [`AddressRegistry`](crate::registry::AddressRegistry).
//! The plain `read_*` accessors log failures at `warn` and return `None`, so a
//! failed read renders as "absent". The `try_*` forms return the
//! [`ReadError`] for callers that must report it.

use std::collections::BTreeSet;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{trace, warn};

use crate::address::lower_hex;
use crate::allowance::{AcquiredBalance, TrackedToken};
use crate::cache::{CacheKey, QueryCacheKey, QueryKey, ReadKey, SharedReadCache};
use crate::chain::{ChainError, SharedChainClient};
use crate::contracts::{IDeFiInteractor, ISafe, Role, function_name};
use crate::limits::SubAccountLimits;
use crate::oracle::OracleSnapshot;
use crate::registry::ContractAddressConfig;

/// Errors raised by a contract read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// No interactor is selected.
    #[error("no interactor contract configured")]
    ContractNotConfigured,

    /// The chain call failed.
    #[error("{function} read failed: {source}")]
    Chain {
        /// The contract function.
        function: &'static str,
        /// Underlying error.
        #[source]
        source: ChainError,
    },

    /// The return data could not be decoded.
    #[error("{function} returned undecodable data: {message}")]
    Decode {
        /// The contract function.
        function: &'static str,
        /// Decoder message.
        message: String,
    },
}

impl ReadError {
    /// Returns `true` if repeating the read may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Chain { source, .. } => source.is_recoverable(),
            Self::ContractNotConfigured | Self::Decode { .. } => false,
        }
    }
}

/// Reads permission state through the shared cache.
#[derive(Clone)]
pub struct PermissionReader {
    client: SharedChainClient,
    cache: SharedReadCache,
    config: watch::Receiver<ContractAddressConfig>,
}

impl PermissionReader {
    /// Creates a reader following the selection published on `config`.
    #[must_use]
    pub const fn new(
        client: SharedChainClient,
        cache: SharedReadCache,
        config: watch::Receiver<ContractAddressConfig>,
    ) -> Self {
        Self {
            client,
            cache,
            config,
        }
    }

    /// The shared read cache.
    #[must_use]
    pub const fn cache(&self) -> &SharedReadCache {
        &self.cache
    }

    /// The selected interactor.
    pub fn contract(&self) -> Result<Address, ReadError> {
        self.config
            .borrow()
            .interactor_address
            .ok_or(ReadError::ContractNotConfigured)
    }

    /// Whether `account` holds `role`.
    pub async fn read_role_membership(&self, account: Address, role: Role) -> Option<bool> {
        absent_on_error(self.try_read_role_membership(account, role).await)
    }

    /// Whether `account` holds `role`.
    pub async fn try_read_role_membership(
        &self,
        account: Address,
        role: Role,
    ) -> Result<bool, ReadError> {
        let call = IDeFiInteractor::hasRoleCall {
            member: account,
            roleId: role.id(),
        };
        Ok(self.call(self.contract()?, call).await?._0)
    }

    /// Spending limits of `account`. `None` when no account is given.
    pub async fn read_sub_account_limits(
        &self,
        account: Option<Address>,
    ) -> Option<SubAccountLimits> {
        let account = account?;
        absent_on_error(self.try_read_sub_account_limits(account).await)
    }

    /// Spending limits of `account`.
    pub async fn try_read_sub_account_limits(
        &self,
        account: Address,
    ) -> Result<SubAccountLimits, ReadError> {
        let call = IDeFiInteractor::getSubAccountLimitsCall {
            subAccount: account,
        };
        let limits = self.call(self.contract()?, call).await?;
        SubAccountLimits::from_words(limits.maxSpendingBps, limits.windowDuration).ok_or_else(
            || ReadError::Decode {
                function: function_name::<IDeFiInteractor::getSubAccountLimitsCall>(),
                message: "limit out of range".to_string(),
            },
        )
    }

    /// Whether `sub_account` may interact with `target`.
    pub async fn read_allowed_address(&self, sub_account: Address, target: Address) -> Option<bool> {
        absent_on_error(self.try_read_allowed_address(sub_account, target).await)
    }

    /// Whether `sub_account` may interact with `target`.
    pub async fn try_read_allowed_address(
        &self,
        sub_account: Address,
        target: Address,
    ) -> Result<bool, ReadError> {
        let call = IDeFiInteractor::allowedAddressesCall {
            subAccount: sub_account,
            target,
        };
        Ok(self.call(self.contract()?, call).await?._0)
    }

    /// Subset of `targets` that `sub_account` may interact with.
    ///
    /// Checks run concurrently; a failed check counts as not allowed.
    pub async fn read_allowed_targets(
        &self,
        sub_account: Address,
        targets: &[Address],
    ) -> BTreeSet<Address> {
        let key = self
            .query_key(QueryKey::AllowedAddresses, target_scope(sub_account, targets))
            .await
            .ok();
        let mut started = None;
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get_query::<BTreeSet<Address>>(key).await {
                trace!(sub_account = %sub_account, "allowed targets cache hit");
                return cached;
            }
            started = Some(self.cache.query_generation(key).await);
        }

        let checks = targets
            .iter()
            .map(|target| self.try_read_allowed_address(sub_account, *target));
        let allowed: BTreeSet<Address> = join_all(checks)
            .await
            .into_iter()
            .zip(targets)
            .filter_map(|(result, target)| match result {
                Ok(true) => Some(*target),
                Ok(false) => None,
                Err(error) => {
                    warn!(contract = %target, error = %error, "allowed-address check failed");
                    None
                },
            })
            .collect();
        if let (Some(key), Some(started)) = (key, started) {
            self.cache.insert_query_if_current(key, &allowed, started).await;
        }
        allowed
    }

    /// Whether interactions are paused.
    pub async fn read_paused_state(&self) -> Option<bool> {
        absent_on_error(self.try_read_paused_state().await)
    }

    /// Whether interactions are paused.
    pub async fn try_read_paused_state(&self) -> Result<bool, ReadError> {
        Ok(self
            .call(self.contract()?, IDeFiInteractor::pausedCall {})
            .await?
            ._0)
    }

    /// The Safe controlling the selected interactor.
    pub async fn read_safe_address(&self) -> Option<Address> {
        let contract = absent_on_error(self.contract())?;
        self.read_safe_address_at(contract).await
    }

    /// The Safe controlling `contract`.
    pub async fn read_safe_address_at(&self, contract: Address) -> Option<Address> {
        absent_on_error(
            self.call(contract, IDeFiInteractor::avatarCall {})
                .await
                .map(|r| r._0),
        )
    }

    /// The oracle's latest portfolio valuation.
    pub async fn read_oracle_snapshot(&self) -> Option<OracleSnapshot> {
        absent_on_error(self.try_read_oracle_snapshot().await)
    }

    /// The oracle's latest portfolio valuation.
    pub async fn try_read_oracle_snapshot(&self) -> Result<OracleSnapshot, ReadError> {
        let value = self
            .call(self.contract()?, IDeFiInteractor::getSafeValueCall {})
            .await?;
        Ok(OracleSnapshot {
            total_value_usd: value.totalValueUSD,
            last_updated: saturating_u64(value.lastUpdated),
            update_count: saturating_u64(value.updateCount),
        })
    }

    /// The contract's own staleness verdict for `max_age_secs`.
    pub async fn read_is_stale(&self, max_age_secs: u64) -> Option<bool> {
        let result = match self.contract() {
            Ok(contract) => self
                .call(
                    contract,
                    IDeFiInteractor::isValueStaleCall {
                        maxAge: U256::from(max_age_secs),
                    },
                )
                .await
                .map(|r| r._0),
            Err(error) => Err(error),
        };
        absent_on_error(result)
    }

    /// Balance of `token` that `account` acquired through protocol
    /// interactions.
    pub async fn read_acquired_balance(&self, account: Address, token: Address) -> Option<U256> {
        absent_on_error(self.try_read_acquired_balance(account, token).await)
    }

    async fn try_read_acquired_balance(
        &self,
        account: Address,
        token: Address,
    ) -> Result<U256, ReadError> {
        let call = IDeFiInteractor::getAcquiredBalanceCall {
            subAccount: account,
            token,
        };
        Ok(self.call(self.contract()?, call).await?._0)
    }

    /// Acquired balances of `account` for every tracked token, in `tokens`
    /// order.
    ///
    /// Reads run concurrently; a failed read counts as a zero balance.
    pub async fn read_acquired_balances(
        &self,
        account: Address,
        tokens: &[TrackedToken],
    ) -> Vec<AcquiredBalance> {
        let token_addresses: Vec<Address> = tokens.iter().map(|t| t.address).collect();
        let key = self
            .query_key(
                QueryKey::AcquiredBalances,
                target_scope(account, &token_addresses),
            )
            .await
            .ok();
        let mut started = None;
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get_query::<Vec<AcquiredBalance>>(key).await {
                return cached;
            }
            started = Some(self.cache.query_generation(key).await);
        }

        let reads = tokens
            .iter()
            .map(|token| self.try_read_acquired_balance(account, token.address));
        let balances: Vec<AcquiredBalance> = join_all(reads)
            .await
            .into_iter()
            .zip(tokens)
            .map(|(result, token)| AcquiredBalance {
                token: token.address,
                symbol: token.symbol.clone(),
                decimals: token.decimals,
                balance: result.unwrap_or_else(|error| {
                    warn!(token = %token.symbol, error = %error, "acquired balance read failed");
                    U256::ZERO
                }),
            })
            .collect();

        if let (Some(key), Some(started)) = (key, started) {
            self.cache.insert_query_if_current(key, &balances, started).await;
        }
        balances
    }

    /// Remaining allowance of `account` as computed by the contract.
    pub async fn read_spending_allowance(&self, account: Address) -> Option<U256> {
        let result = match self.contract() {
            Ok(contract) => self
                .call(
                    contract,
                    IDeFiInteractor::getSpendingAllowanceCall {
                        subAccount: account,
                    },
                )
                .await
                .map(|r| r._0),
            Err(error) => Err(error),
        };
        absent_on_error(result)
    }

    /// Every account holding `role`, in contract order.
    pub async fn try_read_subaccounts_by_role(&self, role: Role) -> Result<Vec<Address>, ReadError> {
        let call = IDeFiInteractor::getSubaccountsByRoleCall { roleId: role.id() };
        Ok(self.call(self.contract()?, call).await?._0)
    }

    /// Owners of the Safe controlling the selected interactor.
    pub async fn read_safe_owners(&self) -> Option<Vec<Address>> {
        let known = self.config.borrow().safe_address;
        let safe = match known {
            Some(safe) => safe,
            None => self.read_safe_address().await?,
        };
        absent_on_error(
            self.call(safe, ISafe::getOwnersCall {})
                .await
                .map(|r| r._0),
        )
    }

    /// Whether `account` owns the Safe.
    pub async fn is_safe_owner(&self, account: Address) -> Option<bool> {
        Some(self.read_safe_owners().await?.contains(&account))
    }

    /// Builds the cache key of an aggregated query on the selected contract.
    pub async fn query_key(
        &self,
        query: QueryKey,
        scope: impl Into<String>,
    ) -> Result<QueryCacheKey, ReadError> {
        let contract = self.contract()?;
        let chain_id = self.chain_id(query.as_str()).await?;
        Ok(QueryCacheKey {
            query,
            contract,
            chain_id,
            scope: scope.into(),
        })
    }

    async fn chain_id(&self, function: &'static str) -> Result<u64, ReadError> {
        self.client
            .chain_id()
            .await
            .map_err(|source| ReadError::Chain { function, source })
    }

    /// Executes `call` against `contract` through the cache and decodes the
    /// return data.
    async fn call<C: SolCall>(&self, contract: Address, call: C) -> Result<C::Return, ReadError> {
        let function = function_name::<C>();
        let data = call.abi_encode();
        let key = CacheKey::Read(ReadKey {
            function_name: function,
            contract,
            args: Bytes::copy_from_slice(data.get(4..).unwrap_or_default()),
            chain_id: self.chain_id(function).await?,
        });

        if let Some(raw) = self.cache.get(&key).await {
            if let Ok(decoded) = C::abi_decode_returns(&raw, true) {
                return Ok(decoded);
            }
        }
        let started = self.cache.generation(&key).await;

        let raw = self
            .client
            .call(contract, Bytes::from(data))
            .await
            .map_err(|source| ReadError::Chain { function, source })?;
        let decoded = C::abi_decode_returns(&raw, true).map_err(|error| ReadError::Decode {
            function,
            message: error.to_string(),
        })?;
        self.cache.insert_if_current(key, raw, started).await;
        Ok(decoded)
    }
}

impl std::fmt::Debug for PermissionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionReader")
            .field("config", &*self.config.borrow())
            .finish_non_exhaustive()
    }
}

fn absent_on_error<T>(result: Result<T, ReadError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ReadError::ContractNotConfigured) => None,
        Err(error) => {
            warn!(error = %error, "contract read failed");
            None
        },
    }
}

/// `account:target,target,...` in lowercase hex.
fn target_scope(account: Address, targets: &[Address]) -> String {
    let targets: Vec<String> = targets.iter().map(lower_hex).collect();
    format!("{}:{}", lower_hex(&account), targets.join(","))
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_sol_types::SolValue;

    use super::*;
    use crate::cache::ReadCache;
    use crate::proposal::TransactionType;
    use crate::test_utils::FakeChain;

    const INTERACTOR: Address = Address::repeat_byte(0xaa);
    const SAFE: Address = Address::repeat_byte(0x5a);
    const ALICE: Address = Address::repeat_byte(0x01);

    fn reader(chain: &Arc<FakeChain>) -> PermissionReader {
        let (_tx, rx) = watch::channel(ContractAddressConfig {
            interactor_address: Some(INTERACTOR),
            safe_address: None,
        });
        PermissionReader::new(chain.clone(), Arc::new(ReadCache::with_defaults()), rx)
    }

    #[tokio::test]
    async fn test_role_membership_is_cached() {
        let chain = Arc::new(FakeChain::new());
        chain.respond(
            INTERACTOR,
            IDeFiInteractor::hasRoleCall {
                member: ALICE,
                roleId: Role::Execute.id(),
            },
            (true,).abi_encode_params(),
        );
        let reader = reader(&chain);

        assert_eq!(reader.read_role_membership(ALICE, Role::Execute).await, Some(true));
        assert_eq!(reader.read_role_membership(ALICE, Role::Execute).await, Some(true));
        assert_eq!(chain.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_read_is_absent() {
        let chain = Arc::new(FakeChain::new());
        let reader = reader(&chain);
        assert_eq!(reader.read_paused_state().await, None);
        assert!(matches!(
            reader.try_read_role_membership(ALICE, Role::Transfer).await,
            Err(ReadError::Chain { function: "hasRole", .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_reads_are_absent() {
        let chain = Arc::new(FakeChain::new());
        let (_tx, rx) = watch::channel(ContractAddressConfig::default());
        let reader = PermissionReader::new(chain.clone(), Arc::new(ReadCache::with_defaults()), rx);

        assert_eq!(reader.read_sub_account_limits(Some(ALICE)).await, None);
        assert_eq!(reader.read_sub_account_limits(None).await, None);
        assert_eq!(
            reader.try_read_subaccounts_by_role(Role::Execute).await,
            Err(ReadError::ContractNotConfigured)
        );
        assert_eq!(chain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_limits_and_snapshot_decode() {
        let chain = Arc::new(FakeChain::new());
        chain.respond(
            INTERACTOR,
            IDeFiInteractor::getSubAccountLimitsCall { subAccount: ALICE },
            (U256::from(500u64), U256::from(86_400u64)).abi_encode_params(),
        );
        chain.respond(
            INTERACTOR,
            IDeFiInteractor::getSafeValueCall {},
            (U256::from(7u64), U256::from(1_700_000_000u64), U256::from(3u64)).abi_encode_params(),
        );
        let reader = reader(&chain);

        assert_eq!(
            reader.read_sub_account_limits(Some(ALICE)).await,
            Some(SubAccountLimits::new(500, 86_400))
        );
        let snapshot = reader.read_oracle_snapshot().await.unwrap();
        assert_eq!(snapshot.total_value_usd, U256::from(7u64));
        assert_eq!(snapshot.last_updated, 1_700_000_000);
        assert_eq!(snapshot.update_count, 3);
    }

    #[tokio::test]
    async fn test_acquired_balances_failed_read_is_zero() {
        let chain = Arc::new(FakeChain::new());
        let usdc = TrackedToken::new("USDC", Address::repeat_byte(0xc1), 6);
        let weth = TrackedToken::new("WETH", Address::repeat_byte(0xc2), 18);
        chain.respond(
            INTERACTOR,
            IDeFiInteractor::getAcquiredBalanceCall {
                subAccount: ALICE,
                token: usdc.address,
            },
            (U256::from(1_000_000u64),).abi_encode_params(),
        );
        let reader = reader(&chain);

        let balances = reader.read_acquired_balances(ALICE, &[usdc, weth]).await;
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].balance, U256::from(1_000_000u64));
        assert_eq!(balances[1].balance, U256::ZERO);
        assert!(!balances[1].is_nonzero());
    }

    #[tokio::test]
    async fn test_allowed_targets_failed_check_is_not_allowed() {
        let chain = Arc::new(FakeChain::new());
        let pool = Address::repeat_byte(0xb1);
        let router = Address::repeat_byte(0xb2);
        let broken = Address::repeat_byte(0xb3);
        for (target, allowed) in [(pool, true), (router, false)] {
            chain.respond(
                INTERACTOR,
                IDeFiInteractor::allowedAddressesCall {
                    subAccount: ALICE,
                    target,
                },
                (allowed,).abi_encode_params(),
            );
        }
        let reader = reader(&chain);

        let allowed = reader.read_allowed_targets(ALICE, &[pool, router, broken]).await;
        assert_eq!(allowed, BTreeSet::from([pool]));
    }

    #[tokio::test]
    async fn test_read_in_flight_during_invalidation_is_not_cached() {
        let chain = Arc::new(FakeChain::new());
        chain.respond(INTERACTOR, IDeFiInteractor::pausedCall {}, (false,).abi_encode_params());
        let reader = reader(&chain);

        chain.hold_calls();
        let early = tokio::spawn({
            let reader = reader.clone();
            async move { reader.read_paused_state().await }
        });
        while chain.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        // The pause confirms while the early read is still on the wire.
        chain.respond(INTERACTOR, IDeFiInteractor::pausedCall {}, (true,).abi_encode_params());
        TransactionType::Pause.invalidate(reader.cache()).await;
        chain.release_calls();

        assert_eq!(early.await.unwrap(), Some(false));
        assert_eq!(reader.read_paused_state().await, Some(true));
        assert_eq!(reader.read_paused_state().await, Some(true));
        assert_eq!(chain.call_count(), 2);
    }

    #[tokio::test]
    async fn test_safe_owners() {
        let chain = Arc::new(FakeChain::new());
        chain.respond(INTERACTOR, IDeFiInteractor::avatarCall {}, (SAFE,).abi_encode_params());
        chain.respond(SAFE, ISafe::getOwnersCall {}, (vec![ALICE],).abi_encode_params());
        let reader = reader(&chain);

        assert_eq!(reader.read_safe_address().await, Some(SAFE));
        assert_eq!(reader.is_safe_owner(ALICE).await, Some(true));
        assert_eq!(reader.is_safe_owner(SAFE).await, Some(false));
    }
}
