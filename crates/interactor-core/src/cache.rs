//! Shared cache for contract reads and aggregated queries.
//!
//! Two kinds of entries live in the same map:
//!
//! ```text
//! ReadCache
//!     ├── CacheKey::Read(ReadKey)      raw ABI return data of one contract call
//!     │       └── (function_name, contract, args, chain_id)
//!     └── CacheKey::Query(QueryCacheKey)  JSON of an aggregated result
//!             └── (query, contract, chain_id, scope)
//! ```
//!
//! Entries expire after a TTL. After a confirmed proposal the lifecycle calls
//! [`ReadCache::invalidate`] with the read functions and query keys that
//! transaction type affects; matching entries are removed under one write
//! lock, so a read issued after `invalidate` returns never sees stale data.
//!
//! A fetch that was already in flight when `invalidate` ran may carry the old
//! value. Fetches capture a [`Generation`] before going to the chain and store
//! through [`ReadCache::insert_if_current`], which drops the value when an
//! invalidation of the same function or query happened in between.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ReadSection;

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 4_096;

/// Default time-to-live for cached entries.
pub const DEFAULT_TTL_SECS: u64 = 30;

/// Named aggregated queries that are cached as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    /// Union of the per-role sub-account lists.
    ManagedAccounts,
    /// Allowed protocol targets of one sub-account.
    AllowedAddresses,
    /// Acquired balances of one sub-account.
    AcquiredBalances,
}

impl QueryKey {
    /// Returns the key as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManagedAccounts => "managedAccounts",
            Self::AllowedAddresses => "allowedAddresses",
            Self::AcquiredBalances => "acquiredBalances",
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a single contract read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadKey {
    /// Contract function name, e.g. `hasRole`.
    pub function_name: &'static str,
    /// Contract the call was made against.
    pub contract: Address,
    /// ABI-encoded arguments (call data without the selector).
    pub args: Bytes,
    /// Chain the read was made on.
    pub chain_id: u64,
}

/// Identity of an aggregated query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryCacheKey {
    /// Which query.
    pub query: QueryKey,
    /// Contract the query was made against.
    pub contract: Address,
    /// Chain the query was made on.
    pub chain_id: u64,
    /// Query-specific discriminator, e.g. the sub-account.
    pub scope: String,
}

/// Key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single contract read.
    Read(ReadKey),
    /// An aggregated query.
    Query(QueryCacheKey),
}

/// Invalidation generation of one function or query, captured before a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

impl CacheKey {
    fn matches(&self, read_functions: &[&str], query_keys: &[QueryKey]) -> bool {
        match self {
            Self::Read(key) => read_functions.contains(&key.function_name),
            Self::Query(key) => query_keys.contains(&key.query),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(key) => write!(f, "read:{}@{}:{}", key.function_name, key.contract, key.chain_id),
            Self::Query(key) => write!(
                f,
                "query:{}@{}:{}:{}",
                key.query, key.contract, key.chain_id, key.scope
            ),
        }
    }
}

/// Configuration for the read cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCacheConfig {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Time-to-live for entries in seconds.
    pub ttl_secs: u64,
}

impl Default for ReadCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl ReadCacheConfig {
    /// Creates a config with custom TTL.
    #[must_use]
    pub const fn with_ttl_secs(mut self, ttl: u64) -> Self {
        self.ttl_secs = ttl;
        self
    }

    /// Creates a config with custom max entries. Zero is raised to one.
    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = if max == 0 { 1 } else { max };
        self
    }

    const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl From<&ReadSection> for ReadCacheConfig {
    fn from(section: &ReadSection) -> Self {
        Self::default()
            .with_ttl_secs(section.cache_ttl_secs)
            .with_max_entries(section.max_entries)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    function_generations: HashMap<String, u64>,
    query_generations: HashMap<QueryKey, u64>,
}

impl CacheState {
    fn generation(&self, key: &CacheKey) -> Generation {
        let current = match key {
            CacheKey::Read(key) => self.function_generations.get(key.function_name),
            CacheKey::Query(key) => self.query_generations.get(&key.query),
        };
        Generation(current.copied().unwrap_or(0))
    }

    fn bump(&mut self, read_functions: &[&str], query_keys: &[QueryKey]) {
        for function in read_functions {
            *self
                .function_generations
                .entry((*function).to_string())
                .or_default() += 1;
        }
        for query in query_keys {
            *self.query_generations.entry(*query).or_default() += 1;
        }
    }
}

/// Shared cache for contract reads and aggregated queries.
///
/// `ReadCache` is `Send + Sync`; share it through [`SharedReadCache`].
pub struct ReadCache {
    config: ReadCacheConfig,
    state: RwLock<CacheState>,
    invalidations: AtomicU64,
}

impl ReadCache {
    /// Creates a new cache with the given configuration.
    #[must_use]
    pub fn new(config: ReadCacheConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CacheState::default()),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ReadCacheConfig::default())
    }

    /// Returns the current number of entries, including expired ones not yet
    /// evicted.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Returns `true` if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Returns `true` if `key` has a live entry.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).await.is_some()
    }

    /// Looks up a live entry.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let state = self.state.read().await;
        let entry = state.entries.get(key)?;
        if entry.is_expired(Instant::now(), self.config.ttl()) {
            trace!(key = %key, "cache entry expired");
            return None;
        }
        trace!(key = %key, "cache hit");
        Some(entry.value.clone())
    }

    /// The invalidation generation `key` is currently at.
    pub async fn generation(&self, key: &CacheKey) -> Generation {
        self.state.read().await.generation(key)
    }

    /// Inserts an entry, evicting expired and then oldest entries when full.
    pub async fn insert(&self, key: CacheKey, value: Bytes) {
        let mut state = self.state.write().await;
        self.store(&mut state.entries, key, value);
    }

    /// Inserts an entry fetched under `started`.
    ///
    /// Returns `false` without storing when `key` was invalidated after
    /// `started` was captured.
    pub async fn insert_if_current(&self, key: CacheKey, value: Bytes, started: Generation) -> bool {
        let mut state = self.state.write().await;
        if state.generation(&key) != started {
            debug!(key = %key, "discarding read fetched before invalidation");
            return false;
        }
        self.store(&mut state.entries, key, value);
        true
    }

    fn store(&self, entries: &mut HashMap<CacheKey, CacheEntry>, key: CacheKey, value: Bytes) {
        let now = Instant::now();
        let ttl = self.config.ttl();

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| !entry.is_expired(now, ttl));
        }
        while entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            trace!(key = %oldest, "evicted oldest entry");
        }

        trace!(key = %key, len = value.len(), "inserted into read cache");
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    /// Looks up an aggregated query result.
    pub async fn get_query<T: DeserializeOwned>(&self, key: &QueryCacheKey) -> Option<T> {
        let cache_key = CacheKey::Query(key.clone());
        let bytes = self.get(&cache_key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key = %cache_key, error = %error, "discarding undecodable cache entry");
                None
            },
        }
    }

    /// Stores an aggregated query result.
    pub async fn insert_query<T: Serialize>(&self, key: QueryCacheKey, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.insert(CacheKey::Query(key), Bytes::from(bytes)).await,
            Err(error) => warn!(query = %key.query, error = %error, "failed to cache query result"),
        }
    }

    /// The invalidation generation `key` is currently at.
    pub async fn query_generation(&self, key: &QueryCacheKey) -> Generation {
        self.generation(&CacheKey::Query(key.clone())).await
    }

    /// Stores an aggregated query result computed under `started`, unless
    /// the query was invalidated since.
    pub async fn insert_query_if_current<T: Serialize>(
        &self,
        key: QueryCacheKey,
        value: &T,
        started: Generation,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.insert_if_current(CacheKey::Query(key), Bytes::from(bytes), started)
                    .await
            },
            Err(error) => {
                warn!(query = %key.query, error = %error, "failed to cache query result");
                false
            },
        }
    }

    /// Removes every read of `read_functions` and every query in
    /// `query_keys`, across all contracts and chains.
    ///
    /// Returns the number of removed entries.
    pub async fn invalidate(&self, read_functions: &[&str], query_keys: &[QueryKey]) -> usize {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|key, _| !key.matches(read_functions, query_keys));
        let removed = before - state.entries.len();
        state.bump(read_functions, query_keys);
        drop(state);

        self.invalidations.fetch_add(1, Ordering::SeqCst);
        debug!(?read_functions, ?query_keys, removed, "invalidated cached reads");
        removed
    }

    /// Number of [`invalidate`](Self::invalidate) passes run so far.
    #[must_use]
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Evicts expired entries. Returns the number evicted.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl();
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
        evicted
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        self.state.write().await.entries.clear();
        debug!("cleared read cache");
    }
}

impl fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCache")
            .field("config", &self.config)
            .field("invalidations", &self.invalidation_count())
            .finish_non_exhaustive()
    }
}

/// Shared reference to a read cache.
pub type SharedReadCache = Arc<ReadCache>;

/// Creates a new shared read cache.
#[must_use]
pub fn new_shared_cache(config: ReadCacheConfig) -> SharedReadCache {
    Arc::new(ReadCache::new(config))
}
