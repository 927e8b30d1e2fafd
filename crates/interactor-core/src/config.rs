//! Client configuration.
//!
//! Configuration is read from a TOML file. Every section and field has a
//! default, so an empty file (or no file at all) yields a working client
//! pointed at the public Base RPC endpoint.
//!
//! ```toml
//! [chain]
//! rpc_url = "https://mainnet.base.org"
//! chain_id = 8453
//!
//! [reads]
//! cache_ttl_secs = 30
//!
//! [proposals]
//! confirmation_timeout_secs = 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::allowance::{TrackedToken, default_tracked_tokens};
use crate::oracle::DEFAULT_STALE_THRESHOLD_SECS;

/// Directory name used under the XDG config directory.
const APP_DIR: &str = "defi-interactor";

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Chain connection.
    #[serde(default)]
    pub chain: ChainSection,

    /// Local persisted state.
    #[serde(default)]
    pub state: StateSection,

    /// Contract read behaviour.
    #[serde(default)]
    pub reads: ReadSection,

    /// Proposal submission behaviour.
    #[serde(default)]
    pub proposals: ProposalSection,

    /// Tokens whose acquired balances are shown.
    #[serde(default = "default_tracked_tokens")]
    pub tracked_tokens: Vec<TrackedToken>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain: ChainSection::default(),
            state: StateSection::default(),
            reads: ReadSection::default(),
            proposals: ProposalSection::default(),
            tracked_tokens: default_tracked_tokens(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from `path` if it exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks values serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rpc_url = self.chain.rpc_url.trim();
        if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
            return Err(ConfigError::Validation(
                "chain.rpc_url must be an http(s) URL".to_string(),
            ));
        }
        if self.proposals.confirmations == 0 {
            return Err(ConfigError::Validation(
                "proposals.confirmations must be at least 1".to_string(),
            ));
        }
        if self.proposals.confirmation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "proposals.confirmation_timeout_secs must be positive".to_string(),
            ));
        }
        if self.reads.max_entries == 0 {
            return Err(ConfigError::Validation(
                "reads.max_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Chain connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSection {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Expected chain id. Queried from the endpoint when unset.
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ChainSection {
    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where the selected interactor and recent addresses are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSection {
    /// JSON state file.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// Read cache and staleness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadSection {
    /// Age after which the oracle value is labelled stale.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,

    /// How long a cached read is served before it is fetched again.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached reads.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for ReadSection {
    fn default() -> Self {
        Self {
            stale_threshold_secs: default_stale_threshold_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

/// Proposal submission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalSection {
    /// Upper bound on waiting for the execution receipt.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Blocks to wait for after inclusion.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Receipt polling interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ProposalSection {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmations: default_confirmations(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ProposalSection {
    /// Upper bound on waiting for the execution receipt.
    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Receipt polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_stale_threshold_secs() -> u64 {
    DEFAULT_STALE_THRESHOLD_SECS
}

const fn default_cache_ttl_secs() -> u64 {
    30
}

const fn default_max_entries() -> usize {
    4_096
}

const fn default_confirmation_timeout_secs() -> u64 {
    600
}

const fn default_confirmations() -> u64 {
    1
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

/// `$XDG_CONFIG_HOME/defi-interactor`, falling back to `$HOME/.config` and
/// finally the working directory.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map_or_else(|| PathBuf::from(".").join(APP_DIR), |dir| dir.join(APP_DIR))
}

/// Default configuration file path.
#[must_use]
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

fn default_state_path() -> PathBuf {
    default_config_dir().join("state.json")
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
