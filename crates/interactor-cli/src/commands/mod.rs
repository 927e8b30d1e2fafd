//! CLI command implementations.
//!
//! Every command returns its exit code rather than a `Result`, so failures
//! are reported in the requested format before the process exits.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (configuration, chain reads, persistence)
//! - 2: Validation error (bad address, limits out of range, unknown protocol)

use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use interactor_core::registry::INTERACTOR_KEY;
use interactor_core::{
    AddressRegistry, ClientConfig, ErrorClass, FileAddressStore, InteractorError,
    JsonRpcChainClient, PermissionReader, QueryParams, ReadCacheConfig, RegistryError,
    SharedChainClient, new_shared_cache, parse_account_address,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod contract;
pub mod exec;
pub mod inspect;
pub mod propose;
pub mod protocols;

/// Exit codes shared by all commands.
pub mod exit_codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;
    /// General error exit code.
    pub const ERROR: u8 = 1;
    /// Input rejected before anything was read or written.
    pub const VALIDATION: u8 = 2;
}

/// Options every command receives.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file; a missing file means defaults.
    pub config: PathBuf,
    /// `--contract` override.
    pub contract: Option<String>,
    /// Emit JSON instead of text.
    pub json: bool,
}

/// Error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Everything a command needs to talk to the selected contract.
pub struct Session {
    pub config: ClientConfig,
    pub registry: AddressRegistry,
    pub client: SharedChainClient,
    pub reader: PermissionReader,
}

impl Session {
    /// Loads configuration and state, applying the `--contract` override.
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let config = ClientConfig::load_or_default(&global.config)
            .classified()
            .with_context(|| format!("loading {}", global.config.display()))?;

        let query = match &global.contract {
            Some(input) => {
                let address = parse_account_address(input).classified()?;
                QueryParams::parse(&format!("{INTERACTOR_KEY}={address}"))
            },
            None => QueryParams::default(),
        };
        let store = Arc::new(FileAddressStore::new(&config.state.path));
        let registry = AddressRegistry::new(store, query);

        let client: SharedChainClient = Arc::new(
            JsonRpcChainClient::from_config(&config.chain)
                .classified()?
                .with_poll_interval(config.proposals.poll_interval()),
        );
        let cache = new_shared_cache(
            ReadCacheConfig::default()
                .with_ttl_secs(config.reads.cache_ttl_secs)
                .with_max_entries(config.reads.max_entries),
        );
        let reader = PermissionReader::new(client.clone(), cache, registry.subscribe());

        debug!(
            config = %global.config.display(),
            state = %config.state.path.display(),
            interactor = ?registry.config().interactor_address,
            "session opened"
        );
        Ok(Self {
            config,
            registry,
            client,
            reader,
        })
    }

    /// The selected interactor.
    pub fn contract(&self) -> Result<Address, InteractorError> {
        self.registry
            .config()
            .interactor_address
            .ok_or_else(|| RegistryError::ContractNotConfigured.into())
    }
}

/// Lifts a core error into [`InteractorError`] so its class survives the
/// conversion to `anyhow`.
pub trait Classified<T> {
    fn classified(self) -> Result<T, InteractorError>;
}

impl<T, E: Into<InteractorError>> Classified<T> for Result<T, E> {
    fn classified(self) -> Result<T, InteractorError> {
        self.map_err(Into::into)
    }
}

/// Builds the single-threaded runtime commands block on.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Output an error in the appropriate format.
pub fn output_error(json_output: bool, code: &str, message: &str, exit_code: u8) -> u8 {
    if json_output {
        let error = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
        };
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&error).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        eprintln!("Error: {message}");
    }
    exit_code
}

/// Reports `error` and returns the exit code for its class.
pub fn report_error(json_output: bool, error: &anyhow::Error) -> u8 {
    let class = error
        .downcast_ref::<InteractorError>()
        .map(InteractorError::error_class);
    let exit_code = match class {
        Some(ErrorClass::Validation) => exit_codes::VALIDATION,
        _ => exit_codes::ERROR,
    };
    let code = class.map_or("error", |class| class.as_str());
    output_error(json_output, code, &format!("{error:#}"), exit_code)
}

/// Runs `result` to an exit code.
pub fn finish(json_output: bool, result: Result<()>) -> u8 {
    match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(error) => report_error(json_output, &error),
    }
}
