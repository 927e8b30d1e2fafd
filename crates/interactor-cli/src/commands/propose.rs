//! `interactor propose` subcommands.
//!
//! The CLI holds no owner keys. Each subcommand encodes the permission change
//! as a Safe Transaction Builder batch that an owner imports and signs in the
//! Safe web app.
//!
//! # Exit Codes
//!
//! - 0: Batch written
//! - 1: Error (no contract selected, Safe unresolved, chain unreachable)
//! - 2: Validation error (bad address, limits out of range, unknown protocol)

use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use interactor_core::format::{format_bps, format_duration};
use interactor_core::proposal::{self, CallBundle, TxBuilderBatch};
use interactor_core::protocols::protocol_by_id;
use interactor_core::{ProposalError, Role, SubAccountLimits, parse_account_address};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    Classified, GlobalArgs, Session, exit_codes, finish, output_error, print_json, runtime,
};

/// Propose command group.
#[derive(Debug, Args)]
pub struct ProposeCommand {
    /// Write the batch to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub subcommand: ProposeSubcommand,
}

/// Propose subcommands.
#[derive(Debug, Subcommand)]
pub enum ProposeSubcommand {
    /// Grant a role to an account
    Grant(RoleArgs),

    /// Revoke a role from an account
    Revoke(RoleArgs),

    /// Add a sub-account with one or more roles in a single batch
    Add {
        /// Sub-account address
        account: String,

        /// Role to grant (repeatable)
        #[arg(long = "role", value_enum, required = true)]
        roles: Vec<RoleArg>,
    },

    /// Set the spending limits of an account
    Limits {
        /// Sub-account address
        account: String,

        /// Maximum share of the portfolio spendable per window, in percent
        #[arg(long)]
        percent: f64,

        /// Window length in hours (1 to 168)
        #[arg(long, default_value = "24")]
        hours: f64,
    },

    /// Allow an account to call protocol contracts
    Allow(TargetArgs),

    /// Stop an account from calling protocol contracts
    Disallow(TargetArgs),

    /// Pause all sub-account interactions
    Pause,

    /// Resume sub-account interactions
    Unpause,
}

/// Role selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    /// Generic protocol interactions.
    Execute,
    /// Token transfers out of the Safe.
    Transfer,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Execute => Self::Execute,
            RoleArg::Transfer => Self::Transfer,
        }
    }
}

/// Arguments for `grant` and `revoke`.
#[derive(Debug, Args)]
pub struct RoleArgs {
    /// Sub-account address
    pub account: String,

    /// Role to change
    #[arg(long, value_enum)]
    pub role: RoleArg,
}

/// Arguments for `allow` and `disallow`.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Sub-account address
    pub account: String,

    /// Protocol id whose contracts are targeted (repeatable)
    #[arg(long = "protocol")]
    pub protocols: Vec<String>,

    /// Contract address to target (repeatable)
    #[arg(long = "target")]
    pub targets: Vec<String>,
}

/// Summary printed when the batch goes to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrittenResponse {
    /// File written.
    pub path: PathBuf,
    /// Batch name.
    pub name: String,
    /// Number of calls.
    pub calls: usize,
    /// Identity used to detect duplicate submissions.
    pub action_key: String,
}

// ============================================================================
// Command execution
// ============================================================================

/// Runs the propose command, returning an appropriate exit code.
pub fn run_propose(cmd: &ProposeCommand, global: &GlobalArgs) -> u8 {
    if let Some(id) = unknown_protocol(&cmd.subcommand) {
        return output_error(
            global.json,
            "unknown_protocol",
            &format!("Unknown protocol '{id}'"),
            exit_codes::VALIDATION,
        );
    }

    let result = Session::open(global).and_then(|session| {
        let interactor = session.contract()?;
        let (bundle, name) = build(&cmd.subcommand, interactor)?;
        export(&session, &bundle, &name, cmd.output.as_deref(), global.json)
    });
    finish(global.json, result)
}

/// First `--protocol` id missing from the catalog.
fn unknown_protocol(subcommand: &ProposeSubcommand) -> Option<&str> {
    match subcommand {
        ProposeSubcommand::Allow(args) | ProposeSubcommand::Disallow(args) => args
            .protocols
            .iter()
            .find(|id| protocol_by_id(id).is_none())
            .map(String::as_str),
        _ => None,
    }
}

/// Encodes the requested change and names it.
fn build(subcommand: &ProposeSubcommand, interactor: Address) -> Result<(CallBundle, String)> {
    let built = match subcommand {
        ProposeSubcommand::Grant(args) => {
            let account = parse_account_address(&args.account).classified()?;
            let role = Role::from(args.role);
            (
                proposal::grant_role(interactor, account, role),
                format!("Grant {role} role to {account}"),
            )
        },
        ProposeSubcommand::Revoke(args) => {
            let account = parse_account_address(&args.account).classified()?;
            let role = Role::from(args.role);
            (
                proposal::revoke_role(interactor, account, role),
                format!("Revoke {role} role from {account}"),
            )
        },
        ProposeSubcommand::Add { account, roles } => {
            let account = parse_account_address(account).classified()?;
            let roles: Vec<Role> = roles.iter().copied().map(Role::from).collect();
            (
                proposal::add_sub_account(interactor, account, &roles).classified()?,
                format!("Add sub-account {account}"),
            )
        },
        ProposeSubcommand::Limits {
            account,
            percent,
            hours,
        } => {
            let account = parse_account_address(account).classified()?;
            let limits = SubAccountLimits::from_percent_and_hours(*percent, *hours).classified()?;
            (
                proposal::set_sub_account_limits(interactor, account, limits).classified()?,
                format!(
                    "Set limits of {account} to {} per {}",
                    format_bps(u64::from(limits.max_spending_bps)),
                    format_duration(limits.window_duration_secs)
                ),
            )
        },
        ProposeSubcommand::Allow(args) => {
            let (account, targets) = resolve_targets(args)?;
            (
                proposal::set_allowed_addresses(interactor, account, &targets, true)
                    .classified()?,
                format!("Allow {} contract(s) for {account}", targets.len()),
            )
        },
        ProposeSubcommand::Disallow(args) => {
            let (account, targets) = resolve_targets(args)?;
            (
                proposal::set_allowed_addresses(interactor, account, &targets, false)
                    .classified()?,
                format!("Disallow {} contract(s) for {account}", targets.len()),
            )
        },
        ProposeSubcommand::Pause => (proposal::pause(interactor), "Pause interactor".to_string()),
        ProposeSubcommand::Unpause => (
            proposal::unpause(interactor),
            "Unpause interactor".to_string(),
        ),
    };
    Ok(built)
}

/// Expands `--protocol` ids and `--target` addresses, keeping first
/// occurrences in order.
fn resolve_targets(args: &TargetArgs) -> Result<(Address, Vec<Address>)> {
    let account = parse_account_address(&args.account).classified()?;
    let mut targets = Vec::new();
    for id in &args.protocols {
        let protocol = protocol_by_id(id).with_context(|| format!("Unknown protocol '{id}'"))?;
        targets.extend(protocol.contracts.iter().map(|contract| contract.address));
    }
    for input in &args.targets {
        targets.push(parse_account_address(input).classified()?);
    }

    let mut seen = std::collections::HashSet::new();
    targets.retain(|target| seen.insert(*target));
    Ok((account, targets))
}

/// Resolves the Safe and chain, then writes the Transaction Builder batch.
fn export(
    session: &Session,
    bundle: &CallBundle,
    name: &str,
    output: Option<&Path>,
    json_output: bool,
) -> Result<()> {
    let batch = bundle.batch().classified()?;
    let (safe, chain_id) = runtime()?.block_on(async {
        let safe = session
            .registry
            .refresh_safe_address(&session.reader)
            .await
            .classified()?
            .ok_or(ProposalError::SafeAddressUnresolved)
            .classified()?;
        let chain_id = session.client.chain_id().await.classified()?;
        Ok::<_, anyhow::Error>((safe, chain_id))
    })?;

    let document = TxBuilderBatch::from_batch(&batch, chain_id, safe, name, Utc::now());
    let rendered = document
        .to_json_pretty()
        .context("Failed to render Transaction Builder batch")?;
    info!(
        transaction_type = %bundle.transaction_type,
        calls = batch.len(),
        safe = %safe,
        "prepared batch"
    );

    let Some(path) = output else {
        println!("{rendered}");
        return Ok(());
    };

    std::fs::write(path, rendered.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    let written = WrittenResponse {
        path: path.to_path_buf(),
        name: name.to_string(),
        calls: batch.len(),
        action_key: batch.action_key(),
    };
    if json_output {
        print_json(&written);
    } else {
        println!("Wrote {} call(s) to {}", written.calls, written.path.display());
        println!("  Name:       {}", written.name);
        println!("  Action key: {}", written.action_key);
        println!("Import the file in the Safe Transaction Builder to sign it.");
    }
    Ok(())
}
