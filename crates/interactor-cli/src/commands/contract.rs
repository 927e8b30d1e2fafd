//! `interactor contract` subcommands: which interactor the client targets.
//!
//! The selection is persisted in the state file and shared by every other
//! command. `--contract` on any command replaces it the same way
//! `contract set` does, without the `avatar()` check `set` performs.

use alloy_primitives::Address;
use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use interactor_core::parse_account_address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Classified, GlobalArgs, Session, finish, print_json, runtime};

/// Contract command group.
#[derive(Debug, Args)]
pub struct ContractCommand {
    #[command(subcommand)]
    pub subcommand: ContractSubcommand,
}

/// Contract subcommands.
#[derive(Debug, Subcommand)]
pub enum ContractSubcommand {
    /// Show the selected interactor and its Safe
    Show {
        /// Read the controlling Safe from the contract
        #[arg(long)]
        resolve_safe: bool,
    },

    /// Select an interactor after checking that it reports a Safe
    Set {
        /// Interactor address (0x-prefixed, 40 hex digits)
        address: String,

        /// Select without reading `avatar()` from the contract
        #[arg(long)]
        no_verify: bool,
    },

    /// Forget the selected interactor
    Clear,

    /// List or edit recently selected interactors
    Recent(RecentArgs),
}

/// Arguments for `interactor contract recent`.
#[derive(Debug, Args)]
pub struct RecentArgs {
    /// Remove one address from the list
    #[arg(long, conflicts_with = "clear")]
    pub remove: Option<String>,

    /// Forget the whole list
    #[arg(long)]
    pub clear: bool,
}

// ============================================================================
// Response Types for JSON output
// ============================================================================

/// Response for `contract show`, `set` and `clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResponse {
    /// Selected interactor.
    pub interactor: Option<Address>,
    /// Controlling Safe, when known.
    pub safe: Option<Address>,
    /// Normalized query string carrying the selection.
    pub query: String,
}

/// Response for `contract recent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentResponse {
    /// Recently selected interactors, newest first.
    pub recent: Vec<Address>,
}

// ============================================================================
// Command execution
// ============================================================================

/// Runs the contract command, returning an appropriate exit code.
pub fn run_contract(cmd: &ContractCommand, global: &GlobalArgs) -> u8 {
    let result = Session::open(global).and_then(|session| match &cmd.subcommand {
        ContractSubcommand::Show { resolve_safe } => show(&session, *resolve_safe, global.json),
        ContractSubcommand::Set { address, no_verify } => {
            set(&session, address, *no_verify, global.json)
        },
        ContractSubcommand::Clear => {
            session.registry.clear();
            print_selection(&session, global.json);
            Ok(())
        },
        ContractSubcommand::Recent(args) => recent(&session, args, global.json),
    });
    finish(global.json, result)
}

/// Selects `input`, first confirming it answers `avatar()` unless told not to.
///
/// A contract that does not answer is rejected and the previous selection
/// stays in place.
fn set(session: &Session, input: &str, no_verify: bool, json_output: bool) -> Result<()> {
    let address = parse_account_address(input).classified()?;
    if no_verify {
        session.registry.set_interactor(input).classified()?;
        print_selection(session, json_output);
        return Ok(());
    }

    let rt = runtime()?;
    let safe = rt
        .block_on(session.reader.read_safe_address_at(address))
        .ok_or_else(|| {
            anyhow!("Failed to read avatar() from {address}. Is this a DeFi interactor contract?")
        })?;
    debug!(interactor = %address, safe = %safe, "interactor answered avatar()");

    session.registry.set_interactor(input).classified()?;
    rt.block_on(session.registry.refresh_safe_address(&session.reader))
        .classified()?;
    info!(interactor = %address, safe = %safe, "selected interactor");
    print_selection(session, json_output);
    Ok(())
}

fn show(session: &Session, resolve_safe: bool, json_output: bool) -> Result<()> {
    if resolve_safe && session.registry.is_configured() {
        runtime()?
            .block_on(session.registry.refresh_safe_address(&session.reader))
            .classified()?;
    }
    print_selection(session, json_output);
    Ok(())
}

fn recent(session: &Session, args: &RecentArgs, json_output: bool) -> Result<()> {
    if let Some(input) = &args.remove {
        let address = parse_account_address(input).classified()?;
        session.registry.remove_recent(&address).classified()?;
    }
    if args.clear {
        session.registry.clear_recent().classified()?;
    }

    let recent = session.registry.recent();
    if json_output {
        print_json(&RecentResponse { recent });
    } else if recent.is_empty() {
        println!("No recent interactors");
    } else {
        for (index, address) in recent.iter().enumerate() {
            println!("  {}. {address}", index + 1);
        }
    }
    Ok(())
}

fn print_selection(session: &Session, json_output: bool) {
    let config = session.registry.config();
    if json_output {
        print_json(&SelectionResponse {
            interactor: config.interactor_address,
            safe: config.safe_address,
            query: session.registry.query_string(),
        });
        return;
    }

    match config.interactor_address {
        Some(interactor) => {
            println!("Interactor: {interactor}");
            match config.safe_address {
                Some(safe) => println!("Safe:       {safe}"),
                None => println!("Safe:       (not resolved)"),
            }
        },
        None => println!("No interactor selected"),
    }
}
