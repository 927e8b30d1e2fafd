//! interactor - DeFi interactor sub-account client
//!
//! Selects an interactor contract, inspects sub-account permissions and
//! allowances, prepares Safe batches that change them, and builds the
//! transactions a sub-account sends itself.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use interactor_core::config::default_config_path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

use commands::GlobalArgs;

/// interactor - DeFi interactor sub-account client
#[derive(Parser, Debug)]
#[command(name = "interactor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Interactor contract to use, overriding and replacing the saved
    /// selection
    #[arg(long, global = true, env = "INTERACTOR_ADDRESS")]
    contract: Option<String>,

    /// Output format (text or json)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Contract selection ===
    /// Show or change the selected interactor contract
    Contract(commands::contract::ContractCommand),

    // === Reads ===
    /// Show contract, Safe, pause and oracle state
    Status,

    /// Show roles, limits, allowance and allowed protocols of an account
    Permissions(commands::inspect::AccountArgs),

    /// List every account holding a role
    #[command(alias = "ls")]
    Accounts,

    /// Show the remaining spending allowance of an account
    Allowance(commands::inspect::AccountArgs),

    /// List the known protocol contracts
    Protocols,

    // === Sub-account operations ===
    /// Build unsigned transactions a sub-account sends to the interactor
    Exec(commands::exec::ExecCommand),

    // === Proposals ===
    /// Prepare a Safe Transaction Builder batch that changes permissions
    Propose(commands::propose::ProposeCommand),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let global = GlobalArgs {
        config: cli.config.unwrap_or_else(default_config_path),
        contract: cli.contract,
        json: cli.json,
    };

    // Commands map outcomes to exit codes themselves:
    // 0=success, 1=error, 2=validation_error
    let exit_code = match &cli.command {
        Commands::Contract(cmd) => commands::contract::run_contract(cmd, &global),
        Commands::Status => commands::inspect::run_status(&global),
        Commands::Permissions(args) => commands::inspect::run_permissions(args, &global),
        Commands::Accounts => commands::inspect::run_accounts(&global),
        Commands::Allowance(args) => commands::inspect::run_allowance(args, &global),
        Commands::Protocols => commands::protocols::run_protocols(&global),
        Commands::Exec(cmd) => commands::exec::run_exec(cmd, &global),
        Commands::Propose(cmd) => commands::propose::run_propose(cmd, &global),
    };
    std::process::exit(i32::from(exit_code));
}
