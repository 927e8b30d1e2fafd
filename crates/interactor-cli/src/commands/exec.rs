//! `interactor exec` subcommands.
//!
//! Builds the unsigned transactions a sub-account sends to the interactor
//! from its own wallet. Nothing is signed or broadcast; the output carries
//! `to`, `value` and `data` for any wallet to submit. With `--from`, the
//! account's role, allowed targets and the pause state are checked first.
//!
//! # Exit Codes
//!
//! - 0: Transactions printed
//! - 1: Error (no contract selected, chain unreachable, Safe unresolved)
//! - 2: Validation error (bad address or amount, missing permission)

use alloy_primitives::{Address, Bytes, U256};
use anyhow::Result;
use clap::{Args, Subcommand};
use interactor_core::protocols::AAVE_V3_POOL;
use interactor_core::{
    InteractorError, OperationError, ProposalError, SubAccountOperation, parse_account_address,
    parse_amount, parse_calldata, preflight,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Classified, GlobalArgs, Session, finish, print_json, runtime};

/// Exec command group.
#[derive(Debug, Args)]
pub struct ExecCommand {
    /// Sub-account that will send the transactions; enables permission
    /// checks
    #[arg(long)]
    pub from: Option<String>,

    #[command(subcommand)]
    pub subcommand: ExecSubcommand,
}

/// Exec subcommands.
#[derive(Debug, Subcommand)]
pub enum ExecSubcommand {
    /// Approve a protocol contract to pull a token from the Safe
    Approve {
        /// Token address
        #[arg(long)]
        token: String,

        /// Protocol contract address
        #[arg(long)]
        target: String,

        /// Amount in token base units
        #[arg(long)]
        amount: String,
    },

    /// Forward raw call data to a protocol contract
    Call {
        /// Protocol contract address
        #[arg(long)]
        target: String,

        /// ABI-encoded call, 0x-prefixed hex
        #[arg(long)]
        data: String,
    },

    /// Transfer a token out of the Safe
    Transfer {
        /// Token address
        #[arg(long)]
        token: String,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount in token base units
        #[arg(long)]
        amount: String,
    },

    /// Approve the Aave pool and supply a token on behalf of the Safe
    AaveSupply {
        /// Asset address
        #[arg(long)]
        asset: String,

        /// Amount in token base units
        #[arg(long)]
        amount: String,

        /// Aave pool; defaults to the Aave V3 pool on Base
        #[arg(long)]
        pool: Option<String>,

        /// Account credited with the deposit; defaults to the Safe behind
        /// the interactor
        #[arg(long)]
        on_behalf_of: Option<String>,
    },
}

/// One unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Interactor function called.
    pub function: String,
    /// Interactor address.
    pub to: Address,
    /// Wei attached.
    pub value: U256,
    /// Call data.
    pub data: Bytes,
}

/// Output of `exec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResponse {
    /// Sender the permissions were checked for.
    pub from: Option<Address>,
    /// Transactions in sending order.
    pub transactions: Vec<UnsignedTransaction>,
}

/// Input parsed before anything is read.
enum Planned {
    Ready(Vec<SubAccountOperation>),
    AaveSupply {
        pool: Address,
        asset: Address,
        amount: U256,
        on_behalf_of: Option<Address>,
    },
}

// ============================================================================
// Command execution
// ============================================================================

/// Runs the exec command, returning an appropriate exit code.
pub fn run_exec(cmd: &ExecCommand, global: &GlobalArgs) -> u8 {
    let result = parse(cmd).and_then(|(from, planned)| {
        let session = Session::open(global)?;
        let interactor = session.contract()?;
        let operations = runtime()?.block_on(resolve(&session, from, planned))?;
        let mut transactions = Vec::with_capacity(operations.len());
        for operation in &operations {
            let request = operation.request(interactor).classified()?;
            transactions.push(UnsignedTransaction {
                function: operation.function_name().to_string(),
                to: request.to,
                value: request.value,
                data: request.data,
            });
        }
        info!(
            interactor = %interactor,
            transactions = transactions.len(),
            "prepared sub-account transactions"
        );
        print(&ExecResponse { from, transactions }, global.json);
        Ok(())
    });
    finish(global.json, result)
}

fn parse(cmd: &ExecCommand) -> Result<(Option<Address>, Planned)> {
    let from = cmd
        .from
        .as_deref()
        .map(parse_account_address)
        .transpose()
        .classified()?;
    let planned = match &cmd.subcommand {
        ExecSubcommand::Approve {
            token,
            target,
            amount,
        } => Planned::Ready(vec![SubAccountOperation::ApproveProtocol {
            token: parse_account_address(token).classified()?,
            target: parse_account_address(target).classified()?,
            amount: parse_amount(amount).classified()?,
        }]),
        ExecSubcommand::Call { target, data } => {
            Planned::Ready(vec![SubAccountOperation::ExecuteOnProtocol {
                target: parse_account_address(target).classified()?,
                data: parse_calldata(data).classified()?,
            }])
        },
        ExecSubcommand::Transfer { token, to, amount } => {
            Planned::Ready(vec![SubAccountOperation::TransferToken {
                token: parse_account_address(token).classified()?,
                recipient: parse_account_address(to).classified()?,
                amount: parse_amount(amount).classified()?,
            }])
        },
        ExecSubcommand::AaveSupply {
            asset,
            amount,
            pool,
            on_behalf_of,
        } => {
            let amount = parse_amount(amount).classified()?;
            if amount.is_zero() {
                return Err(InteractorError::from(OperationError::ZeroAmount).into());
            }
            Planned::AaveSupply {
                pool: pool
                    .as_deref()
                    .map(parse_account_address)
                    .transpose()
                    .classified()?
                    .unwrap_or(AAVE_V3_POOL),
                asset: parse_account_address(asset).classified()?,
                amount,
                on_behalf_of: on_behalf_of
                    .as_deref()
                    .map(parse_account_address)
                    .transpose()
                    .classified()?,
            }
        },
    };
    if let Planned::Ready(operations) = &planned {
        for operation in operations {
            operation.validate().classified()?;
        }
    }
    Ok((from, planned))
}

/// Fills in the Safe where needed and runs the permission checks.
async fn resolve(
    session: &Session,
    from: Option<Address>,
    planned: Planned,
) -> Result<Vec<SubAccountOperation>> {
    let operations = match planned {
        Planned::Ready(operations) => operations,
        Planned::AaveSupply {
            pool,
            asset,
            amount,
            on_behalf_of,
        } => {
            let safe = match on_behalf_of {
                Some(safe) => safe,
                None => session
                    .registry
                    .refresh_safe_address(&session.reader)
                    .await
                    .classified()?
                    .ok_or(ProposalError::SafeAddressUnresolved)
                    .classified()?,
            };
            Vec::from(SubAccountOperation::aave_deposit(pool, asset, amount, safe))
        },
    };

    if let Some(account) = from {
        for operation in &operations {
            preflight(&session.reader, account, operation).await.classified()?;
        }
    }
    Ok(operations)
}

fn print(response: &ExecResponse, json_output: bool) {
    if json_output {
        print_json(response);
        return;
    }
    if let Some(from) = response.from {
        println!("Permissions checked for {from}");
    }
    for (index, transaction) in response.transactions.iter().enumerate() {
        println!("{}. {}", index + 1, transaction.function);
        println!("   To:    {}", transaction.to);
        println!("   Value: {}", transaction.value);
        println!("   Data:  {}", transaction.data);
    }
    println!("Send these from the sub-account wallet in order.");
}
