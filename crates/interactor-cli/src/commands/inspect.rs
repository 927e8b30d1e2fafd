//! Read-only commands: contract status, account permissions, managed
//! accounts and spending allowances.

use alloy_primitives::Address;
use anyhow::{Result, anyhow};
use clap::Args;
use interactor_core::format::{
    USD_DECIMALS, format_bps, format_duration, format_time_ago, format_token_amount, format_usd,
};
use interactor_core::protocols::{PROTOCOLS, all_contract_addresses};
use interactor_core::{
    ManagedAccountAggregator, OracleHealth, Role, SpendingAllowance, SubAccount, SubAccountLimits,
    parse_account_address,
};
use serde::{Deserialize, Serialize};

/// Marker printed next to figures derived from a stale oracle value.
const STALE_LABEL: &str = "(stale data)";

use super::{Classified, GlobalArgs, Session, finish, now_secs, print_json, runtime};

/// Arguments naming one sub-account.
#[derive(Debug, Args)]
pub struct AccountArgs {
    /// Sub-account address
    pub account: String,
}

// ============================================================================
// Response Types for JSON output
// ============================================================================

/// Response for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Selected interactor.
    pub interactor: Address,
    /// Controlling Safe.
    pub safe: Option<Address>,
    /// Whether interactions are paused.
    pub paused: Option<bool>,
    /// Oracle valuation.
    pub oracle: Option<OracleView>,
    /// Safe owners.
    pub owners: Option<Vec<Address>>,
}

/// Oracle valuation for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleView {
    /// Portfolio value, formatted USD.
    pub total_value_usd: String,
    /// Unix timestamp of the last update.
    pub last_updated: u64,
    /// Number of updates pushed.
    pub update_count: u64,
    /// Freshness classification.
    pub health: OracleHealth,
    /// Older than the configured threshold or flagged by the contract.
    pub stale: bool,
}

/// Spending limits for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsView {
    /// Raw basis points.
    pub max_spending_bps: u16,
    /// Window length in seconds.
    pub window_duration_secs: u64,
}

/// Spending allowance for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowanceView {
    /// Maximum spendable per window, formatted USD.
    pub max_allowance_usd: String,
    /// Spent in the current window, formatted USD.
    pub used_usd: String,
    /// Still spendable, formatted USD.
    pub remaining_usd: String,
    /// Share spent.
    pub percent_used: f64,
    /// Share left.
    pub percent_remaining: f64,
    /// Display classification.
    pub risk_tier: String,
    /// The oracle value is older than the configured threshold or flagged by
    /// the contract.
    pub stale: bool,
}

impl From<&AllowanceReading> for AllowanceView {
    fn from(reading: &AllowanceReading) -> Self {
        let allowance = &reading.allowance;
        Self {
            max_allowance_usd: format_usd(allowance.max_allowance_usd, USD_DECIMALS),
            used_usd: format_usd(allowance.used_usd, USD_DECIMALS),
            remaining_usd: format_usd(allowance.remaining_usd, USD_DECIMALS),
            percent_used: allowance.percent_used,
            percent_remaining: allowance.percent_remaining,
            risk_tier: allowance.risk_tier.to_string(),
            stale: reading.stale,
        }
    }
}

/// Allowance together with the freshness of the oracle value behind it.
#[derive(Debug, Clone)]
pub struct AllowanceReading {
    /// Computed allowance.
    pub allowance: SpendingAllowance,
    /// The oracle value is stale; the figures are shown but labeled.
    pub stale: bool,
}

/// A protocol contract the account may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedContract {
    /// Protocol id.
    pub protocol: String,
    /// Contract id.
    pub contract: String,
    /// Contract address.
    pub address: Address,
}

/// A non-zero acquired balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquiredView {
    /// Token symbol.
    pub symbol: String,
    /// Token contract.
    pub token: Address,
    /// Formatted amount.
    pub amount: String,
}

/// Response for `permissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsResponse {
    /// The account.
    pub account: Address,
    /// Roles held.
    pub roles: Vec<Role>,
    /// Spending limits.
    pub limits: LimitsView,
    /// Spending allowance, when the oracle and contract answered.
    pub allowance: Option<AllowanceView>,
    /// Protocol contracts the account may call.
    pub allowed_protocols: Vec<AllowedContract>,
    /// Balances acquired from protocol interactions.
    pub acquired: Vec<AcquiredView>,
}

// ============================================================================
// Command execution
// ============================================================================

/// Runs `interactor status`.
pub fn run_status(global: &GlobalArgs) -> u8 {
    let result = Session::open(global).and_then(|session| {
        let response = runtime()?.block_on(status(&session))?;
        print_status(&response, global.json);
        Ok(())
    });
    finish(global.json, result)
}

/// Runs `interactor permissions <account>`.
pub fn run_permissions(args: &AccountArgs, global: &GlobalArgs) -> u8 {
    let result = Session::open(global).and_then(|session| {
        let account = parse_account_address(&args.account).classified()?;
        let response = runtime()?.block_on(permissions(&session, account))?;
        print_permissions(&response, global.json);
        Ok(())
    });
    finish(global.json, result)
}

/// Runs `interactor accounts`.
pub fn run_accounts(global: &GlobalArgs) -> u8 {
    let result = Session::open(global).and_then(|session| {
        session.contract()?;
        let aggregator = ManagedAccountAggregator::new(session.reader.clone());
        let accounts = runtime()?.block_on(aggregator.aggregate()).classified()?;
        print_accounts(&accounts, global.json);
        Ok(())
    });
    finish(global.json, result)
}

/// Runs `interactor allowance <account>`.
pub fn run_allowance(args: &AccountArgs, global: &GlobalArgs) -> u8 {
    let result = Session::open(global).and_then(|session| {
        let account = parse_account_address(&args.account).classified()?;
        session.contract()?;
        let rt = runtime()?;
        let limits = rt
            .block_on(session.reader.try_read_sub_account_limits(account))
            .classified()?;
        let reading = rt
            .block_on(allowance(&session, account, &limits))
            .ok_or_else(|| anyhow!("spending allowance unavailable for {account}"))?;

        if global.json {
            print_json(&AllowanceView::from(&reading));
        } else {
            print_allowance(&reading, &limits);
        }
        Ok(())
    });
    finish(global.json, result)
}

async fn status(session: &Session) -> Result<StatusResponse> {
    let interactor = session.contract()?;
    let reader = &session.reader;
    let safe = session
        .registry
        .refresh_safe_address(reader)
        .await
        .classified()?;

    let threshold = session.config.reads.stale_threshold_secs;
    let (paused, snapshot, contract_stale, owners) = tokio::join!(
        reader.read_paused_state(),
        reader.read_oracle_snapshot(),
        reader.read_is_stale(threshold),
        reader.read_safe_owners(),
    );

    let now = now_secs();
    let contract_flag = contract_stale.unwrap_or(false);
    let oracle = snapshot.map(|snapshot| OracleView {
        total_value_usd: format_usd(snapshot.total_value_usd, USD_DECIMALS),
        last_updated: snapshot.last_updated,
        update_count: snapshot.update_count,
        health: snapshot.health(now, contract_flag),
        stale: snapshot.is_stale(now, threshold, contract_flag),
    });

    Ok(StatusResponse {
        interactor,
        safe,
        paused,
        oracle,
        owners,
    })
}

async fn permissions(session: &Session, account: Address) -> Result<PermissionsResponse> {
    session.contract()?;
    let reader = &session.reader;

    let (execute, transfer, limits) = tokio::try_join!(
        reader.try_read_role_membership(account, Role::Execute),
        reader.try_read_role_membership(account, Role::Transfer),
        reader.try_read_sub_account_limits(account),
    )
    .classified()?;
    let roles = [(Role::Execute, execute), (Role::Transfer, transfer)]
        .into_iter()
        .filter_map(|(role, held)| held.then_some(role))
        .collect();

    let targets = all_contract_addresses();
    let (allowance, allowed, acquired) = tokio::join!(
        allowance(session, account, &limits),
        reader.read_allowed_targets(account, &targets),
        reader.read_acquired_balances(account, &session.config.tracked_tokens),
    );

    let allowed_protocols = PROTOCOLS
        .iter()
        .flat_map(|protocol| {
            protocol
                .contracts
                .iter()
                .map(move |contract| (protocol.id, contract))
        })
        .filter(|(_, contract)| allowed.contains(&contract.address))
        .map(|(protocol, contract)| AllowedContract {
            protocol: protocol.to_string(),
            contract: contract.id.to_string(),
            address: contract.address,
        })
        .collect();

    let acquired = acquired
        .into_iter()
        .filter(|balance| balance.is_nonzero())
        .map(|balance| AcquiredView {
            amount: format_token_amount(balance.balance, balance.decimals),
            symbol: balance.symbol,
            token: balance.token,
        })
        .collect();

    Ok(PermissionsResponse {
        account,
        roles,
        limits: LimitsView {
            max_spending_bps: limits.max_spending_bps,
            window_duration_secs: limits.window_duration_secs,
        },
        allowance: allowance.as_ref().map(AllowanceView::from),
        allowed_protocols,
        acquired,
    })
}

/// Allowance from the contract's remaining amount and the oracle value.
///
/// A stale oracle still yields figures; the reading carries the flag.
async fn allowance(
    session: &Session,
    account: Address,
    limits: &SubAccountLimits,
) -> Option<AllowanceReading> {
    let threshold = session.config.reads.stale_threshold_secs;
    let (snapshot, remaining, contract_stale) = tokio::join!(
        session.reader.read_oracle_snapshot(),
        session.reader.read_spending_allowance(account),
        session.reader.read_is_stale(threshold),
    );
    let snapshot = snapshot?;
    let stale = snapshot.is_stale(now_secs(), threshold, contract_stale.unwrap_or(false));
    Some(AllowanceReading {
        allowance: SpendingAllowance::from_remaining(limits, remaining?, &snapshot),
        stale,
    })
}

// ============================================================================
// Text output
// ============================================================================

fn or_unknown<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "unknown".to_string(), |value| value.to_string())
}

fn print_status(response: &StatusResponse, json_output: bool) {
    if json_output {
        print_json(response);
        return;
    }

    println!("Interactor: {}", response.interactor);
    println!("Safe:       {}", or_unknown(response.safe));
    println!(
        "Paused:     {}",
        or_unknown(response.paused.map(|p| if p { "yes" } else { "no" }))
    );
    match &response.oracle {
        Some(oracle) => {
            println!("Value:      ${}", oracle.total_value_usd);
            println!("Oracle:     {}", oracle_summary(oracle, now_secs()));
        },
        None => println!("Oracle:     unknown"),
    }
    match &response.owners {
        Some(owners) => {
            println!("Owners:     {}", owners.len());
            for owner in owners {
                println!("  {owner}");
            }
        },
        None => println!("Owners:     unknown"),
    }
}

fn print_permissions(response: &PermissionsResponse, json_output: bool) {
    if json_output {
        print_json(response);
        return;
    }

    println!("Account: {}", response.account);
    if response.roles.is_empty() {
        println!("Roles:   none");
    } else {
        println!("Roles:");
        for role in &response.roles {
            println!("  {role:<9} {}", role.description());
        }
    }
    println!(
        "Limits:  {} per {}",
        format_bps(u64::from(response.limits.max_spending_bps)),
        format_duration(response.limits.window_duration_secs)
    );
    match &response.allowance {
        Some(allowance) => println!("Allowance: {}", allowance_summary(allowance)),
        None => println!("Allowance: unknown"),
    }
    if response.allowed_protocols.is_empty() {
        println!("Protocols: none");
    } else {
        println!("Protocols:");
        for allowed in &response.allowed_protocols {
            println!("  {:<28} {}", allowed.contract, allowed.address);
        }
    }
    if !response.acquired.is_empty() {
        println!("Acquired (exempt from spending limit for 24h):");
        for balance in &response.acquired {
            println!("  {:<6} {}", balance.symbol, balance.amount);
        }
    }
}

fn print_accounts(accounts: &[SubAccount], json_output: bool) {
    if json_output {
        print_json(&accounts);
        return;
    }
    if accounts.is_empty() {
        println!("No managed accounts");
        return;
    }

    println!("{:<44} {:<8} {:<8}", "ACCOUNT", "EXECUTE", "TRANSFER");
    for account in accounts {
        println!(
            "{:<44} {:<8} {:<8}",
            account.address.to_string(),
            if account.has_execute_role { "yes" } else { "-" },
            if account.has_transfer_role { "yes" } else { "-" },
        );
    }
}

fn oracle_summary(oracle: &OracleView, now: u64) -> String {
    let mut line = format!(
        "{} (updated {}, {} updates)",
        oracle.health,
        format_time_ago(oracle.last_updated, now),
        oracle.update_count
    );
    if oracle.stale {
        line.push(' ');
        line.push_str(STALE_LABEL);
    }
    line
}

fn allowance_summary(allowance: &AllowanceView) -> String {
    let mut line = format!(
        "${} of ${} remaining ({:.2}%, {})",
        allowance.remaining_usd,
        allowance.max_allowance_usd,
        allowance.percent_remaining,
        allowance.risk_tier
    );
    if allowance.stale {
        line.push(' ');
        line.push_str(STALE_LABEL);
    }
    line
}

fn print_allowance(reading: &AllowanceReading, limits: &SubAccountLimits) {
    let allowance = &reading.allowance;
    println!(
        "Limit:     {} of ${} per {}",
        format_bps(u64::from(limits.max_spending_bps)),
        format_usd(allowance.total_value_usd, USD_DECIMALS),
        format_duration(limits.window_duration_secs)
    );
    println!(
        "Maximum:   ${}",
        format_usd(allowance.max_allowance_usd, USD_DECIMALS)
    );
    println!(
        "Used:      ${} ({:.2}%)",
        format_usd(allowance.used_usd, USD_DECIMALS),
        allowance.percent_used
    );
    println!(
        "Remaining: ${} ({:.2}%)",
        format_usd(allowance.remaining_usd, USD_DECIMALS),
        allowance.percent_remaining
    );
    if reading.stale {
        println!("Risk:      {} {STALE_LABEL}", allowance.risk_tier);
    } else {
        println!("Risk:      {}", allowance.risk_tier);
    }
}

#[cfg(test)]
mod tests {
    use interactor_core::OracleSnapshot;
    use alloy_primitives::U256;

    use super::*;

    const USD: u64 = 1_000_000_000_000_000_000;

    fn reading(stale: bool) -> AllowanceReading {
        let limits = SubAccountLimits::new(1_000, 86_400);
        let snapshot = OracleSnapshot {
            total_value_usd: U256::from(10_000u64) * U256::from(USD),
            last_updated: 1_700_000_000,
            update_count: 4,
        };
        AllowanceReading {
            allowance: SpendingAllowance::from_remaining(
                &limits,
                U256::from(400u64) * U256::from(USD),
                &snapshot,
            ),
            stale,
        }
    }

    #[test]
    fn test_stale_allowance_is_labeled() {
        let view = AllowanceView::from(&reading(true));
        assert!(view.stale);
        let line = allowance_summary(&view);
        assert!(line.starts_with("$400"), "{line}");
        assert!(line.ends_with(STALE_LABEL), "{line}");
    }

    #[test]
    fn test_fresh_allowance_is_not_labeled() {
        let view = AllowanceView::from(&reading(false));
        assert!(!allowance_summary(&view).contains(STALE_LABEL));
    }

    #[test]
    fn test_stale_flag_serialized() {
        let json = serde_json::to_value(AllowanceView::from(&reading(true))).unwrap();
        assert_eq!(json["stale"], true);
        assert_eq!(json["risk_tier"], "warning");
    }

    #[test]
    fn test_oracle_line_shows_configured_staleness() {
        let snapshot = OracleSnapshot {
            total_value_usd: U256::ZERO,
            last_updated: 1_000,
            update_count: 1,
        };
        let now = 1_000 + 1_200;
        let view = |threshold| OracleView {
            total_value_usd: "0".to_string(),
            last_updated: snapshot.last_updated,
            update_count: snapshot.update_count,
            health: snapshot.health(now, false),
            stale: snapshot.is_stale(now, threshold, false),
        };

        // Within the fixed health bands but past a tighter threshold.
        let tight = oracle_summary(&view(600), now);
        assert!(tight.ends_with(STALE_LABEL), "{tight}");
        assert!(!oracle_summary(&view(3_600), now).contains(STALE_LABEL));
    }
}
