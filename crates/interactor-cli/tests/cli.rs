//! End-to-end tests of the `interactor` binary.
//!
//! Only paths that never reach a working chain are exercised: contract
//! selection, the protocol catalog, sub-account transactions built without
//! reads, and input validation, which happens before any network access.
//! The RPC endpoint points at a closed local port.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
const UNREACHABLE_RPC: &str = "http://127.0.0.1:9";

struct Fixture {
    _dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let state = dir.path().join("state.json");
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[chain]\nrpc_url = {UNREACHABLE_RPC:?}\nchain_id = 8453\nrequest_timeout_secs = 2\n\n\
                 [state]\npath = {:?}\n",
                state.display().to_string()
            ),
        )
        .expect("write config");
        Self { _dir: dir, config }
    }

    fn run(&self, args: &[&str]) -> Output {
        run_with_config(&self.config, args)
    }
}

fn run_with_config(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_interactor"))
        .arg("--config")
        .arg(config)
        .args(["--log-level", "off"])
        .args(args)
        .env_remove("INTERACTOR_ADDRESS")
        .env_remove("RUST_LOG")
        .output()
        .expect("run interactor")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn stderr_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stderr).expect("stderr is JSON")
}

fn interactor_of(value: &serde_json::Value) -> Option<String> {
    value["interactor"].as_str().map(str::to_lowercase)
}

#[test]
fn protocols_catalog_as_json() {
    let fixture = Fixture::new();
    let output = fixture.run(&["protocols", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let protocols = stdout_json(&output);
    let ids: Vec<&str> = protocols
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|p| p["id"].as_str())
        .collect();
    assert_eq!(ids, ["uniswap", "aave", "merkl"]);
}

#[test]
fn selection_persists_between_runs() {
    let fixture = Fixture::new();

    let output = fixture.run(&["contract", "show", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(interactor_of(&stdout_json(&output)), None);

    let lower = ADDRESS.to_lowercase();
    let output = fixture.run(&["contract", "set", &lower, "--no-verify", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    // Normalized to the checksummed form.
    assert_eq!(
        stdout_json(&output)["query"],
        format!("defiInteractor={ADDRESS}")
    );

    let shown = stdout_json(&fixture.run(&["contract", "show", "--json"]));
    assert_eq!(interactor_of(&shown), Some(ADDRESS.to_lowercase()));

    let recent = stdout_json(&fixture.run(&["contract", "recent", "--json"]));
    assert_eq!(recent["recent"].as_array().map(Vec::len), Some(1));

    assert_eq!(fixture.run(&["contract", "clear"]).status.code(), Some(0));
    let shown = stdout_json(&fixture.run(&["contract", "show", "--json"]));
    assert_eq!(interactor_of(&shown), None);
}

#[test]
fn contract_flag_replaces_selection() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ACCOUNT, "--no-verify"]);

    let output = fixture.run(&["--contract", ADDRESS, "contract", "show", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let shown = stdout_json(&fixture.run(&["contract", "show", "--json"]));
    assert_eq!(interactor_of(&shown), Some(ADDRESS.to_lowercase()));
}

#[test]
fn invalid_address_is_a_validation_error() {
    let fixture = Fixture::new();
    let output = fixture.run(&["contract", "set", "0x1234", "--json"]);

    assert_eq!(output.status.code(), Some(2));
    let error = stderr_json(&output);
    assert_eq!(error["code"], "validation");
    assert!(error["message"].as_str().unwrap_or_default().contains("0x1234"));

    let shown = stdout_json(&fixture.run(&["contract", "show", "--json"]));
    assert_eq!(interactor_of(&shown), None);
}

#[test]
fn set_keeps_previous_selection_when_contract_does_not_answer() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ACCOUNT, "--no-verify"]);

    let output = fixture.run(&["contract", "set", ADDRESS, "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let error = stderr_json(&output);
    assert!(
        error["message"]
            .as_str()
            .unwrap_or_default()
            .contains("DeFi interactor contract")
    );

    let shown = stdout_json(&fixture.run(&["contract", "show", "--json"]));
    assert_eq!(interactor_of(&shown), Some(ACCOUNT.to_lowercase()));
}

#[test]
fn reads_require_a_selection() {
    let fixture = Fixture::new();
    let output = fixture.run(&["accounts", "--json"]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr_json(&output)["code"], "configuration");
}

#[test]
fn out_of_range_limits_rejected_before_network() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&[
        "propose", "limits", ACCOUNT, "--percent", "150", "--hours", "24", "--json",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["code"], "validation");

    let output = fixture.run(&["propose", "limits", ACCOUNT, "--percent", "5", "--hours", "0.5"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unknown_protocol_rejected() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&[
        "propose", "allow", ACCOUNT, "--protocol", "compound", "--json",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["code"], "unknown_protocol");
}

#[test]
fn empty_target_list_rejected() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&["propose", "allow", ACCOUNT, "--json"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["code"], "validation");
}

const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

fn selector_hex(signature: &str) -> String {
    let hash = alloy_primitives::keccak256(signature.as_bytes());
    format!("0x{}", alloy_primitives::hex::encode(&hash[..4]))
}

#[test]
fn exec_approve_prints_unsigned_transaction() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&[
        "exec", "approve", "--token", USDC, "--target", ACCOUNT, "--amount", "1000000", "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));

    let response = stdout_json(&output);
    assert!(response["from"].is_null());
    let transactions = response["transactions"].as_array().expect("array");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["function"], "approveProtocol");
    assert_eq!(
        transactions[0]["to"].as_str().map(str::to_lowercase),
        Some(ADDRESS.to_lowercase())
    );
    let data = transactions[0]["data"].as_str().unwrap_or_default();
    assert!(data.starts_with(&selector_hex("approveProtocol(address,address,uint256)")));
}

#[test]
fn exec_aave_supply_approves_then_supplies() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&[
        "exec",
        "aave-supply",
        "--asset",
        USDC,
        "--amount",
        "250000",
        "--on-behalf-of",
        ACCOUNT,
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));

    let response = stdout_json(&output);
    let functions: Vec<&str> = response["transactions"]
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|t| t["function"].as_str())
        .collect();
    assert_eq!(functions, ["approveProtocol", "executeOnProtocol"]);
    let supply = response["transactions"][1]["data"].as_str().unwrap_or_default();
    assert!(supply.starts_with(&selector_hex("executeOnProtocol(address,bytes)")));
}

#[test]
fn exec_rejects_bad_input_before_network() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&[
        "exec", "transfer", "--token", USDC, "--to", ACCOUNT, "--amount", "0", "--json",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["code"], "validation");

    let output = fixture.run(&["exec", "call", "--target", ACCOUNT, "--data", "0xnothex", "--json"]);
    assert_eq!(output.status.code(), Some(2));

    let output = fixture.run(&["exec", "aave-supply", "--asset", USDC, "--amount", "0"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn exec_without_safe_fails_when_chain_unreachable() {
    let fixture = Fixture::new();
    fixture.run(&["contract", "set", ADDRESS, "--no-verify"]);

    let output = fixture.run(&["exec", "aave-supply", "--asset", USDC, "--amount", "1", "--json"]);
    assert_eq!(output.status.code(), Some(1));
}
