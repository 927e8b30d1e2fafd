//! `interactor protocols`: the protocol contract catalog.

use interactor_core::protocols::PROTOCOLS;

use super::{GlobalArgs, exit_codes, print_json};

/// Prints every known protocol and its contracts.
pub fn run_protocols(global: &GlobalArgs) -> u8 {
    if global.json {
        print_json(&PROTOCOLS);
        return exit_codes::SUCCESS;
    }

    for protocol in PROTOCOLS {
        println!("{} ({}): {}", protocol.name, protocol.id, protocol.description);
        for contract in protocol.contracts {
            println!("  {:<30} {}", contract.id, contract.address);
            println!("  {:<30} {}", "", contract.description);
        }
    }
    exit_codes::SUCCESS
}
