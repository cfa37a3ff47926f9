//! Agent wallet: an owner-controlled smart wallet that delegates DeFi actions to managers
//! under per-manager permissions and rolling spend limits, with metered payees and
//! owner-signed requests relayed by agents.

#![cfg_attr(not(any(test, feature = "export-abi")), no_main)]
#![cfg_attr(not(any(test, feature = "export-abi")), no_std)]

#[macro_use]
extern crate alloc;

pub mod agent_wallet;
pub mod auth;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod executor;
pub mod host;
pub mod management;
pub mod payees;
pub mod permissions;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use agent_wallet::AgentWallet;
pub use errors::{Result, WalletError, WalletRevert};
pub use wallet::WalletState;
