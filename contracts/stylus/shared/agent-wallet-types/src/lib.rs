//! Shared types for the agent wallet: instructions, settings, host traits, wire codec and
//! signing digests. `no_std` so the same definitions run inside Stylus and in tooling.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod actions;
pub mod codec;
pub mod digest;
pub mod host;
pub mod settings;

pub use actions::{Action, ActionCategory, ActionInstruction, ActionKind, Amount, SwapStep};
pub use codec::{Codec, DecodeError, EncodeError};
pub use digest::{action_digest, batch_digest, SigningDomain};
pub use host::{HostError, LegoOutcome, LegoParams, SignerRecovery, WalletHost};
pub use settings::{
    GlobalManagerSettings, GlobalPayeeSettings, LegoPerms, Lifecycle, Limits, ManagerGrant,
    ManagerLimits, ManagerPeriodData, ManagerSettings, PayeeData, PayeeGrant, PayeeSettings,
    PendingPayee, PendingWhitelist, TransferPerms, WalletConfig, WhitelistPerms,
};
