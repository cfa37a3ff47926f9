//! Environments a wallet runs against.

pub mod interfaces;
pub mod onchain;
