//! Signer recovery inside the contract.

use stylus_sdk::{
    alloy_primitives::{Address, B256},
    stylus_core::{
        calls::{context::Call, CallAccess},
        Host,
    },
};

use agent_wallet_types::SignerRecovery;

use crate::constants::ECRECOVER_GAS;

/// The `ecrecover` precompile at `0x01`. `v` is expected already normalised to 27/28.
pub struct EcrecoverPrecompile<'a> {
    vm: &'a dyn Host,
}

impl<'a> EcrecoverPrecompile<'a> {
    pub const ADDRESS: Address = Address::with_last_byte(1);

    pub fn new(vm: &'a dyn Host) -> Self {
        Self { vm }
    }

    /// Precompile input: `digest || v || r || s`, each a 32-byte word.
    pub fn input(digest: B256, v: u8, r: B256, s: B256) -> [u8; 128] {
        let mut input = [0u8; 128];
        input[0..32].copy_from_slice(digest.as_slice());
        input[63] = v;
        input[64..96].copy_from_slice(r.as_slice());
        input[96..128].copy_from_slice(s.as_slice());
        input
    }
}

impl SignerRecovery for EcrecoverPrecompile<'_> {
    fn recover(&self, digest: B256, v: u8, r: B256, s: B256) -> Address {
        let input = Self::input(digest, v, r, s);
        let call = self
            .vm
            .static_call(&Call::new().gas(ECRECOVER_GAS), Self::ADDRESS, &input);
        let Ok(out) = call else {
            return Address::ZERO;
        };
        // Empty output means recovery failed.
        if out.len() < 32 {
            return Address::ZERO;
        }
        Address::from_slice(&out[12..32])
    }
}
