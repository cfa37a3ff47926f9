//! Protocol constants.

use stylus_sdk::alloy_primitives::{uint, U256};

/// Upper bound on instructions per batch, enforced before authentication.
pub const MAX_INSTRUCTIONS: usize = 15;

/// Raw ECDSA signature length: r (32) || s (32) || v (1).
pub const SIGNATURE_LENGTH: usize = 65;

/// Half the secp256k1 group order. A signature with a larger `s` is the malleable twin of a
/// canonical one.
pub const SECP256K1_N_HALF: U256 =
    uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

/// Gas forwarded to the `ecrecover` precompile.
pub const ECRECOVER_GAS: u64 = 50_000;

/// Gas cap for read-only calls to the oracle, lego book and tokens.
pub const STATIC_CALL_GAS: u64 = 200_000;
