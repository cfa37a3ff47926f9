//! Delegated request authentication.
//!
//! Owner calls skip this entirely. Anyone else relays an instruction the owner signed
//! off-chain: a canonical (low-s) 65-byte ECDSA signature over a kind- or batch-specific
//! digest, bound to the wallet's current nonce and an expiration.

use alloc::vec::Vec;

use stylus_sdk::alloy_primitives::{Address, B256, U256};
use tracing::debug;

use agent_wallet_types::SignerRecovery;

use crate::{
    constants::{SECP256K1_N_HALF, SIGNATURE_LENGTH},
    errors::AuthError,
};

/// Detached signature accompanying a delegated request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    pub bytes: Vec<u8>,
    pub nonce: U256,
    /// Unix timestamp after which the signature is void.
    pub expiration: u64,
}

/// Replay nonce of a wallet. Only ever moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NonceState {
    current: U256,
}

impl NonceState {
    pub fn new(current: U256) -> Self {
        Self { current }
    }

    pub fn current(&self) -> U256 {
        self.current
    }

    /// Consume the current nonce. Returns the new value.
    pub fn increment(&mut self) -> U256 {
        self.current = self.current.saturating_add(U256::from(1u64));
        self.current
    }
}

/// Parsed `(r, s, v)` with `v` normalised to 27/28.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureParts {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

/// Split and validate a raw signature without recovering it.
pub fn split_signature(bytes: &[u8]) -> Result<SignatureParts, AuthError> {
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(AuthError::InvalidSignatureLength);
    }
    let r = B256::from_slice(&bytes[0..32]);
    let s = B256::from_slice(&bytes[32..64]);

    let s_value = U256::from_be_bytes(s.0);
    if s_value.is_zero() {
        return Err(AuthError::InvalidSValueZero);
    }
    if s_value > SECP256K1_N_HALF {
        return Err(AuthError::InvalidSValueMalleable);
    }

    let v = match bytes[64] {
        0 | 27 => 27,
        1 | 28 => 28,
        _ => return Err(AuthError::InvalidVParameter),
    };

    Ok(SignatureParts { r, s, v })
}

/// Authenticate `caller` for an action whose digest is `digest`.
///
/// On success for a delegated caller the nonce is consumed, so a verified signature can
/// never be used twice and signatures must arrive in nonce order.
pub fn authenticate<R: SignerRecovery>(
    caller: Address,
    owner: Address,
    signature: &Signature,
    digest: B256,
    now: u64,
    nonce: &mut NonceState,
    recovery: &R,
) -> Result<(), AuthError> {
    if caller == owner {
        return Ok(());
    }

    let parts = split_signature(&signature.bytes)?;

    if signature.expiration <= now {
        return Err(AuthError::SignatureExpired);
    }
    if signature.nonce != nonce.current() {
        return Err(AuthError::InvalidNonce);
    }

    // The caller only relays; the owner must be the one who signed.
    let signer = recovery.recover(digest, parts.v, parts.r, parts.s);
    if signer == Address::ZERO || signer != owner {
        debug!(%caller, %signer, "rejecting delegated request from unexpected signer");
        return Err(AuthError::InvalidSigner);
    }

    let next = nonce.increment();
    debug!(%caller, nonce = %next, "delegated request authenticated");
    Ok(())
}
