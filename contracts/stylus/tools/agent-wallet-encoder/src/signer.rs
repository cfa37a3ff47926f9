use agent_wallet_types::{action_digest, batch_digest, codec::encode_batch, Codec, SignerRecovery};
use alloy_primitives::{keccak256, Address, B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde_json::{json, Value};

use crate::types::BatchRequest;

/// Parse a hex private key, with or without `0x`.
pub fn parse_signing_key(raw: &str) -> Result<SigningKey> {
    let bytes = hex::decode(raw.trim().trim_start_matches("0x")).context("private key is not hex")?;
    SigningKey::from_slice(&bytes).context("invalid secp256k1 private key")
}

fn address_of_verifying(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Uncompressed point without the 0x04 tag.
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

pub fn address_of(key: &SigningKey) -> Address {
    address_of_verifying(key.verifying_key())
}

/// Sign a 32-byte digest. Output is `r || s || v` with a low `s` and `v` in {27, 28}.
pub fn sign_digest(key: &SigningKey, digest: B256) -> Result<Vec<u8>, k256::ecdsa::Error> {
    let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_slice())?;
    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(signature.to_bytes().as_slice());
    bytes.push(27 + recovery_id.to_byte());
    Ok(bytes)
}

/// Recover the signer of `digest`. `v` must be 27 or 28.
pub fn recover_signer(digest: B256, v: u8, r: B256, s: B256) -> Option<Address> {
    let recovery_id = RecoveryId::from_byte(v.checked_sub(27)?)?;
    let signature = Signature::from_scalars(r.0, s.0).ok()?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id).ok()?;
    Some(address_of_verifying(&key))
}

/// Off-chain stand-in for the `ecrecover` precompile.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalRecovery;

impl SignerRecovery for LocalRecovery {
    fn recover(&self, digest: B256, v: u8, r: B256, s: B256) -> Address {
        recover_signer(digest, v, r, s).unwrap_or(Address::ZERO)
    }
}

/// Everything a relay needs to submit a signed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    /// Encoded instruction(s), passed as the first contract argument.
    pub payload: Vec<u8>,
    pub digest: B256,
    pub signature: Vec<u8>,
    pub nonce: U256,
    pub expiration: u64,
    pub signer: Address,
}

impl SignedRequest {
    pub fn to_json(&self) -> Value {
        json!({
            "payload": format!("0x{}", hex::encode(&self.payload)),
            "digest": self.digest,
            "signature": format!("0x{}", hex::encode(&self.signature)),
            "nonce": self.nonce.to_string(),
            "expiration": self.expiration,
            "signer": self.signer,
        })
    }
}

/// Encode and sign a batch for `perform_batch`.
pub fn sign_batch_request(key: &SigningKey, request: &BatchRequest) -> Result<SignedRequest> {
    let instructions = request.to_instructions()?;
    if instructions.is_empty() {
        bail!("batch has no instructions");
    }
    let digest = batch_digest(&request.domain(), &instructions, request.nonce, request.expiration)
        .map_err(|err| anyhow!("batch cannot be encoded: {err:?}"))?;
    let payload =
        encode_batch(&instructions).map_err(|err| anyhow!("batch cannot be encoded: {err:?}"))?;
    finish(key, payload, digest, request)
}

/// Encode and sign a single instruction for `perform_action`.
pub fn sign_action_request(key: &SigningKey, request: &BatchRequest) -> Result<SignedRequest> {
    let mut instructions = request.to_instructions()?;
    if instructions.len() != 1 {
        bail!("a single action needs exactly one instruction, got {}", instructions.len());
    }
    let instruction = instructions.remove(0);
    let digest = action_digest(&request.domain(), &instruction, request.nonce, request.expiration)
        .map_err(|err| anyhow!("instruction cannot be encoded: {err:?}"))?;
    let payload = instruction
        .to_bytes()
        .map_err(|err| anyhow!("instruction cannot be encoded: {err:?}"))?;
    finish(key, payload, digest, request)
}

fn finish(
    key: &SigningKey,
    payload: Vec<u8>,
    digest: B256,
    request: &BatchRequest,
) -> Result<SignedRequest> {
    let signature = sign_digest(key, digest).context("signing failed")?;
    Ok(SignedRequest {
        payload,
        digest,
        signature,
        nonce: request.nonce,
        expiration: request.expiration,
        signer: address_of(key),
    })
}
