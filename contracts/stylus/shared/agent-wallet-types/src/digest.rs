//! EIP-712 digests that delegated requests are signed over.
//!
//! Both the contract and the off-chain signer build digests here so the two can never drift.

use alloc::vec::Vec;

use alloy_primitives::{keccak256, Address, B256, U256};

use crate::{
    actions::ActionInstruction,
    codec::{encode_batch, Codec, EncodeError},
};

pub const DOMAIN_NAME: &[u8] = b"Agent Wallet";
pub const DOMAIN_VERSION: &[u8] = b"1";

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const ACTION_INTENT_TYPE: &[u8] =
    b"ActionIntent(address wallet,uint8 kind,bytes32 instructionHash,uint256 nonce,uint64 expiration)";
const BATCH_INTENT_TYPE: &[u8] =
    b"BatchIntent(address wallet,bytes32 instructionsHash,uint256 nonce,uint64 expiration)";

/// Domain separation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigningDomain {
    pub chain_id: u64,
    pub wallet: Address,
}

fn word_from_address(addr: Address) -> [u8; 32] {
    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(addr.as_slice());
    padded
}

fn word_from_u64(value: u64) -> [u8; 32] {
    let mut padded = [0u8; 32];
    padded[24..32].copy_from_slice(&value.to_be_bytes());
    padded
}

pub fn domain_separator(domain: &SigningDomain) -> B256 {
    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(keccak256(DOMAIN_TYPE).as_slice());
    buf.extend_from_slice(keccak256(DOMAIN_NAME).as_slice());
    buf.extend_from_slice(keccak256(DOMAIN_VERSION).as_slice());
    buf.extend_from_slice(&U256::from(domain.chain_id).to_be_bytes::<32>());
    buf.extend_from_slice(&word_from_address(domain.wallet));
    keccak256(buf)
}

fn typed_digest(domain: &SigningDomain, struct_hash: B256) -> B256 {
    // keccak256("\x19\x01" || domainSeparator || structHash)
    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(b"\x19\x01");
    buf.extend_from_slice(domain_separator(domain).as_slice());
    buf.extend_from_slice(struct_hash.as_slice());
    keccak256(buf)
}

/// Digest for a single action. The action kind is part of the typed struct, so a
/// signature for one kind never validates another.
pub fn action_digest(
    domain: &SigningDomain,
    instruction: &ActionInstruction,
    nonce: U256,
    expiration: u64,
) -> Result<B256, EncodeError> {
    let instruction_hash = keccak256(instruction.to_bytes()?);

    let mut buf = Vec::with_capacity(32 * 6);
    buf.extend_from_slice(keccak256(ACTION_INTENT_TYPE).as_slice());
    buf.extend_from_slice(&word_from_address(domain.wallet));
    buf.extend_from_slice(&word_from_u64(instruction.kind as u64));
    buf.extend_from_slice(instruction_hash.as_slice());
    buf.extend_from_slice(&nonce.to_be_bytes::<32>());
    buf.extend_from_slice(&word_from_u64(expiration));
    Ok(typed_digest(domain, keccak256(buf)))
}

/// Digest for a batch, bound to the hash of the full ordered instruction list.
pub fn batch_digest(
    domain: &SigningDomain,
    instructions: &[ActionInstruction],
    nonce: U256,
    expiration: u64,
) -> Result<B256, EncodeError> {
    let instructions_hash = keccak256(encode_batch(instructions)?);

    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(keccak256(BATCH_INTENT_TYPE).as_slice());
    buf.extend_from_slice(&word_from_address(domain.wallet));
    buf.extend_from_slice(instructions_hash.as_slice());
    buf.extend_from_slice(&nonce.to_be_bytes::<32>());
    buf.extend_from_slice(&word_from_u64(expiration));
    Ok(typed_digest(domain, keccak256(buf)))
}
