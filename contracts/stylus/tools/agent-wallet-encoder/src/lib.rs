//! Off-chain companion of the agent wallet contract: builds instructions from JSON, encodes
//! them, and signs batch/action digests with the owner key.

pub mod signer;
pub mod types;

pub use signer::{
    address_of, parse_signing_key, recover_signer, sign_action_request, sign_batch_request,
    sign_digest, LocalRecovery, SignedRequest,
};
pub use types::{parse_amount, parse_kind, BatchRequest, InstructionSpec, SwapStepSpec};
