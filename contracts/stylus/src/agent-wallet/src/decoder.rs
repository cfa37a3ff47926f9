use alloc::vec::Vec;

use agent_wallet_types::{codec, ActionInstruction, Codec};

use crate::{constants::MAX_INSTRUCTIONS, errors::InputError};

/// Reject empty and oversized batches. Runs before any authentication work.
pub fn check_batch_len(len: usize) -> Result<(), InputError> {
    check_batch_len_with_limit(len, MAX_INSTRUCTIONS)
}

pub fn check_batch_len_with_limit(len: usize, max_instructions: usize) -> Result<(), InputError> {
    if len == 0 {
        return Err(InputError::NoInstructions);
    }
    if len > max_instructions {
        return Err(InputError::TooManyInstructions);
    }
    Ok(())
}

/// Decode an encoded batch. The count prefix is bounded before any instruction is parsed.
pub fn decode_instructions(bytes: &[u8]) -> Result<Vec<ActionInstruction>, InputError> {
    check_batch_len(codec::batch_len(bytes)?)?;
    Ok(codec::decode_batch(bytes)?)
}

/// Decode exactly one instruction.
pub fn decode_instruction(bytes: &[u8]) -> Result<ActionInstruction, InputError> {
    if bytes.is_empty() {
        return Err(InputError::NoInstructions);
    }
    Ok(ActionInstruction::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_wallet_types::{codec::encode_batch, ActionKind, Amount};

    fn ix(amount: u64) -> ActionInstruction {
        let mut ix = ActionInstruction::new(ActionKind::Transfer);
        ix.amount = Amount::from(amount);
        ix
    }

    #[test]
    fn bounds_are_checked_before_decoding() {
        // Sixteen declared instructions with no bodies: rejected on the count alone.
        assert_eq!(decode_instructions(&[16]), Err(InputError::TooManyInstructions));
        assert_eq!(decode_instructions(&[0]), Err(InputError::NoInstructions));
        assert_eq!(decode_instructions(&[]), Err(InputError::MalformedPayload));
    }

    #[test]
    fn fifteen_instructions_decode() {
        let batch: Vec<_> = (1..=15).map(ix).collect();
        assert_eq!(decode_instructions(&encode_batch(&batch).unwrap()).unwrap(), batch);
    }

    #[test]
    fn unknown_kind_and_trailing_bytes() {
        let mut bytes = encode_batch(&[ix(1)]).unwrap();
        // kind byte follows the count and the chaining flag
        bytes[2] = 0xEE;
        assert_eq!(decode_instructions(&bytes), Err(InputError::InvalidActionKind));

        let mut bytes = encode_batch(&[ix(1)]).unwrap();
        bytes.push(0);
        assert_eq!(decode_instructions(&bytes), Err(InputError::MalformedPayload));
    }

    #[test]
    fn custom_limit() {
        assert_eq!(check_batch_len_with_limit(3, 2), Err(InputError::TooManyInstructions));
        assert_eq!(check_batch_len_with_limit(2, 2), Ok(()));
    }
}
