//! Big-endian binary codec shared by the contract and the off-chain tooling.
//!
//! Integers are fixed-width big-endian, addresses are 20 raw bytes, `U256`/`B256` are 32
//! bytes, booleans are a single `0`/`1` byte, sets are a `u16` count followed by their
//! items and byte strings are a `u32` length followed by their bytes.

use alloc::{collections::BTreeSet, vec::Vec};

use alloy_primitives::{Address, B256, U256};

use crate::{
    actions::{ActionInstruction, ActionKind, Amount, SwapStep},
    host::LegoParams,
    settings::{
        GlobalManagerSettings, GlobalPayeeSettings, LegoPerms, Limits, ManagerGrant,
        ManagerLimits, ManagerPeriodData, ManagerSettings, PayeeData, PayeeGrant, PayeeSettings,
        PendingPayee, PendingWhitelist, TransferPerms, WalletConfig, WhitelistPerms,
    },
};

/// Errors during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    TrailingBytes,
    UnknownActionKind(u8),
    InvalidBool(u8),
    UnsupportedVersion(u8),
    InvalidFlags(u8),
}

/// Errors during encoding: a collection too long for its length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    TooLong { len: usize, max: usize },
}

/// Types with a canonical wire form.
pub trait Codec: Sized {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError>;

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError>;

    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a complete value, rejecting trailing bytes for determinism.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut i = 0usize;
        let value = Self::decode(bytes, &mut i)?;
        if i != bytes.len() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(value)
    }
}

// --- primitive readers -------------------------------------------------------------------

fn take<'a>(bytes: &'a [u8], i: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let end = i.checked_add(len).ok_or(DecodeError::Truncated)?;
    if bytes.len() < end {
        return Err(DecodeError::Truncated);
    }
    let out = &bytes[*i..end];
    *i = end;
    Ok(out)
}

pub fn read_u8(bytes: &[u8], i: &mut usize) -> Result<u8, DecodeError> {
    Ok(take(bytes, i, 1)?[0])
}

pub fn read_bool(bytes: &[u8], i: &mut usize) -> Result<bool, DecodeError> {
    match read_u8(bytes, i)? {
        0 => Ok(false),
        1 => Ok(true),
        b => Err(DecodeError::InvalidBool(b)),
    }
}

pub fn read_u16(bytes: &[u8], i: &mut usize) -> Result<u16, DecodeError> {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(take(bytes, i, 2)?);
    Ok(u16::from_be_bytes(buf))
}

pub fn read_u32(bytes: &[u8], i: &mut usize) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(take(bytes, i, 4)?);
    Ok(u32::from_be_bytes(buf))
}

pub fn read_i32(bytes: &[u8], i: &mut usize) -> Result<i32, DecodeError> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(take(bytes, i, 4)?);
    Ok(i32::from_be_bytes(buf))
}

pub fn read_u64(bytes: &[u8], i: &mut usize) -> Result<u64, DecodeError> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(take(bytes, i, 8)?);
    Ok(u64::from_be_bytes(buf))
}

pub fn read_u256(bytes: &[u8], i: &mut usize) -> Result<U256, DecodeError> {
    Ok(U256::from_be_slice(take(bytes, i, 32)?))
}

pub fn read_b32(bytes: &[u8], i: &mut usize) -> Result<B256, DecodeError> {
    Ok(B256::from_slice(take(bytes, i, 32)?))
}

pub fn read_address(bytes: &[u8], i: &mut usize) -> Result<Address, DecodeError> {
    Ok(Address::from_slice(take(bytes, i, 20)?))
}

pub fn read_bytes(bytes: &[u8], i: &mut usize) -> Result<Vec<u8>, DecodeError> {
    let len = read_u32(bytes, i)? as usize;
    Ok(take(bytes, i, len)?.to_vec())
}

fn read_address_set(bytes: &[u8], i: &mut usize) -> Result<BTreeSet<Address>, DecodeError> {
    let count = read_u16(bytes, i)?;
    let mut out = BTreeSet::new();
    for _ in 0..count {
        out.insert(read_address(bytes, i)?);
    }
    Ok(out)
}

fn read_address_list(bytes: &[u8], i: &mut usize) -> Result<Vec<Address>, DecodeError> {
    let count = read_u8(bytes, i)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_address(bytes, i)?);
    }
    Ok(out)
}

// --- primitive writers -------------------------------------------------------------------

fn put_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(value as u8);
}

fn put_u256(buf: &mut Vec<u8>, value: U256) {
    buf.extend_from_slice(&value.to_be_bytes::<32>());
}

fn too_long(len: usize, max: usize) -> EncodeError {
    EncodeError::TooLong { len, max }
}

fn put_count_u8(buf: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let count = u8::try_from(len).map_err(|_| too_long(len, u8::MAX as usize))?;
    buf.push(count);
    Ok(())
}

fn put_count_u16(buf: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let count = u16::try_from(len).map_err(|_| too_long(len, u16::MAX as usize))?;
    buf.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, value: &[u8]) -> Result<(), EncodeError> {
    let len = u32::try_from(value.len()).map_err(|_| too_long(value.len(), u32::MAX as usize))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(value);
    Ok(())
}

fn put_address_set(buf: &mut Vec<u8>, set: &BTreeSet<Address>) -> Result<(), EncodeError> {
    put_count_u16(buf, set.len())?;
    for addr in set {
        buf.extend_from_slice(addr.as_slice());
    }
    Ok(())
}

fn put_address_list(buf: &mut Vec<u8>, list: &[Address]) -> Result<(), EncodeError> {
    put_count_u8(buf, list.len())?;
    for addr in list {
        buf.extend_from_slice(addr.as_slice());
    }
    Ok(())
}

// --- instructions ------------------------------------------------------------------------

impl Codec for SwapStep {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.lego_id.to_be_bytes());
        put_u256(buf, self.amount_in.to_word());
        put_u256(buf, self.min_amount_out);
        put_address_list(buf, &self.token_path)?;
        put_address_list(buf, &self.pool_path)?;
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(SwapStep {
            lego_id: read_u16(bytes, i)?,
            amount_in: Amount::from_word(read_u256(bytes, i)?),
            min_amount_out: read_u256(bytes, i)?,
            token_path: read_address_list(bytes, i)?,
            pool_path: read_address_list(bytes, i)?,
        })
    }
}

/// Layout:
/// - u8 flags (bit 0: use_prev_amount_out)
/// - u8 action kind
/// - u16 lego_id
/// - bytes20 asset, bytes20 target, u256 amount
/// - bytes20 asset2, u256 amount2
/// - u256 min_out1, u256 min_out2
/// - i32 tick_lower, i32 tick_upper
/// - bytes20 extra_addr, u256 extra_val, bytes32 extra_data
/// - u32 aux_len, bytes aux_data
/// - u16 to_lego_id
/// - u8 swap step count, swap steps
impl Codec for ActionInstruction {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.push(self.use_prev_amount_out as u8);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.lego_id.to_be_bytes());
        buf.extend_from_slice(self.asset.as_slice());
        buf.extend_from_slice(self.target.as_slice());
        put_u256(buf, self.amount.to_word());
        buf.extend_from_slice(self.asset2.as_slice());
        put_u256(buf, self.amount2.to_word());
        put_u256(buf, self.min_out1);
        put_u256(buf, self.min_out2);
        buf.extend_from_slice(&self.tick_lower.to_be_bytes());
        buf.extend_from_slice(&self.tick_upper.to_be_bytes());
        buf.extend_from_slice(self.extra_addr.as_slice());
        put_u256(buf, self.extra_val);
        buf.extend_from_slice(self.extra_data.as_slice());
        put_bytes(buf, &self.aux_data)?;
        buf.extend_from_slice(&self.to_lego_id.to_be_bytes());
        put_count_u8(buf, self.swap_steps.len())?;
        for step in &self.swap_steps {
            step.encode(buf)?;
        }
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        let flags = read_u8(bytes, i)?;
        let kind_byte = read_u8(bytes, i)?;
        let kind =
            ActionKind::try_from(kind_byte).map_err(|_| DecodeError::UnknownActionKind(kind_byte))?;
        let mut ix = ActionInstruction::new(kind);
        ix.use_prev_amount_out = match flags {
            0 => false,
            1 => true,
            other => return Err(DecodeError::InvalidFlags(other)),
        };
        ix.lego_id = read_u16(bytes, i)?;
        ix.asset = read_address(bytes, i)?;
        ix.target = read_address(bytes, i)?;
        ix.amount = Amount::from_word(read_u256(bytes, i)?);
        ix.asset2 = read_address(bytes, i)?;
        ix.amount2 = Amount::from_word(read_u256(bytes, i)?);
        ix.min_out1 = read_u256(bytes, i)?;
        ix.min_out2 = read_u256(bytes, i)?;
        ix.tick_lower = read_i32(bytes, i)?;
        ix.tick_upper = read_i32(bytes, i)?;
        ix.extra_addr = read_address(bytes, i)?;
        ix.extra_val = read_u256(bytes, i)?;
        ix.extra_data = read_b32(bytes, i)?;
        ix.aux_data = read_bytes(bytes, i)?;
        ix.to_lego_id = read_u16(bytes, i)?;
        let steps = read_u8(bytes, i)?;
        for _ in 0..steps {
            ix.swap_steps.push(SwapStep::decode(bytes, i)?);
        }
        Ok(ix)
    }
}

/// A batch is a `u8` count followed by the instructions.
pub fn encode_batch(instructions: &[ActionInstruction]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    put_count_u8(&mut buf, instructions.len())?;
    for ix in instructions {
        ix.encode(&mut buf)?;
    }
    Ok(buf)
}

/// Read only the instruction count of an encoded batch.
pub fn batch_len(bytes: &[u8]) -> Result<usize, DecodeError> {
    let mut i = 0usize;
    Ok(read_u8(bytes, &mut i)? as usize)
}

pub fn decode_batch(bytes: &[u8]) -> Result<Vec<ActionInstruction>, DecodeError> {
    let mut i = 0usize;
    let count = read_u8(bytes, &mut i)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(ActionInstruction::decode(bytes, &mut i)?);
    }
    if i != bytes.len() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(out)
}

impl Codec for LegoParams {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(self.asset.as_slice());
        buf.extend_from_slice(self.asset2.as_slice());
        buf.extend_from_slice(self.target.as_slice());
        put_u256(buf, self.amount);
        put_u256(buf, self.amount2);
        put_u256(buf, self.min_out1);
        put_u256(buf, self.min_out2);
        buf.extend_from_slice(&self.tick_lower.to_be_bytes());
        buf.extend_from_slice(&self.tick_upper.to_be_bytes());
        buf.extend_from_slice(self.extra_addr.as_slice());
        put_u256(buf, self.extra_val);
        buf.extend_from_slice(self.extra_data.as_slice());
        put_bytes(buf, &self.aux_data)?;
        put_address_list(buf, &self.token_path)?;
        put_address_list(buf, &self.pool_path)?;
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(LegoParams {
            asset: read_address(bytes, i)?,
            asset2: read_address(bytes, i)?,
            target: read_address(bytes, i)?,
            amount: read_u256(bytes, i)?,
            amount2: read_u256(bytes, i)?,
            min_out1: read_u256(bytes, i)?,
            min_out2: read_u256(bytes, i)?,
            tick_lower: read_i32(bytes, i)?,
            tick_upper: read_i32(bytes, i)?,
            extra_addr: read_address(bytes, i)?,
            extra_val: read_u256(bytes, i)?,
            extra_data: read_b32(bytes, i)?,
            aux_data: read_bytes(bytes, i)?,
            token_path: read_address_list(bytes, i)?,
            pool_path: read_address_list(bytes, i)?,
        })
    }
}

// --- settings ----------------------------------------------------------------------------

impl Codec for Limits {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u256(buf, self.per_tx_cap);
        put_u256(buf, self.per_period_cap);
        put_u256(buf, self.lifetime_cap);
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(Limits {
            per_tx_cap: read_u256(bytes, i)?,
            per_period_cap: read_u256(bytes, i)?,
            lifetime_cap: read_u256(bytes, i)?,
        })
    }
}

impl Codec for ManagerLimits {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        self.usd.encode(buf)?;
        buf.extend_from_slice(&self.max_num_txs_per_period.to_be_bytes());
        buf.extend_from_slice(&self.tx_cooldown_blocks.to_be_bytes());
        put_bool(buf, self.fail_on_zero_price);
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(ManagerLimits {
            usd: Limits::decode(bytes, i)?,
            max_num_txs_per_period: read_u64(bytes, i)?,
            tx_cooldown_blocks: read_u64(bytes, i)?,
            fail_on_zero_price: read_bool(bytes, i)?,
        })
    }
}

impl Codec for LegoPerms {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_bool(buf, self.can_manage_yield);
        put_bool(buf, self.can_buy_and_sell);
        put_bool(buf, self.can_manage_debt);
        put_bool(buf, self.can_manage_liquidity);
        put_bool(buf, self.can_claim_rewards);
        put_count_u16(buf, self.allowed_legos.len())?;
        for id in &self.allowed_legos {
            buf.extend_from_slice(&id.to_be_bytes());
        }
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        let mut perms = LegoPerms {
            can_manage_yield: read_bool(bytes, i)?,
            can_buy_and_sell: read_bool(bytes, i)?,
            can_manage_debt: read_bool(bytes, i)?,
            can_manage_liquidity: read_bool(bytes, i)?,
            can_claim_rewards: read_bool(bytes, i)?,
            allowed_legos: BTreeSet::new(),
        };
        let count = read_u16(bytes, i)?;
        for _ in 0..count {
            perms.allowed_legos.insert(read_u16(bytes, i)?);
        }
        Ok(perms)
    }
}

impl Codec for WhitelistPerms {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_bool(buf, self.can_add_pending);
        put_bool(buf, self.can_confirm);
        put_bool(buf, self.can_cancel);
        put_bool(buf, self.can_remove);
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(WhitelistPerms {
            can_add_pending: read_bool(bytes, i)?,
            can_confirm: read_bool(bytes, i)?,
            can_cancel: read_bool(bytes, i)?,
            can_remove: read_bool(bytes, i)?,
        })
    }
}

impl Codec for TransferPerms {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_bool(buf, self.can_transfer);
        put_bool(buf, self.can_add_pending_payee);
        put_address_set(buf, &self.allowed_payees)?;
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(TransferPerms {
            can_transfer: read_bool(bytes, i)?,
            can_add_pending_payee: read_bool(bytes, i)?,
            allowed_payees: read_address_set(bytes, i)?,
        })
    }
}

impl Codec for ManagerSettings {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.start_block.to_be_bytes());
        buf.extend_from_slice(&self.expiry_block.to_be_bytes());
        self.limits.encode(buf)?;
        self.lego_perms.encode(buf)?;
        self.whitelist_perms.encode(buf)?;
        self.transfer_perms.encode(buf)?;
        put_address_set(buf, &self.allowed_assets)?;
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(ManagerSettings {
            start_block: read_u64(bytes, i)?,
            expiry_block: read_u64(bytes, i)?,
            limits: ManagerLimits::decode(bytes, i)?,
            lego_perms: LegoPerms::decode(bytes, i)?,
            whitelist_perms: WhitelistPerms::decode(bytes, i)?,
            transfer_perms: TransferPerms::decode(bytes, i)?,
            allowed_assets: read_address_set(bytes, i)?,
        })
    }
}

impl Codec for ManagerGrant {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        self.limits.encode(buf)?;
        self.lego_perms.encode(buf)?;
        self.whitelist_perms.encode(buf)?;
        self.transfer_perms.encode(buf)?;
        put_address_set(buf, &self.allowed_assets)?;
        buf.extend_from_slice(&self.start_delay.to_be_bytes());
        buf.extend_from_slice(&self.activation_length.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(ManagerGrant {
            limits: ManagerLimits::decode(bytes, i)?,
            lego_perms: LegoPerms::decode(bytes, i)?,
            whitelist_perms: WhitelistPerms::decode(bytes, i)?,
            transfer_perms: TransferPerms::decode(bytes, i)?,
            allowed_assets: read_address_set(bytes, i)?,
            start_delay: read_u64(bytes, i)?,
            activation_length: read_u64(bytes, i)?,
        })
    }
}

impl Codec for ManagerPeriodData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.num_txs_in_period.to_be_bytes());
        put_u256(buf, self.total_usd_value_in_period);
        buf.extend_from_slice(&self.period_start_block.to_be_bytes());
        buf.extend_from_slice(&self.total_num_txs.to_be_bytes());
        put_u256(buf, self.total_usd_value);
        buf.extend_from_slice(&self.last_tx_block.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(ManagerPeriodData {
            num_txs_in_period: read_u64(bytes, i)?,
            total_usd_value_in_period: read_u256(bytes, i)?,
            period_start_block: read_u64(bytes, i)?,
            total_num_txs: read_u64(bytes, i)?,
            total_usd_value: read_u256(bytes, i)?,
            last_tx_block: read_u64(bytes, i)?,
        })
    }
}

impl Codec for GlobalManagerSettings {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.manager_period.to_be_bytes());
        buf.extend_from_slice(&self.start_delay.to_be_bytes());
        buf.extend_from_slice(&self.activation_length.to_be_bytes());
        put_bool(buf, self.can_owner_manage);
        self.limits.encode(buf)?;
        self.lego_perms.encode(buf)?;
        self.whitelist_perms.encode(buf)?;
        self.transfer_perms.encode(buf)?;
        put_address_set(buf, &self.allowed_assets)?;
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(GlobalManagerSettings {
            manager_period: read_u64(bytes, i)?,
            start_delay: read_u64(bytes, i)?,
            activation_length: read_u64(bytes, i)?,
            can_owner_manage: read_bool(bytes, i)?,
            limits: ManagerLimits::decode(bytes, i)?,
            lego_perms: LegoPerms::decode(bytes, i)?,
            whitelist_perms: WhitelistPerms::decode(bytes, i)?,
            transfer_perms: TransferPerms::decode(bytes, i)?,
            allowed_assets: read_address_set(bytes, i)?,
        })
    }
}

impl Codec for PayeeSettings {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.start_block.to_be_bytes());
        buf.extend_from_slice(&self.expiry_block.to_be_bytes());
        put_bool(buf, self.can_pull);
        buf.extend_from_slice(&self.period_length.to_be_bytes());
        buf.extend_from_slice(&self.max_num_txs_per_period.to_be_bytes());
        buf.extend_from_slice(&self.tx_cooldown_blocks.to_be_bytes());
        put_bool(buf, self.fail_on_zero_price);
        buf.extend_from_slice(self.primary_asset.as_slice());
        put_bool(buf, self.only_primary_asset);
        self.unit_limits.encode(buf)?;
        self.usd_limits.encode(buf)?;
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(PayeeSettings {
            start_block: read_u64(bytes, i)?,
            expiry_block: read_u64(bytes, i)?,
            can_pull: read_bool(bytes, i)?,
            period_length: read_u64(bytes, i)?,
            max_num_txs_per_period: read_u64(bytes, i)?,
            tx_cooldown_blocks: read_u64(bytes, i)?,
            fail_on_zero_price: read_bool(bytes, i)?,
            primary_asset: read_address(bytes, i)?,
            only_primary_asset: read_bool(bytes, i)?,
            unit_limits: Limits::decode(bytes, i)?,
            usd_limits: Limits::decode(bytes, i)?,
        })
    }
}

impl Codec for PayeeGrant {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_bool(buf, self.can_pull);
        buf.extend_from_slice(&self.period_length.to_be_bytes());
        buf.extend_from_slice(&self.max_num_txs_per_period.to_be_bytes());
        buf.extend_from_slice(&self.tx_cooldown_blocks.to_be_bytes());
        put_bool(buf, self.fail_on_zero_price);
        buf.extend_from_slice(self.primary_asset.as_slice());
        put_bool(buf, self.only_primary_asset);
        self.unit_limits.encode(buf)?;
        self.usd_limits.encode(buf)?;
        buf.extend_from_slice(&self.start_delay.to_be_bytes());
        buf.extend_from_slice(&self.activation_length.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(PayeeGrant {
            can_pull: read_bool(bytes, i)?,
            period_length: read_u64(bytes, i)?,
            max_num_txs_per_period: read_u64(bytes, i)?,
            tx_cooldown_blocks: read_u64(bytes, i)?,
            fail_on_zero_price: read_bool(bytes, i)?,
            primary_asset: read_address(bytes, i)?,
            only_primary_asset: read_bool(bytes, i)?,
            unit_limits: Limits::decode(bytes, i)?,
            usd_limits: Limits::decode(bytes, i)?,
            start_delay: read_u64(bytes, i)?,
            activation_length: read_u64(bytes, i)?,
        })
    }
}

impl Codec for GlobalPayeeSettings {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.default_period_length.to_be_bytes());
        buf.extend_from_slice(&self.start_delay.to_be_bytes());
        buf.extend_from_slice(&self.activation_length.to_be_bytes());
        buf.extend_from_slice(&self.max_num_txs_per_period.to_be_bytes());
        buf.extend_from_slice(&self.tx_cooldown_blocks.to_be_bytes());
        put_bool(buf, self.fail_on_zero_price);
        self.usd_limits.encode(buf)?;
        put_bool(buf, self.can_pay_owner);
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(GlobalPayeeSettings {
            default_period_length: read_u64(bytes, i)?,
            start_delay: read_u64(bytes, i)?,
            activation_length: read_u64(bytes, i)?,
            max_num_txs_per_period: read_u64(bytes, i)?,
            tx_cooldown_blocks: read_u64(bytes, i)?,
            fail_on_zero_price: read_bool(bytes, i)?,
            usd_limits: Limits::decode(bytes, i)?,
            can_pay_owner: read_bool(bytes, i)?,
        })
    }
}

impl Codec for PayeeData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.num_txs_in_period.to_be_bytes());
        put_u256(buf, self.total_units_in_period);
        put_u256(buf, self.total_usd_value_in_period);
        buf.extend_from_slice(&self.total_num_txs.to_be_bytes());
        put_u256(buf, self.total_units);
        put_u256(buf, self.total_usd_value);
        buf.extend_from_slice(&self.last_tx_block.to_be_bytes());
        buf.extend_from_slice(&self.period_start_block.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(PayeeData {
            num_txs_in_period: read_u64(bytes, i)?,
            total_units_in_period: read_u256(bytes, i)?,
            total_usd_value_in_period: read_u256(bytes, i)?,
            total_num_txs: read_u64(bytes, i)?,
            total_units: read_u256(bytes, i)?,
            total_usd_value: read_u256(bytes, i)?,
            last_tx_block: read_u64(bytes, i)?,
            period_start_block: read_u64(bytes, i)?,
        })
    }
}

impl Codec for PendingWhitelist {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(self.initiated_by.as_slice());
        buf.extend_from_slice(&self.initiated_block.to_be_bytes());
        buf.extend_from_slice(&self.confirm_block.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(PendingWhitelist {
            initiated_by: read_address(bytes, i)?,
            initiated_block: read_u64(bytes, i)?,
            confirm_block: read_u64(bytes, i)?,
        })
    }
}

impl Codec for PendingPayee {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        self.grant.encode(buf)?;
        buf.extend_from_slice(self.initiated_by.as_slice());
        buf.extend_from_slice(&self.initiated_block.to_be_bytes());
        buf.extend_from_slice(&self.confirm_block.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        Ok(PendingPayee {
            grant: PayeeGrant::decode(bytes, i)?,
            initiated_by: read_address(bytes, i)?,
            initiated_block: read_u64(bytes, i)?,
            confirm_block: read_u64(bytes, i)?,
        })
    }
}

/// Install configuration:
/// - u8 version (must be 1)
/// - bytes20 owner, switchboard, price_oracle, lego_book
/// - u64 whitelist_timelock
impl Codec for WalletConfig {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.push(self.version);
        buf.extend_from_slice(self.owner.as_slice());
        buf.extend_from_slice(self.switchboard.as_slice());
        buf.extend_from_slice(self.price_oracle.as_slice());
        buf.extend_from_slice(self.lego_book.as_slice());
        buf.extend_from_slice(&self.whitelist_timelock.to_be_bytes());
        Ok(())
    }

    fn decode(bytes: &[u8], i: &mut usize) -> Result<Self, DecodeError> {
        let version = read_u8(bytes, i)?;
        if version != WalletConfig::VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        Ok(WalletConfig {
            version,
            owner: read_address(bytes, i)?,
            switchboard: read_address(bytes, i)?,
            price_oracle: read_address(bytes, i)?,
            lego_book: read_address(bytes, i)?,
            whitelist_timelock: read_u64(bytes, i)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn swap_instruction() -> ActionInstruction {
        let mut ix = ActionInstruction::new(ActionKind::Swap);
        ix.use_prev_amount_out = true;
        ix.tick_lower = -887_220;
        ix.aux_data = alloc::vec![0xAA, 0xBB];
        ix.swap_steps.push(SwapStep {
            lego_id: 3,
            amount_in: Amount::EntireBalance,
            min_amount_out: U256::from(10u64),
            token_path: alloc::vec![
                address!("1111111111111111111111111111111111111111"),
                address!("2222222222222222222222222222222222222222"),
            ],
            pool_path: alloc::vec![address!("3333333333333333333333333333333333333333")],
        });
        ix
    }

    #[test]
    fn batch_survives_the_wire() {
        let batch = alloc::vec![swap_instruction(), ActionInstruction::new(ActionKind::Transfer)];
        let bytes = encode_batch(&batch).unwrap();
        assert_eq!(batch_len(&bytes), Ok(2));
        assert_eq!(decode_batch(&bytes).unwrap(), batch);
    }

    #[test]
    fn rejects_truncated_and_trailing_input() {
        let bytes = encode_batch(&[swap_instruction()]).unwrap();
        assert_eq!(decode_batch(&bytes[..bytes.len() - 1]), Err(DecodeError::Truncated));

        let mut extra = bytes.clone();
        extra.push(0);
        assert_eq!(decode_batch(&extra), Err(DecodeError::TrailingBytes));
    }

    #[test]
    fn rejects_unknown_kind_and_bad_bool() {
        let mut bytes = encode_batch(&[ActionInstruction::new(ActionKind::Transfer)]).unwrap();
        bytes[2] = 0x7F;
        assert_eq!(decode_batch(&bytes), Err(DecodeError::UnknownActionKind(0x7F)));

        let mut perms = WhitelistPerms::ALL.to_bytes().unwrap();
        perms[1] = 2;
        assert_eq!(WhitelistPerms::from_bytes(&perms), Err(DecodeError::InvalidBool(2)));
    }

    #[test]
    fn config_requires_version_one() {
        let cfg = WalletConfig {
            version: WalletConfig::VERSION,
            owner: address!("00000000000000000000000000000000000000aa"),
            switchboard: Address::ZERO,
            price_oracle: Address::ZERO,
            lego_book: Address::ZERO,
            whitelist_timelock: 100,
        };
        let mut bytes = cfg.to_bytes().unwrap();
        assert_eq!(WalletConfig::from_bytes(&bytes), Ok(cfg));
        bytes[0] = 2;
        assert_eq!(WalletConfig::from_bytes(&bytes), Err(DecodeError::UnsupportedVersion(2)));
    }

    #[test]
    fn grant_settings_survive_the_wire() {
        let mut grant = ManagerGrant::unrestricted();
        grant.lego_perms.allowed_legos.insert(7);
        grant.transfer_perms.allowed_payees.insert(address!("00000000000000000000000000000000000000bb"));
        grant.limits.usd.per_tx_cap = U256::from(500u64);
        grant.start_delay = 12;
        assert_eq!(ManagerGrant::from_bytes(&grant.to_bytes().unwrap()), Ok(grant));
    }

    #[test]
    fn flags_byte_must_be_canonical() {
        let mut ix = ActionInstruction::new(ActionKind::Transfer);
        ix.use_prev_amount_out = true;
        let mut bytes = ix.to_bytes().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(ActionInstruction::from_bytes(&bytes), Ok(ix));

        bytes[0] = 3;
        assert_eq!(ActionInstruction::from_bytes(&bytes), Err(DecodeError::InvalidFlags(3)));
    }

    #[test]
    fn oversized_collections_fail_to_encode() {
        let mut ix = swap_instruction();
        let step = ix.swap_steps[0].clone();
        ix.swap_steps = alloc::vec![step; 256];
        assert_eq!(ix.to_bytes(), Err(EncodeError::TooLong { len: 256, max: 255 }));

        let batch = alloc::vec![ActionInstruction::new(ActionKind::RepayDebt); 256];
        assert_eq!(encode_batch(&batch), Err(EncodeError::TooLong { len: 256, max: 255 }));

        let mut perms = TransferPerms::all();
        for n in 0..=u16::MAX as u32 {
            let mut raw = [0u8; 20];
            raw[16..].copy_from_slice(&n.to_be_bytes());
            perms.allowed_payees.insert(Address::from(raw));
        }
        assert_eq!(perms.to_bytes(), Err(EncodeError::TooLong { len: 65_536, max: 65_535 }));
    }
}
