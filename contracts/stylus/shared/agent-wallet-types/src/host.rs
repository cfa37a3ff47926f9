use alloc::{string::String, vec::Vec};

use alloy_primitives::{Address, B256, U256};

use crate::actions::ActionKind;

/// Errors raised by the wallet's environment (legos, oracle, tokens).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The callee reverted; the reason is forwarded verbatim.
    Reverted(String),
    /// The underlying call failed without a decodable reason.
    CallFailed,
    /// Return data was malformed or could not be decoded.
    MalformedReturn,
    /// No lego is registered under this id.
    UnknownLego(u16),
    /// Call parameters could not be encoded.
    UnencodableParams,
}

/// Parameters handed to a lego, already resolved to concrete amounts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegoParams {
    pub asset: Address,
    pub asset2: Address,
    pub target: Address,
    pub amount: U256,
    pub amount2: U256,
    pub min_out1: U256,
    pub min_out2: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub extra_addr: Address,
    pub extra_val: U256,
    pub extra_data: B256,
    pub aux_data: Vec<u8>,
    pub token_path: Vec<Address>,
    pub pool_path: Vec<Address>,
}

/// What a lego reports back after moving funds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LegoOutcome {
    pub amount_in: U256,
    pub amount_out: U256,
    /// Dust or second-leg output (e.g. token B of a liquidity removal). Never chained.
    pub secondary_out: U256,
    pub usd_value: U256,
}

/// The wallet's environment, implemented differently on-chain vs off-chain.
///
/// Every method runs inside the caller's transaction; a failure aborts the whole call.
pub trait WalletHost {
    /// State captured before a call so an off-chain host can roll back on failure.
    type Snapshot;

    fn block_number(&self) -> u64;

    fn timestamp(&self) -> u64;

    fn chain_id(&self) -> u64;

    /// Address of the wallet itself (EIP-712 verifying contract).
    fn wallet(&self) -> Address;

    fn balance_of(&self, asset: Address) -> Result<U256, HostError>;

    /// USD value of `amount` of `asset`. Zero means no usable price.
    fn usd_value(&self, asset: Address, amount: U256) -> Result<U256, HostError>;

    fn transfer(&mut self, asset: Address, recipient: Address, amount: U256) -> Result<(), HostError>;

    fn perform_lego_action(
        &mut self,
        lego_id: u16,
        kind: ActionKind,
        params: &LegoParams,
    ) -> Result<LegoOutcome, HostError>;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// ECDSA public-key recovery over a 32-byte prehash.
pub trait SignerRecovery {
    /// Returns the zero address when recovery fails.
    fn recover(&self, digest: B256, v: u8, r: B256, s: B256) -> Address;
}
