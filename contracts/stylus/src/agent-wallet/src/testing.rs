//! Unit-test fixtures: fixed keys, well-known addresses and an in-memory host.
//!
//! The mock legos are deliberately crude. The vault mints and burns `VAULT_TOKEN` one to one
//! against its underlying (`USDC`), the dex pays out half of what goes in, and the debt lego
//! swallows collateral and repayments while handing out borrows.

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};

use k256::ecdsa::SigningKey;
use stylus_sdk::alloy_primitives::{address, Address, B256, U256};

use agent_wallet_encoder::{address_of, sign_digest};
use agent_wallet_types::{
    action_digest, batch_digest, ActionInstruction, ActionKind, HostError, LegoOutcome,
    LegoParams, SigningDomain, WalletConfig, WalletHost,
};

use crate::{auth::Signature, wallet::WalletState};

pub const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
pub const BOB: Address = address!("0000000000000000000000000000000000000b0b");
pub const CHARLIE: Address = address!("00000000000000000000000000000000000c4a21");

pub const USDC: Address = address!("00000000000000000000000000000000000005dc");
pub const WETH: Address = address!("000000000000000000000000000000000000e7e4");
pub const VAULT_TOKEN: Address = address!("000000000000000000000000000000000000ba17");

pub const WALLET: Address = address!("00000000000000000000000000000000000000f0");
pub const PRICE_ORACLE: Address = address!("00000000000000000000000000000000000000a0");
pub const LEGO_BOOK: Address = address!("00000000000000000000000000000000000000b0");

pub const LEGO_VAULT: u16 = 1;
pub const LEGO_DEX: u16 = 2;
pub const LEGO_DEBT: u16 = 3;

pub const CHAIN_ID: u64 = 42_161;
pub const START_BLOCK: u64 = 1_000;
pub const START_TIME: u64 = 1_700_000_000;

fn key(byte: u8) -> SigningKey {
    SigningKey::from_slice(&[byte; 32]).expect("valid scalar")
}

pub fn owner_key() -> SigningKey {
    key(0x11)
}

pub fn relay_key() -> SigningKey {
    key(0x22)
}

pub fn owner() -> Address {
    address_of(&owner_key())
}

/// The agent that relays owner-signed requests.
pub fn relay() -> Address {
    address_of(&relay_key())
}

pub fn sign(key: &SigningKey, digest: B256) -> Vec<u8> {
    sign_digest(key, digest).expect("signing")
}

fn domain(host: &MockHost) -> SigningDomain {
    SigningDomain {
        chain_id: host.chain_id(),
        wallet: host.wallet(),
    }
}

/// Owner signature over a batch, valid for an hour.
pub fn sign_batch(host: &MockHost, instructions: &[ActionInstruction], nonce: U256) -> Signature {
    let expiration = host.timestamp() + 3600;
    let digest = batch_digest(&domain(host), instructions, nonce, expiration).expect("encodable");
    Signature {
        bytes: sign(&owner_key(), digest),
        nonce,
        expiration,
    }
}

/// Owner signature over a single instruction, valid for an hour.
pub fn sign_action(host: &MockHost, instruction: &ActionInstruction, nonce: U256) -> Signature {
    let expiration = host.timestamp() + 3600;
    let digest = action_digest(&domain(host), instruction, nonce, expiration).expect("encodable");
    Signature {
        bytes: sign(&owner_key(), digest),
        nonce,
        expiration,
    }
}

impl WalletState {
    pub fn for_owner(owner: Address) -> Self {
        WalletState::new(WalletConfig {
            version: WalletConfig::VERSION,
            owner,
            switchboard: Address::ZERO,
            price_oracle: PRICE_ORACLE,
            lego_book: LEGO_BOOK,
            whitelist_timelock: 0,
        })
    }
}

type Balances = BTreeMap<(Address, Address), U256>;

#[derive(Clone, Debug)]
pub struct MockHost {
    pub block: u64,
    pub now: u64,
    balances: Balances,
    /// USD per whole unit. Missing means unpriced.
    prices: BTreeMap<Address, U256>,
    failing: BTreeMap<u16, String>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            block: START_BLOCK,
            now: START_TIME,
            balances: BTreeMap::new(),
            prices: BTreeMap::new(),
            failing: BTreeMap::new(),
        }
    }

    /// Wallet holding 10k USDC, 1k WETH and 1k vault shares, with USDC and shares at $1.
    pub fn funded() -> Self {
        let mut host = Self::new();
        host.mint(USDC, WALLET, U256::from(10_000u64));
        host.mint(WETH, WALLET, U256::from(1_000u64));
        host.mint(VAULT_TOKEN, WALLET, U256::from(1_000u64));
        host.set_price(USDC, U256::from(1u64));
        host.set_price(WETH, U256::from(2u64));
        host.set_price(VAULT_TOKEN, U256::from(1u64));
        host
    }

    pub fn balance(&self, asset: Address, holder: Address) -> U256 {
        self.balances.get(&(asset, holder)).copied().unwrap_or_default()
    }

    pub fn wallet_balance(&self, asset: Address) -> U256 {
        self.balance(asset, WALLET)
    }

    pub fn set_price(&mut self, asset: Address, usd_per_unit: U256) {
        self.prices.insert(asset, usd_per_unit);
    }

    pub fn fail_lego(&mut self, lego_id: u16, reason: &str) {
        self.failing.insert(lego_id, reason.to_string());
    }

    pub fn advance(&mut self, blocks: u64) {
        self.block += blocks;
        self.now += blocks * 2;
    }

    fn mint(&mut self, asset: Address, holder: Address, amount: U256) {
        *self.balances.entry((asset, holder)).or_default() += amount;
    }

    fn burn(&mut self, asset: Address, holder: Address, amount: U256) -> Result<(), HostError> {
        let balance = self.balances.entry((asset, holder)).or_default();
        if *balance < amount {
            return Err(HostError::Reverted("insufficient balance".into()));
        }
        *balance -= amount;
        Ok(())
    }

    fn vault(&mut self, kind: ActionKind, p: &LegoParams) -> Result<LegoOutcome, HostError> {
        match kind {
            ActionKind::DepositForYield => {
                self.burn(p.asset, WALLET, p.amount)?;
                self.mint(VAULT_TOKEN, WALLET, p.amount);
            }
            ActionKind::WithdrawFromYield => {
                self.burn(VAULT_TOKEN, WALLET, p.amount)?;
                self.mint(USDC, WALLET, p.amount);
            }
            _ => return Err(HostError::Reverted("unsupported".into())),
        }
        Ok(moved(p.amount, p.amount))
    }

    fn dex(&mut self, kind: ActionKind, p: &LegoParams) -> Result<LegoOutcome, HostError> {
        match kind {
            ActionKind::Swap | ActionKind::MintOrRedeemAsset => {
                let out = p.amount / U256::from(2u64);
                if out < p.min_out1 {
                    return Err(HostError::Reverted("slippage".into()));
                }
                self.burn(p.asset, WALLET, p.amount)?;
                self.mint(p.asset2, WALLET, out);
                Ok(moved(p.amount, out))
            }
            _ => Ok(moved(p.amount, p.amount)),
        }
    }

    fn debt(&mut self, kind: ActionKind, p: &LegoParams) -> Result<LegoOutcome, HostError> {
        match kind {
            ActionKind::AddCollateral | ActionKind::RepayDebt => {
                self.burn(p.asset, WALLET, p.amount)?;
                Ok(moved(p.amount, U256::ZERO))
            }
            ActionKind::RemoveCollateral | ActionKind::BorrowAsset | ActionKind::ClaimRewards => {
                self.mint(p.asset, WALLET, p.amount);
                Ok(moved(p.amount, p.amount))
            }
            _ => Err(HostError::Reverted("unsupported".into())),
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Legos in this mock never report a USD value, so the wallet prices steps itself.
fn moved(amount_in: U256, amount_out: U256) -> LegoOutcome {
    LegoOutcome {
        amount_in,
        amount_out,
        secondary_out: U256::ZERO,
        usd_value: U256::ZERO,
    }
}

impl WalletHost for MockHost {
    type Snapshot = Balances;

    fn block_number(&self) -> u64 {
        self.block
    }

    fn timestamp(&self) -> u64 {
        self.now
    }

    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    fn wallet(&self) -> Address {
        WALLET
    }

    fn balance_of(&self, asset: Address) -> Result<U256, HostError> {
        Ok(self.wallet_balance(asset))
    }

    fn usd_value(&self, asset: Address, amount: U256) -> Result<U256, HostError> {
        let price = self.prices.get(&asset).copied().unwrap_or_default();
        Ok(price.saturating_mul(amount))
    }

    fn transfer(&mut self, asset: Address, recipient: Address, amount: U256) -> Result<(), HostError> {
        self.burn(asset, WALLET, amount)?;
        self.mint(asset, recipient, amount);
        Ok(())
    }

    fn perform_lego_action(
        &mut self,
        lego_id: u16,
        kind: ActionKind,
        params: &LegoParams,
    ) -> Result<LegoOutcome, HostError> {
        if let Some(reason) = self.failing.get(&lego_id) {
            return Err(HostError::Reverted(reason.clone()));
        }
        match lego_id {
            LEGO_VAULT => self.vault(kind, params),
            LEGO_DEX => self.dex(kind, params),
            LEGO_DEBT => self.debt(kind, params),
            other => Err(HostError::UnknownLego(other)),
        }
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.balances.clone()
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        self.balances = snapshot;
    }
}
