use alloc::collections::BTreeSet;

use alloy_primitives::{Address, U256};

/// Roughly one day of blocks at two-second block times.
pub const DEFAULT_MANAGER_PERIOD: u64 = 43_200;
/// Roughly one year of blocks at two-second block times.
pub const DEFAULT_ACTIVATION_LENGTH: u64 = 15_768_000;

/// USD or unit caps. Zero in any field means unlimited for that dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    pub per_tx_cap: U256,
    pub per_period_cap: U256,
    pub lifetime_cap: U256,
}

impl Limits {
    pub const UNLIMITED: Limits = Limits {
        per_tx_cap: U256::ZERO,
        per_period_cap: U256::ZERO,
        lifetime_cap: U256::ZERO,
    };

    /// `per_tx ≤ per_period ≤ lifetime` for every pair of caps that are both set.
    pub fn is_consistent(&self) -> bool {
        let ordered = |lo: U256, hi: U256| lo.is_zero() || hi.is_zero() || lo <= hi;
        ordered(self.per_tx_cap, self.per_period_cap)
            && ordered(self.per_period_cap, self.lifetime_cap)
            && ordered(self.per_tx_cap, self.lifetime_cap)
    }
}

/// Manager consumption limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerLimits {
    pub usd: Limits,
    pub max_num_txs_per_period: u64,
    pub tx_cooldown_blocks: u64,
    pub fail_on_zero_price: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegoPerms {
    pub can_manage_yield: bool,
    pub can_buy_and_sell: bool,
    pub can_manage_debt: bool,
    pub can_manage_liquidity: bool,
    pub can_claim_rewards: bool,
    /// Empty means every lego.
    pub allowed_legos: BTreeSet<u16>,
}

impl LegoPerms {
    pub fn all() -> Self {
        Self {
            can_manage_yield: true,
            can_buy_and_sell: true,
            can_manage_debt: true,
            can_manage_liquidity: true,
            can_claim_rewards: true,
            allowed_legos: BTreeSet::new(),
        }
    }

    pub fn none() -> Self {
        Self {
            can_manage_yield: false,
            can_buy_and_sell: false,
            can_manage_debt: false,
            can_manage_liquidity: false,
            can_claim_rewards: false,
            allowed_legos: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WhitelistPerms {
    pub can_add_pending: bool,
    pub can_confirm: bool,
    pub can_cancel: bool,
    pub can_remove: bool,
}

impl WhitelistPerms {
    pub const ALL: WhitelistPerms = WhitelistPerms {
        can_add_pending: true,
        can_confirm: true,
        can_cancel: true,
        can_remove: true,
    };
    pub const NONE: WhitelistPerms = WhitelistPerms {
        can_add_pending: false,
        can_confirm: false,
        can_cancel: false,
        can_remove: false,
    };
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferPerms {
    pub can_transfer: bool,
    pub can_add_pending_payee: bool,
    /// Empty means any registered payee.
    pub allowed_payees: BTreeSet<Address>,
}

impl TransferPerms {
    pub fn all() -> Self {
        Self {
            can_transfer: true,
            can_add_pending_payee: true,
            allowed_payees: BTreeSet::new(),
        }
    }

    pub fn none() -> Self {
        Self {
            can_transfer: false,
            can_add_pending_payee: false,
            allowed_payees: BTreeSet::new(),
        }
    }
}

/// Per-manager settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerSettings {
    pub start_block: u64,
    pub expiry_block: u64,
    pub limits: ManagerLimits,
    pub lego_perms: LegoPerms,
    pub whitelist_perms: WhitelistPerms,
    pub transfer_perms: TransferPerms,
    /// Empty means every asset.
    pub allowed_assets: BTreeSet<Address>,
}

/// Where a manager sits in its activation window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Active,
    Expired,
}

pub fn lifecycle(start_block: u64, expiry_block: u64, block: u64) -> Lifecycle {
    if block < start_block {
        Lifecycle::Pending
    } else if block < expiry_block {
        Lifecycle::Active
    } else {
        Lifecycle::Expired
    }
}

impl ManagerSettings {
    pub fn lifecycle(&self, block: u64) -> Lifecycle {
        lifecycle(self.start_block, self.expiry_block, block)
    }
}

/// Rolling usage of one manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerPeriodData {
    pub num_txs_in_period: u64,
    pub total_usd_value_in_period: U256,
    pub period_start_block: u64,
    pub total_num_txs: u64,
    pub total_usd_value: U256,
    pub last_tx_block: u64,
}

/// Wallet-wide ceiling merged with every manager's specific settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalManagerSettings {
    pub manager_period: u64,
    pub start_delay: u64,
    pub activation_length: u64,
    pub can_owner_manage: bool,
    pub limits: ManagerLimits,
    pub lego_perms: LegoPerms,
    pub whitelist_perms: WhitelistPerms,
    pub transfer_perms: TransferPerms,
    pub allowed_assets: BTreeSet<Address>,
}

impl Default for GlobalManagerSettings {
    fn default() -> Self {
        Self {
            manager_period: DEFAULT_MANAGER_PERIOD,
            start_delay: 0,
            activation_length: DEFAULT_ACTIVATION_LENGTH,
            can_owner_manage: true,
            limits: ManagerLimits::default(),
            lego_perms: LegoPerms::all(),
            whitelist_perms: WhitelistPerms::ALL,
            transfer_perms: TransferPerms::all(),
            allowed_assets: BTreeSet::new(),
        }
    }
}

/// Per-payee settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayeeSettings {
    pub start_block: u64,
    pub expiry_block: u64,
    pub can_pull: bool,
    /// Zero falls back to the global default period.
    pub period_length: u64,
    pub max_num_txs_per_period: u64,
    pub tx_cooldown_blocks: u64,
    pub fail_on_zero_price: bool,
    pub primary_asset: Address,
    pub only_primary_asset: bool,
    pub unit_limits: Limits,
    pub usd_limits: Limits,
}

impl PayeeSettings {
    pub fn lifecycle(&self, block: u64) -> Lifecycle {
        lifecycle(self.start_block, self.expiry_block, block)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalPayeeSettings {
    pub default_period_length: u64,
    pub start_delay: u64,
    pub activation_length: u64,
    pub max_num_txs_per_period: u64,
    pub tx_cooldown_blocks: u64,
    pub fail_on_zero_price: bool,
    pub usd_limits: Limits,
    pub can_pay_owner: bool,
}

impl Default for GlobalPayeeSettings {
    fn default() -> Self {
        Self {
            default_period_length: DEFAULT_MANAGER_PERIOD,
            start_delay: 0,
            activation_length: DEFAULT_ACTIVATION_LENGTH,
            max_num_txs_per_period: 0,
            tx_cooldown_blocks: 0,
            fail_on_zero_price: false,
            usd_limits: Limits::UNLIMITED,
            can_pay_owner: true,
        }
    }
}

/// Rolling usage of one payee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PayeeData {
    pub num_txs_in_period: u64,
    pub total_units_in_period: U256,
    pub total_usd_value_in_period: U256,
    pub total_num_txs: u64,
    pub total_units: U256,
    pub total_usd_value: U256,
    pub last_tx_block: u64,
    pub period_start_block: u64,
}

/// Terms a manager is added or updated with. The activation window is derived from
/// `start_delay` / `activation_length` (zero falls back to the global defaults).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerGrant {
    pub limits: ManagerLimits,
    pub lego_perms: LegoPerms,
    pub whitelist_perms: WhitelistPerms,
    pub transfer_perms: TransferPerms,
    pub allowed_assets: BTreeSet<Address>,
    pub start_delay: u64,
    pub activation_length: u64,
}

impl ManagerGrant {
    pub fn unrestricted() -> Self {
        Self {
            limits: ManagerLimits::default(),
            lego_perms: LegoPerms::all(),
            whitelist_perms: WhitelistPerms::ALL,
            transfer_perms: TransferPerms::all(),
            allowed_assets: BTreeSet::new(),
            start_delay: 0,
            activation_length: 0,
        }
    }
}

/// Terms a payee is added or updated with; the window is derived like [`ManagerGrant`]'s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayeeGrant {
    pub can_pull: bool,
    pub period_length: u64,
    pub max_num_txs_per_period: u64,
    pub tx_cooldown_blocks: u64,
    pub fail_on_zero_price: bool,
    pub primary_asset: Address,
    pub only_primary_asset: bool,
    pub unit_limits: Limits,
    pub usd_limits: Limits,
    pub start_delay: u64,
    pub activation_length: u64,
}

impl PayeeGrant {
    pub fn into_settings(self, start_block: u64, expiry_block: u64) -> PayeeSettings {
        PayeeSettings {
            start_block,
            expiry_block,
            can_pull: self.can_pull,
            period_length: self.period_length,
            max_num_txs_per_period: self.max_num_txs_per_period,
            tx_cooldown_blocks: self.tx_cooldown_blocks,
            fail_on_zero_price: self.fail_on_zero_price,
            primary_asset: self.primary_asset,
            only_primary_asset: self.only_primary_asset,
            unit_limits: self.unit_limits,
            usd_limits: self.usd_limits,
        }
    }
}

/// A whitelist entry waiting out its timelock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingWhitelist {
    pub initiated_by: Address,
    pub initiated_block: u64,
    pub confirm_block: u64,
}

/// A payee proposed by a manager, waiting for owner confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPayee {
    pub grant: PayeeGrant,
    pub initiated_by: Address,
    pub initiated_block: u64,
    pub confirm_block: u64,
}

/// Versioned install configuration of a wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalletConfig {
    pub version: u8,
    pub owner: Address,
    /// Governance address allowed to change global settings. Zero disables it.
    pub switchboard: Address,
    pub price_oracle: Address,
    pub lego_book: Address,
    pub whitelist_timelock: u64,
}

impl WalletConfig {
    pub const VERSION: u8 = 1;
}
