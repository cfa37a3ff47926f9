//! Manager permission engine.
//!
//! A manager's effective rights are its own settings merged with the wallet-wide ceiling:
//! booleans are ANDed, caps take the tighter value (zero = unlimited), cooldowns the longer
//! one and allow-lists are intersected. Merging is pure; callers compose it per request.

use alloc::collections::{BTreeMap, BTreeSet};

use stylus_sdk::alloy_primitives::{Address, U256};
use tracing::{debug, trace};

use agent_wallet_types::{
    ActionCategory, ActionKind, GlobalManagerSettings, Lifecycle, Limits, ManagerLimits,
    ManagerPeriodData, ManagerSettings, PayeeSettings, WhitelistPerms,
};

use crate::errors::{LimitError, PermissionError};

/// Who is acting on the wallet for the current call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Owner,
    Manager(Address),
    /// A payee allowed to pull transfers to itself.
    Payee(Address),
}

/// Resolve the role of `caller`. Owners need `can_owner_manage`; managers must be Active.
/// A caller that is not a manager may still act as a pulling payee.
pub fn resolve_role(
    caller: Address,
    owner: Address,
    global: &GlobalManagerSettings,
    managers: &BTreeMap<Address, ManagerSettings>,
    payees: &BTreeMap<Address, PayeeSettings>,
    block: u64,
) -> Result<Role, PermissionError> {
    if caller == owner {
        if !global.can_owner_manage {
            return Err(PermissionError::OwnerCannotManage);
        }
        return Ok(Role::Owner);
    }
    let Some(settings) = managers.get(&caller) else {
        return match payees.get(&caller) {
            Some(payee) if payee.can_pull => match payee.lifecycle(block) {
                Lifecycle::Active => Ok(Role::Payee(caller)),
                _ => Err(PermissionError::PayeeNotActive),
            },
            _ => {
                debug!(%caller, "caller is neither owner, manager nor pulling payee");
                Err(PermissionError::Unauthorized)
            }
        };
    };
    match settings.lifecycle(block) {
        Lifecycle::Active => Ok(Role::Manager(caller)),
        state => {
            debug!(%caller, ?state, block, "manager outside its activation window");
            Err(PermissionError::ManagerNotActive)
        }
    }
}

/// Allow-list with explicit "unrestricted". An empty `Only` set allows nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope<T: Ord> {
    Any,
    Only(BTreeSet<T>),
}

impl<T: Ord + Clone> Scope<T> {
    /// Stored allow-lists use "empty = unrestricted".
    pub fn from_allow_list(list: &BTreeSet<T>) -> Self {
        if list.is_empty() {
            Scope::Any
        } else {
            Scope::Only(list.clone())
        }
    }

    pub fn intersect(self, other: Scope<T>) -> Scope<T> {
        match (self, other) {
            (Scope::Any, other) => other,
            (this, Scope::Any) => this,
            (Scope::Only(a), Scope::Only(b)) => Scope::Only(a.intersection(&b).cloned().collect()),
        }
    }

    pub fn allows(&self, item: &T) -> bool {
        match self {
            Scope::Any => true,
            Scope::Only(set) => set.contains(item),
        }
    }
}

/// Tighter of two caps where zero means unlimited.
pub fn min_cap(a: U256, b: U256) -> U256 {
    match (a.is_zero(), b.is_zero()) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

fn min_count(a: u64, b: u64) -> u64 {
    match (a, b) {
        (0, b) => b,
        (a, 0) => a,
        (a, b) => a.min(b),
    }
}

pub fn merge_limits(specific: &Limits, global: &Limits) -> Limits {
    Limits {
        per_tx_cap: min_cap(specific.per_tx_cap, global.per_tx_cap),
        per_period_cap: min_cap(specific.per_period_cap, global.per_period_cap),
        lifetime_cap: min_cap(specific.lifetime_cap, global.lifetime_cap),
    }
}

pub fn merge_manager_limits(specific: &ManagerLimits, global: &ManagerLimits) -> ManagerLimits {
    ManagerLimits {
        usd: merge_limits(&specific.usd, &global.usd),
        max_num_txs_per_period: min_count(
            specific.max_num_txs_per_period,
            global.max_num_txs_per_period,
        ),
        tx_cooldown_blocks: specific.tx_cooldown_blocks.max(global.tx_cooldown_blocks),
        fail_on_zero_price: specific.fail_on_zero_price || global.fail_on_zero_price,
    }
}

/// Management operations on the whitelist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WhitelistOp {
    AddPending,
    Confirm,
    Cancel,
    Remove,
}

/// What a request asks to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Action(ActionKind),
    Whitelist(WhitelistOp),
    /// Propose or withdraw a pending payee.
    PendingPayee,
}

/// A request checked by [`can_perform`].
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    pub op: Operation,
    pub assets: &'a [Address],
    pub legos: &'a [u16],
    /// Recipient of a transfer.
    pub payee: Option<Address>,
}

impl<'a> Request<'a> {
    pub fn op(op: Operation) -> Self {
        Self {
            op,
            assets: &[],
            legos: &[],
            payee: None,
        }
    }
}

/// A manager's settings merged with the global ceiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub limits: ManagerLimits,
    pub can_manage_yield: bool,
    pub can_buy_and_sell: bool,
    pub can_manage_debt: bool,
    pub can_manage_liquidity: bool,
    pub can_claim_rewards: bool,
    pub allowed_legos: Scope<u16>,
    pub whitelist: WhitelistPerms,
    pub can_transfer: bool,
    pub can_add_pending_payee: bool,
    pub allowed_payees: Scope<Address>,
    pub allowed_assets: Scope<Address>,
}

pub fn effective_settings(
    specific: &ManagerSettings,
    global: &GlobalManagerSettings,
) -> EffectiveSettings {
    let (sl, gl) = (&specific.lego_perms, &global.lego_perms);
    let (sw, gw) = (&specific.whitelist_perms, &global.whitelist_perms);
    let (st, gt) = (&specific.transfer_perms, &global.transfer_perms);

    EffectiveSettings {
        limits: merge_manager_limits(&specific.limits, &global.limits),
        can_manage_yield: sl.can_manage_yield && gl.can_manage_yield,
        can_buy_and_sell: sl.can_buy_and_sell && gl.can_buy_and_sell,
        can_manage_debt: sl.can_manage_debt && gl.can_manage_debt,
        can_manage_liquidity: sl.can_manage_liquidity && gl.can_manage_liquidity,
        can_claim_rewards: sl.can_claim_rewards && gl.can_claim_rewards,
        allowed_legos: Scope::from_allow_list(&sl.allowed_legos)
            .intersect(Scope::from_allow_list(&gl.allowed_legos)),
        whitelist: WhitelistPerms {
            can_add_pending: sw.can_add_pending && gw.can_add_pending,
            can_confirm: sw.can_confirm && gw.can_confirm,
            can_cancel: sw.can_cancel && gw.can_cancel,
            can_remove: sw.can_remove && gw.can_remove,
        },
        can_transfer: st.can_transfer && gt.can_transfer,
        can_add_pending_payee: st.can_add_pending_payee && gt.can_add_pending_payee,
        allowed_payees: Scope::from_allow_list(&st.allowed_payees)
            .intersect(Scope::from_allow_list(&gt.allowed_payees)),
        allowed_assets: Scope::from_allow_list(&specific.allowed_assets)
            .intersect(Scope::from_allow_list(&global.allowed_assets)),
    }
}

impl EffectiveSettings {
    fn allows_category(&self, category: ActionCategory) -> bool {
        match category {
            ActionCategory::Transfer => self.can_transfer,
            ActionCategory::Yield => self.can_manage_yield,
            ActionCategory::BuyAndSell => self.can_buy_and_sell,
            ActionCategory::Debt => self.can_manage_debt,
            ActionCategory::Liquidity => self.can_manage_liquidity,
            ActionCategory::Rewards => self.can_claim_rewards,
        }
    }

    /// Check a request against the merged settings.
    pub fn check(&self, request: &Request<'_>) -> Result<(), PermissionError> {
        match request.op {
            Operation::Action(kind) => {
                if !self.allows_category(kind.category()) {
                    return Err(PermissionError::ActionNotPermitted);
                }
                if let Some(lego) = request.legos.iter().find(|l| !self.allowed_legos.allows(l)) {
                    trace!(lego, "lego outside allow-list");
                    return Err(PermissionError::LegoNotAllowed);
                }
                if let Some(asset) = request.assets.iter().find(|a| !self.allowed_assets.allows(a)) {
                    trace!(%asset, "asset outside allow-list");
                    return Err(PermissionError::AssetNotAllowed);
                }
                if let Some(payee) = request.payee {
                    if !self.allowed_payees.allows(&payee) {
                        return Err(PermissionError::PayeeNotAllowed);
                    }
                }
                Ok(())
            }
            Operation::Whitelist(op) => {
                let granted = match op {
                    WhitelistOp::AddPending => self.whitelist.can_add_pending,
                    WhitelistOp::Confirm => self.whitelist.can_confirm,
                    WhitelistOp::Cancel => self.whitelist.can_cancel,
                    WhitelistOp::Remove => self.whitelist.can_remove,
                };
                granted.then_some(()).ok_or(PermissionError::WhitelistOpNotPermitted)
            }
            Operation::PendingPayee => self
                .can_add_pending_payee
                .then_some(())
                .ok_or(PermissionError::PayeeOpNotPermitted),
        }
    }
}

/// Decide whether `role` may perform `request`.
///
/// The owner is unrestricted apart from `can_owner_manage`, which gates actions only.
/// Managers must exist, be Active and pass the merged settings. Pulling payees may only
/// transfer to themselves.
pub fn can_perform(
    role: Role,
    global: &GlobalManagerSettings,
    managers: &BTreeMap<Address, ManagerSettings>,
    request: &Request<'_>,
    block: u64,
) -> Result<(), PermissionError> {
    match role {
        Role::Owner => match request.op {
            Operation::Action(_) if !global.can_owner_manage => {
                Err(PermissionError::OwnerCannotManage)
            }
            _ => Ok(()),
        },
        Role::Manager(manager) => {
            let settings = managers.get(&manager).ok_or(PermissionError::Unauthorized)?;
            if settings.lifecycle(block) != Lifecycle::Active {
                return Err(PermissionError::ManagerNotActive);
            }
            let result = effective_settings(settings, global).check(request);
            if let Err(err) = &result {
                debug!(%manager, op = ?request.op, %err, "manager request denied");
            }
            result
        }
        Role::Payee(payee) => match request.op {
            Operation::Action(ActionKind::Transfer) if request.payee == Some(payee) => Ok(()),
            _ => Err(PermissionError::Unauthorized),
        },
    }
}

/// Start a fresh period when the current one has elapsed. Idempotent within a block.
pub fn roll_period(data: &ManagerPeriodData, period_length: u64, block: u64) -> ManagerPeriodData {
    let mut next = *data;
    if block >= data.period_start_block.saturating_add(period_length) {
        next.num_txs_in_period = 0;
        next.total_usd_value_in_period = U256::ZERO;
        next.period_start_block = block;
    }
    next
}

/// Check `usd_value` against the merged USD caps and return the updated record.
///
/// Every cap is checked before any counter moves; on error the caller keeps its old record.
pub fn check_and_record(
    usd_value: U256,
    specific: &Limits,
    global: &Limits,
    period_length: u64,
    data: &ManagerPeriodData,
    block: u64,
) -> Result<ManagerPeriodData, LimitError> {
    let mut next = roll_period(data, period_length, block);
    let caps = merge_limits(specific, global);

    if !caps.per_tx_cap.is_zero() && usd_value > caps.per_tx_cap {
        return Err(LimitError::UsdPerTxCapExceeded);
    }
    let period_total = next.total_usd_value_in_period.saturating_add(usd_value);
    if !caps.per_period_cap.is_zero() && period_total > caps.per_period_cap {
        return Err(LimitError::UsdPerPeriodCapExceeded);
    }
    let lifetime_total = next.total_usd_value.saturating_add(usd_value);
    if !caps.lifetime_cap.is_zero() && lifetime_total > caps.lifetime_cap {
        return Err(LimitError::UsdLifetimeCapExceeded);
    }

    next.num_txs_in_period = next.num_txs_in_period.saturating_add(1);
    next.total_usd_value_in_period = period_total;
    next.total_num_txs = next.total_num_txs.saturating_add(1);
    next.total_usd_value = lifetime_total;
    next.last_tx_block = block;
    Ok(next)
}

/// Full manager consumption check: zero price, cooldown and tx count, then USD caps.
pub fn check_manager_usage(
    usd_value: U256,
    specific: &ManagerLimits,
    global: &ManagerLimits,
    period_length: u64,
    data: &ManagerPeriodData,
    block: u64,
) -> Result<ManagerPeriodData, LimitError> {
    let merged = merge_manager_limits(specific, global);

    if merged.fail_on_zero_price && usd_value.is_zero() {
        return Err(LimitError::ZeroPriceRejected);
    }
    if merged.tx_cooldown_blocks > 0
        && data.last_tx_block != 0
        && block.saturating_sub(data.last_tx_block) < merged.tx_cooldown_blocks
    {
        return Err(LimitError::CooldownActive);
    }
    let rolled = roll_period(data, period_length, block);
    if merged.max_num_txs_per_period > 0
        && rolled.num_txs_in_period >= merged.max_num_txs_per_period
    {
        return Err(LimitError::MaxTxsPerPeriodReached);
    }

    check_and_record(usd_value, &specific.usd, &global.usd, period_length, &rolled, block)
}
