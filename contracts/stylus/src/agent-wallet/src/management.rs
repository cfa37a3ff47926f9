//! Registration of managers, payees and whitelist entries, and the global settings.
//!
//! Managers and payees are owner-administered. Global settings may also be changed by the
//! switchboard. Pending payees and whitelist entries can be driven by managers holding the
//! matching permission.

use stylus_sdk::alloy_primitives::Address;
use tracing::debug;

use agent_wallet_types::{
    GlobalManagerSettings, GlobalPayeeSettings, Lifecycle, ManagerGrant, ManagerSettings,
    PayeeGrant, PendingPayee, PendingWhitelist,
};

use crate::{
    errors::{InputError, PermissionError, Result},
    permissions::{can_perform, Operation, Request, Role, WhitelistOp},
    wallet::WalletState,
};

/// Activation window `[start, expiry)` derived from a grant and the global defaults.
/// The longer start delay wins; a zero activation length takes the global one.
fn activation_window(
    block: u64,
    start_delay: u64,
    activation_length: u64,
    global_start_delay: u64,
    global_activation_length: u64,
) -> Result<(u64, u64)> {
    let activation = if activation_length == 0 {
        global_activation_length
    } else {
        activation_length
    };
    if activation == 0 {
        return Err(InputError::InvalidActivation.into());
    }
    let start = block.saturating_add(start_delay.max(global_start_delay));
    Ok((start, start.saturating_add(activation)))
}

fn validate_payee_grant(grant: &PayeeGrant) -> Result<()> {
    if !grant.unit_limits.is_consistent() || !grant.usd_limits.is_consistent() {
        return Err(InputError::InvalidLimits.into());
    }
    if grant.only_primary_asset && grant.primary_asset == Address::ZERO {
        return Err(InputError::InvalidAddress.into());
    }
    Ok(())
}

impl WalletState {
    fn require_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner() {
            return Err(PermissionError::NotOwner.into());
        }
        Ok(())
    }

    fn require_owner_or_switchboard(&self, caller: Address) -> Result<()> {
        let switchboard = self.config.switchboard;
        if caller == self.owner() || (switchboard != Address::ZERO && caller == switchboard) {
            return Ok(());
        }
        Err(PermissionError::NotOwnerOrSwitchboard.into())
    }

    /// Role for management calls. Unlike actions, the owner is never gated here.
    fn management_role(&self, caller: Address, block: u64) -> Result<Role> {
        if caller == self.owner() {
            return Ok(Role::Owner);
        }
        match self.managers.get(&caller) {
            Some(settings) if settings.lifecycle(block) == Lifecycle::Active => {
                Ok(Role::Manager(caller))
            }
            Some(_) => Err(PermissionError::ManagerNotActive.into()),
            None => Err(PermissionError::Unauthorized.into()),
        }
    }

    fn require_permission(&self, caller: Address, op: Operation, block: u64) -> Result<Role> {
        let role = self.management_role(caller, block)?;
        can_perform(role, &self.global_manager, &self.managers, &Request::op(op), block)?;
        Ok(role)
    }

    /// Registrable counterparty: not zero and not the owner.
    fn require_counterparty(&self, addr: Address) -> Result<()> {
        if addr == Address::ZERO || addr == self.owner() {
            return Err(InputError::InvalidAddress.into());
        }
        Ok(())
    }

    // --- managers ------------------------------------------------------------------------

    pub fn add_manager(
        &mut self,
        caller: Address,
        manager: Address,
        grant: ManagerGrant,
        block: u64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        self.require_counterparty(manager)?;
        if self.managers.contains_key(&manager) {
            return Err(InputError::ManagerAlreadyExists.into());
        }
        if !grant.limits.usd.is_consistent() {
            return Err(InputError::InvalidLimits.into());
        }
        let global = &self.global_manager;
        let (start_block, expiry_block) = activation_window(
            block,
            grant.start_delay,
            grant.activation_length,
            global.start_delay,
            global.activation_length,
        )?;

        self.managers.insert(
            manager,
            ManagerSettings {
                start_block,
                expiry_block,
                limits: grant.limits,
                lego_perms: grant.lego_perms,
                whitelist_perms: grant.whitelist_perms,
                transfer_perms: grant.transfer_perms,
                allowed_assets: grant.allowed_assets,
            },
        );
        self.manager_data.remove(&manager);
        debug!(%manager, start_block, expiry_block, "manager added");
        Ok(())
    }

    /// Replace a manager's limits and permissions. The activation window is kept.
    pub fn update_manager(
        &mut self,
        caller: Address,
        manager: Address,
        grant: ManagerGrant,
    ) -> Result<()> {
        self.require_owner(caller)?;
        if !grant.limits.usd.is_consistent() {
            return Err(InputError::InvalidLimits.into());
        }
        let settings = self
            .managers
            .get_mut(&manager)
            .ok_or(InputError::ManagerNotFound)?;
        settings.limits = grant.limits;
        settings.lego_perms = grant.lego_perms;
        settings.whitelist_perms = grant.whitelist_perms;
        settings.transfer_perms = grant.transfer_perms;
        settings.allowed_assets = grant.allowed_assets;
        debug!(%manager, "manager updated");
        Ok(())
    }

    /// The owner may remove any manager; a manager may remove itself.
    pub fn remove_manager(&mut self, caller: Address, manager: Address) -> Result<()> {
        if caller != self.owner() && caller != manager {
            return Err(PermissionError::NotOwner.into());
        }
        if self.managers.remove(&manager).is_none() {
            return Err(InputError::ManagerNotFound.into());
        }
        self.manager_data.remove(&manager);
        debug!(%manager, %caller, "manager removed");
        Ok(())
    }

    pub fn set_global_manager_settings(
        &mut self,
        caller: Address,
        settings: GlobalManagerSettings,
    ) -> Result<()> {
        self.require_owner_or_switchboard(caller)?;
        if settings.manager_period == 0 {
            return Err(InputError::InvalidPeriod.into());
        }
        if settings.activation_length == 0 {
            return Err(InputError::InvalidActivation.into());
        }
        if !settings.limits.usd.is_consistent() {
            return Err(InputError::InvalidLimits.into());
        }
        self.global_manager = settings;
        debug!(%caller, "global manager settings replaced");
        Ok(())
    }

    // --- payees --------------------------------------------------------------------------

    pub fn set_global_payee_settings(
        &mut self,
        caller: Address,
        settings: GlobalPayeeSettings,
    ) -> Result<()> {
        self.require_owner_or_switchboard(caller)?;
        if settings.default_period_length == 0 {
            return Err(InputError::InvalidPeriod.into());
        }
        if settings.activation_length == 0 {
            return Err(InputError::InvalidActivation.into());
        }
        if !settings.usd_limits.is_consistent() {
            return Err(InputError::InvalidLimits.into());
        }
        self.global_payee = settings;
        debug!(%caller, "global payee settings replaced");
        Ok(())
    }

    pub fn add_payee(
        &mut self,
        caller: Address,
        payee: Address,
        grant: PayeeGrant,
        block: u64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        self.register_payee(payee, grant, block)
    }

    fn register_payee(&mut self, payee: Address, grant: PayeeGrant, block: u64) -> Result<()> {
        self.require_counterparty(payee)?;
        if self.payees.contains_key(&payee) {
            return Err(InputError::PayeeAlreadyExists.into());
        }
        validate_payee_grant(&grant)?;
        let global = &self.global_payee;
        let (start_block, expiry_block) = activation_window(
            block,
            grant.start_delay,
            grant.activation_length,
            global.start_delay,
            global.activation_length,
        )?;

        self.payees.insert(payee, grant.into_settings(start_block, expiry_block));
        self.payee_data.remove(&payee);
        self.pending_payees.remove(&payee);
        debug!(%payee, start_block, expiry_block, "payee added");
        Ok(())
    }

    /// Replace a payee's terms. The activation window is kept.
    pub fn update_payee(
        &mut self,
        caller: Address,
        payee: Address,
        grant: PayeeGrant,
    ) -> Result<()> {
        self.require_owner(caller)?;
        validate_payee_grant(&grant)?;
        let current = self.payees.get_mut(&payee).ok_or(InputError::PayeeNotFound)?;
        *current = grant.into_settings(current.start_block, current.expiry_block);
        debug!(%payee, "payee updated");
        Ok(())
    }

    /// The owner may remove any payee; a payee may remove itself.
    pub fn remove_payee(&mut self, caller: Address, payee: Address) -> Result<()> {
        if caller != self.owner() && caller != payee {
            return Err(PermissionError::NotOwner.into());
        }
        if self.payees.remove(&payee).is_none() {
            return Err(InputError::PayeeNotFound.into());
        }
        self.payee_data.remove(&payee);
        debug!(%payee, %caller, "payee removed");
        Ok(())
    }

    pub fn add_pending_payee(
        &mut self,
        caller: Address,
        payee: Address,
        grant: PayeeGrant,
        block: u64,
    ) -> Result<()> {
        self.require_permission(caller, Operation::PendingPayee, block)?;
        self.require_counterparty(payee)?;
        if self.payees.contains_key(&payee) {
            return Err(InputError::PayeeAlreadyExists.into());
        }
        if self.pending_payees.contains_key(&payee) {
            return Err(InputError::AlreadyPending.into());
        }
        validate_payee_grant(&grant)?;

        let confirm_block = block.saturating_add(self.config.whitelist_timelock);
        self.pending_payees.insert(
            payee,
            PendingPayee {
                grant,
                initiated_by: caller,
                initiated_block: block,
                confirm_block,
            },
        );
        debug!(%payee, %caller, confirm_block, "pending payee proposed");
        Ok(())
    }

    /// Owner-only promotion of a pending payee once its timelock has passed.
    pub fn confirm_pending_payee(
        &mut self,
        caller: Address,
        payee: Address,
        block: u64,
    ) -> Result<()> {
        self.require_owner(caller)?;
        let pending = self.pending_payees.get(&payee).ok_or(InputError::PendingNotFound)?;
        if block < pending.confirm_block {
            return Err(InputError::TimelockNotElapsed.into());
        }
        let grant = pending.grant.clone();
        self.register_payee(payee, grant, block)
    }

    pub fn cancel_pending_payee(
        &mut self,
        caller: Address,
        payee: Address,
        block: u64,
    ) -> Result<()> {
        self.require_permission(caller, Operation::PendingPayee, block)?;
        if self.pending_payees.remove(&payee).is_none() {
            return Err(InputError::PendingNotFound.into());
        }
        debug!(%payee, %caller, "pending payee cancelled");
        Ok(())
    }

    // --- whitelist -----------------------------------------------------------------------

    pub fn add_pending_whitelist(
        &mut self,
        caller: Address,
        addr: Address,
        block: u64,
    ) -> Result<()> {
        self.require_permission(caller, Operation::Whitelist(WhitelistOp::AddPending), block)?;
        self.require_counterparty(addr)?;
        if self.whitelist.contains(&addr) {
            return Err(InputError::AlreadyWhitelisted.into());
        }
        if self.pending_whitelist.contains_key(&addr) {
            return Err(InputError::AlreadyPending.into());
        }
        let confirm_block = block.saturating_add(self.config.whitelist_timelock);
        self.pending_whitelist.insert(
            addr,
            PendingWhitelist {
                initiated_by: caller,
                initiated_block: block,
                confirm_block,
            },
        );
        debug!(%addr, %caller, confirm_block, "whitelist entry proposed");
        Ok(())
    }

    pub fn confirm_whitelist(&mut self, caller: Address, addr: Address, block: u64) -> Result<()> {
        self.require_permission(caller, Operation::Whitelist(WhitelistOp::Confirm), block)?;
        let pending = self.pending_whitelist.get(&addr).ok_or(InputError::PendingNotFound)?;
        if block < pending.confirm_block {
            return Err(InputError::TimelockNotElapsed.into());
        }
        self.pending_whitelist.remove(&addr);
        self.whitelist.insert(addr);
        debug!(%addr, %caller, "whitelist entry confirmed");
        Ok(())
    }

    pub fn cancel_pending_whitelist(
        &mut self,
        caller: Address,
        addr: Address,
        block: u64,
    ) -> Result<()> {
        self.require_permission(caller, Operation::Whitelist(WhitelistOp::Cancel), block)?;
        if self.pending_whitelist.remove(&addr).is_none() {
            return Err(InputError::PendingNotFound.into());
        }
        debug!(%addr, %caller, "pending whitelist entry cancelled");
        Ok(())
    }

    pub fn remove_whitelist(&mut self, caller: Address, addr: Address, block: u64) -> Result<()> {
        self.require_permission(caller, Operation::Whitelist(WhitelistOp::Remove), block)?;
        if !self.whitelist.remove(&addr) {
            return Err(InputError::NotWhitelisted.into());
        }
        debug!(%addr, %caller, "whitelist entry removed");
        Ok(())
    }
}
