//! Wallet state and the request entry points.
//!
//! Every request runs against a staged copy of the state and a host snapshot; the copy is
//! committed only when the whole request succeeds.

use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};

use stylus_sdk::alloy_primitives::{Address, B256, U256};
use tracing::debug;

use agent_wallet_types::{
    action_digest, batch_digest, ActionInstruction, GlobalManagerSettings, GlobalPayeeSettings,
    ManagerPeriodData, ManagerSettings, PayeeData, PayeeSettings, PendingPayee, PendingWhitelist,
    SignerRecovery, SigningDomain, WalletConfig, WalletHost,
};

use crate::{
    auth::{authenticate, NonceState, Signature},
    decoder::check_batch_len,
    errors::{PermissionError, Result},
    executor::{Executor, StepOutcome},
    permissions::{resolve_role, Role},
};

/// Everything a wallet persists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletState {
    pub config: WalletConfig,
    pub nonce: NonceState,
    pub global_manager: GlobalManagerSettings,
    pub managers: BTreeMap<Address, ManagerSettings>,
    pub manager_data: BTreeMap<Address, ManagerPeriodData>,
    pub global_payee: GlobalPayeeSettings,
    pub payees: BTreeMap<Address, PayeeSettings>,
    pub payee_data: BTreeMap<Address, PayeeData>,
    pub pending_payees: BTreeMap<Address, PendingPayee>,
    pub whitelist: BTreeSet<Address>,
    pub pending_whitelist: BTreeMap<Address, PendingWhitelist>,
}

impl WalletState {
    /// Fresh wallet with default global settings and nothing registered.
    pub fn new(config: WalletConfig) -> Self {
        Self {
            config,
            nonce: NonceState::default(),
            global_manager: GlobalManagerSettings::default(),
            managers: BTreeMap::new(),
            manager_data: BTreeMap::new(),
            global_payee: GlobalPayeeSettings::default(),
            payees: BTreeMap::new(),
            payee_data: BTreeMap::new(),
            pending_payees: BTreeMap::new(),
            whitelist: BTreeSet::new(),
            pending_whitelist: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    pub fn is_whitelisted(&self, addr: Address) -> bool {
        self.whitelist.contains(&addr)
    }

    /// Execute a signed or owner-submitted batch. All-or-nothing.
    pub fn perform_batch<H: WalletHost, R: SignerRecovery>(
        &mut self,
        host: &mut H,
        recovery: &R,
        caller: Address,
        instructions: &[ActionInstruction],
        signature: &Signature,
    ) -> Result<Vec<StepOutcome>> {
        check_batch_len(instructions.len())?;

        let domain = signing_domain(host);
        let digest = batch_digest(&domain, instructions, signature.nonce, signature.expiration)?;
        atomically(self, host, |staged, host| {
            staged.admit(host, recovery, caller, signature, digest)?;
            let role = staged.role_of(caller, host.block_number())?;
            debug!(%caller, ?role, count = instructions.len(), "executing batch");
            Executor::new(host, staged, role).run(instructions)
        })
    }

    /// Execute one instruction, signed with its kind-specific digest.
    pub fn perform_action<H: WalletHost, R: SignerRecovery>(
        &mut self,
        host: &mut H,
        recovery: &R,
        caller: Address,
        instruction: &ActionInstruction,
        signature: &Signature,
    ) -> Result<StepOutcome> {
        let domain = signing_domain(host);
        let digest = action_digest(&domain, instruction, signature.nonce, signature.expiration)?;
        atomically(self, host, |staged, host| {
            staged.admit(host, recovery, caller, signature, digest)?;
            let role = staged.role_of(caller, host.block_number())?;
            let action = instruction.view();
            Executor::new(host, staged, role).execute(&action)
        })
    }

    /// Owner-only: burn the current nonce, voiding every outstanding signature.
    pub fn increment_nonce(&mut self, caller: Address) -> Result<U256> {
        if caller != self.owner() {
            return Err(PermissionError::NotOwner.into());
        }
        let next = self.nonce.increment();
        debug!(nonce = %next, "nonce bumped by owner");
        Ok(next)
    }

    fn admit<H: WalletHost, R: SignerRecovery>(
        &mut self,
        host: &H,
        recovery: &R,
        caller: Address,
        signature: &Signature,
        digest: B256,
    ) -> Result<()> {
        let owner = self.owner();
        authenticate(
            caller,
            owner,
            signature,
            digest,
            host.timestamp(),
            &mut self.nonce,
            recovery,
        )?;
        Ok(())
    }

    fn role_of(&self, caller: Address, block: u64) -> Result<Role> {
        Ok(resolve_role(
            caller,
            self.owner(),
            &self.global_manager,
            &self.managers,
            &self.payees,
            block,
        )?)
    }
}

pub fn signing_domain<H: WalletHost>(host: &H) -> SigningDomain {
    SigningDomain {
        chain_id: host.chain_id(),
        wallet: host.wallet(),
    }
}

/// Run `f` on a staged copy of `state`; commit on success, roll back the host otherwise.
pub fn atomically<H, T, F>(state: &mut WalletState, host: &mut H, f: F) -> Result<T>
where
    H: WalletHost,
    F: FnOnce(&mut WalletState, &mut H) -> Result<T>,
{
    let snapshot = host.snapshot();
    let mut staged = state.clone();
    match f(&mut staged, host) {
        Ok(value) => {
            *state = staged;
            Ok(value)
        }
        Err(err) => {
            host.restore(snapshot);
            debug!(%err, "request aborted, state rolled back");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{AuthError, InputError, LimitError, WalletError},
        testing::{owner, relay, sign_action, sign_batch, MockHost, ALICE, CHARLIE, LEGO_DEBT, USDC},
    };
    use agent_wallet_encoder::LocalRecovery;
    use agent_wallet_types::{ActionKind, Amount, Limits, ManagerGrant};

    fn transfer(amount: u64) -> ActionInstruction {
        let mut ix = ActionInstruction::new(ActionKind::Transfer);
        ix.asset = USDC;
        ix.target = CHARLIE;
        ix.amount = Amount::from(amount);
        ix
    }

    fn wallet_with_relay_manager(host: &MockHost) -> WalletState {
        let mut state = WalletState::for_owner(owner());
        state.whitelist.insert(CHARLIE);
        let mut grant = ManagerGrant::unrestricted();
        grant.limits.usd = Limits {
            per_tx_cap: U256::from(500u64),
            per_period_cap: U256::from(2000u64),
            lifetime_cap: U256::ZERO,
        };
        state.add_manager(owner(), relay(), grant, host.block_number()).unwrap();
        state
    }

    #[test]
    fn transfer_add_collateral_transfer_pays_130() {
        let mut host = MockHost::funded();
        let mut state = WalletState::for_owner(owner());
        state.whitelist.insert(CHARLIE);

        let mut collateral = ActionInstruction::new(ActionKind::AddCollateral);
        collateral.lego_id = LEGO_DEBT;
        collateral.asset = USDC;
        collateral.amount = Amount::from(20);
        let mut last = transfer(30);
        last.use_prev_amount_out = true;

        let batch = [transfer(100), collateral, last];
        state
            .perform_batch(&mut host, &LocalRecovery, owner(), &batch, &Signature::default())
            .unwrap();
        assert_eq!(host.balance(USDC, CHARLIE), U256::from(130u64));
    }

    #[test]
    fn fifteen_ok_sixteen_rejected_before_auth() {
        let mut host = MockHost::funded();
        let mut state = wallet_with_relay_manager(&host);
        let batch: Vec<_> = (0..15).map(|_| transfer(1)).collect();
        let sig = sign_batch(&host, &batch, U256::ZERO);
        state.perform_batch(&mut host, &LocalRecovery, relay(), &batch, &sig).unwrap();
        assert_eq!(state.nonce.current(), U256::from(1u64));

        let mut sixteen = batch.clone();
        sixteen.push(transfer(1));
        // Garbage signature: the count check must fire first.
        let garbage = Signature {
            bytes: alloc::vec![0xFF; 3],
            ..Default::default()
        };
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, relay(), &sixteen, &garbage),
            Err(WalletError::Input(InputError::TooManyInstructions))
        );
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, relay(), &[], &garbage),
            Err(WalletError::Input(InputError::NoInstructions))
        );
        assert_eq!(state.nonce.current(), U256::from(1u64));
    }

    #[test]
    fn failed_batch_rolls_back_everything() {
        let mut host = MockHost::funded();
        let mut state = wallet_with_relay_manager(&host);
        let before_state = state.clone();
        let before_charlie = host.balance(USDC, CHARLIE);

        // The last transfer breaks the per-period cap after four have moved funds.
        let batch = [transfer(500), transfer(500), transfer(500), transfer(500), transfer(100)];
        let sig = sign_batch(&host, &batch, U256::ZERO);
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, relay(), &batch, &sig),
            Err(WalletError::Limit(LimitError::UsdPerPeriodCapExceeded))
        );
        assert_eq!(state, before_state);
        assert_eq!(host.balance(USDC, CHARLIE), before_charlie);
    }

    #[test]
    fn nonce_only_moves_forward() {
        let mut host = MockHost::funded();
        let mut state = wallet_with_relay_manager(&host);
        let batch = [transfer(1)];

        for expected in 1..=3u64 {
            let sig = sign_batch(&host, &batch, state.nonce.current());
            state.perform_batch(&mut host, &LocalRecovery, relay(), &batch, &sig).unwrap();
            assert_eq!(state.nonce.current(), U256::from(expected));
        }

        // Replaying an older nonce fails and leaves the nonce alone.
        let stale = sign_batch(&host, &batch, U256::from(1u64));
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, relay(), &batch, &stale),
            Err(WalletError::Auth(AuthError::InvalidNonce))
        );
        assert_eq!(state.nonce.current(), U256::from(3u64));

        // Owner bump voids a signature prepared for the current nonce.
        let pending = sign_batch(&host, &batch, U256::from(3u64));
        assert_eq!(state.increment_nonce(owner()), Ok(U256::from(4u64)));
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, relay(), &batch, &pending),
            Err(WalletError::Auth(AuthError::InvalidNonce))
        );
        assert_eq!(
            state.increment_nonce(relay()),
            Err(WalletError::Permission(PermissionError::NotOwner))
        );
    }

    #[test]
    fn signature_is_bound_to_the_batch() {
        let mut host = MockHost::funded();
        let mut state = wallet_with_relay_manager(&host);
        let sig = sign_batch(&host, &[transfer(1)], U256::ZERO);
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, relay(), &[transfer(2)], &sig),
            Err(WalletError::Auth(AuthError::InvalidSigner))
        );
    }

    #[test]
    fn single_action_uses_kind_specific_digest() {
        let mut host = MockHost::funded();
        let mut state = wallet_with_relay_manager(&host);
        let ix = transfer(7);

        // A batch signature over the same instruction does not authorise the single path.
        let batch_sig = sign_batch(&host, core::slice::from_ref(&ix), U256::ZERO);
        assert_eq!(
            state.perform_action(&mut host, &LocalRecovery, relay(), &ix, &batch_sig),
            Err(WalletError::Auth(AuthError::InvalidSigner))
        );

        let sig = sign_action(&host, &ix, U256::ZERO);
        let out = state.perform_action(&mut host, &LocalRecovery, relay(), &ix, &sig).unwrap();
        assert_eq!(out.amount_out, U256::from(7u64));
        assert_eq!(out.usd_value, U256::from(7u64));
        assert_eq!(state.manager_data[&relay()].total_num_txs, 1);
    }

    #[test]
    fn stranger_with_owner_signature_is_unauthorized() {
        let mut host = MockHost::funded();
        let mut state = WalletState::for_owner(owner());
        state.whitelist.insert(CHARLIE);
        let batch = [transfer(1)];
        let sig = sign_batch(&host, &batch, U256::ZERO);
        assert_eq!(
            state.perform_batch(&mut host, &LocalRecovery, ALICE, &batch, &sig),
            Err(WalletError::Permission(PermissionError::Unauthorized))
        );
        // Authentication succeeded but the call aborted, so the nonce is restored.
        assert_eq!(state.nonce.current(), U256::ZERO);
    }
}
