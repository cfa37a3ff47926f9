//! Stylus entrypoint of the agent wallet.
//!
//! Storage is keyed: config, nonce and the two global settings sit in their own slots, and
//! every per-address record lives in a mapping. A call loads only the entries of the
//! addresses it can touch (the caller, the management subject, transfer recipients), runs
//! the core against that [`WalletState`] and writes back what changed. Any error reverts
//! the transaction, which also unwinds every token and lego call made along the way.
//!
//! Structured arguments (grants, global settings, instructions) travel in the compact
//! encoding shared with off-chain tooling.

use alloc::{collections::BTreeMap, vec::Vec};

use stylus_sdk::{
    alloy_primitives::{Address, U256},
    prelude::*,
    storage::{StorageBytes, StorageMap},
};

use agent_wallet_types::{
    ActionInstruction, ActionKind, Codec, GlobalManagerSettings, GlobalPayeeSettings,
    ManagerGrant, PayeeGrant, WalletConfig,
};

use crate::{
    auth::{NonceState, Signature},
    constants::STATIC_CALL_GAS,
    decoder::{decode_instruction, decode_instructions},
    errors::{InputError, Result as WalletResult, WalletError, WalletRevert},
    host::onchain::{CallContext, OnchainHost},
    utils::crypto::EcrecoverPrecompile,
    wallet::WalletState,
};

sol_storage! {
    #[entrypoint]
    pub struct AgentWallet {
        bool initialized;

        /// Encoded `WalletConfig`.
        bytes config;
        uint256 nonce;
        bytes global_manager;
        bytes global_payee;

        mapping(address => bytes) managers;
        mapping(address => bytes) manager_data;
        mapping(address => bytes) payees;
        mapping(address => bytes) payee_data;
        mapping(address => bytes) pending_payees;
        mapping(address => bool) whitelist;
        mapping(address => bytes) pending_whitelist;
    }
}

/// Addresses whose records a batch can read or write: the caller and every transfer
/// recipient. Sorted, without duplicates.
pub fn accounts_touched(caller: Address, instructions: &[ActionInstruction]) -> Vec<Address> {
    let mut keys: Vec<Address> = instructions
        .iter()
        .filter(|ix| ix.kind == ActionKind::Transfer)
        .map(|ix| ix.target)
        .collect();
    keys.push(caller);
    keys.sort_unstable();
    keys.dedup();
    keys
}

#[public]
impl AgentWallet {
    /// Deployment-time setup from an encoded [`WalletConfig`] install blob.
    ///
    /// Installs default global settings for managers and payees.
    #[constructor]
    pub fn initialize(&mut self, config: Vec<u8>) -> Result<(), WalletRevert> {
        if self.initialized.get() {
            return Err(WalletError::from(InputError::AlreadyInitialized).into());
        }
        let config = WalletConfig::from_bytes(&config).map_err(WalletError::from)?;
        if config.owner == Address::ZERO {
            return Err(WalletError::from(InputError::InvalidAddress).into());
        }
        self.config.set_bytes(config.to_bytes().map_err(WalletError::from)?);
        self.nonce.set(U256::ZERO);
        self.global_manager.set_bytes(
            GlobalManagerSettings::default().to_bytes().map_err(WalletError::from)?,
        );
        self.global_payee.set_bytes(
            GlobalPayeeSettings::default().to_bytes().map_err(WalletError::from)?,
        );
        self.initialized.set(true);
        Ok(())
    }

    /// Execute an encoded batch. Returns each step's primary output.
    pub fn perform_batch(
        &mut self,
        instructions: Vec<u8>,
        signature: Vec<u8>,
        nonce: U256,
        expiration: u64,
    ) -> Result<Vec<U256>, WalletRevert> {
        let batch = decode_instructions(&instructions).map_err(WalletError::from)?;
        let signature = Signature {
            bytes: signature,
            nonce,
            expiration,
        };
        let caller = self.vm().msg_sender();
        let keys = accounts_touched(caller, &batch);

        let before = self.load_state(&keys)?;
        let mut state = before.clone();
        let outcomes = {
            let mut host = self.host(&state.config);
            let recovery = EcrecoverPrecompile::new(self.vm());
            state.perform_batch(&mut host, &recovery, caller, &batch, &signature)?
        };
        self.store_state(&before, &state, &keys)?;
        Ok(outcomes.iter().map(|o| o.amount_out).collect())
    }

    /// Execute one encoded instruction. Returns `(amountIn, amountOut, usdValue)`.
    pub fn perform_action(
        &mut self,
        instruction: Vec<u8>,
        signature: Vec<u8>,
        nonce: U256,
        expiration: u64,
    ) -> Result<(U256, U256, U256), WalletRevert> {
        let instruction = decode_instruction(&instruction).map_err(WalletError::from)?;
        let signature = Signature {
            bytes: signature,
            nonce,
            expiration,
        };
        let caller = self.vm().msg_sender();
        let keys = accounts_touched(caller, core::slice::from_ref(&instruction));

        let before = self.load_state(&keys)?;
        let mut state = before.clone();
        let out = {
            let mut host = self.host(&state.config);
            let recovery = EcrecoverPrecompile::new(self.vm());
            state.perform_action(&mut host, &recovery, caller, &instruction, &signature)?
        };
        self.store_state(&before, &state, &keys)?;
        Ok((out.amount_in, out.amount_out, out.usd_value))
    }

    pub fn increment_nonce(&mut self) -> Result<U256, WalletRevert> {
        self.update(&[], |state, caller, _| state.increment_nonce(caller))
    }

    pub fn current_nonce(&self) -> Result<U256, WalletRevert> {
        self.require_initialized()?;
        Ok(self.nonce.get())
    }

    pub fn owner(&self) -> Result<Address, WalletRevert> {
        Ok(self.load_state(&[])?.owner())
    }

    pub fn is_whitelisted(&self, addr: Address) -> Result<bool, WalletRevert> {
        self.require_initialized()?;
        Ok(self.whitelist.get(addr))
    }

    /// Encoded settings of a manager; empty when `manager` is not registered.
    pub fn manager_settings(&self, manager: Address) -> Result<Vec<u8>, WalletRevert> {
        self.require_initialized()?;
        Ok(self.managers.getter(manager).get_bytes())
    }

    /// Encoded settings of a payee; empty when `payee` is not registered.
    pub fn payee_settings(&self, payee: Address) -> Result<Vec<u8>, WalletRevert> {
        self.require_initialized()?;
        Ok(self.payees.getter(payee).get_bytes())
    }

    pub fn add_manager(&mut self, manager: Address, grant: Vec<u8>) -> Result<(), WalletRevert> {
        self.update(&[manager], |state, caller, block| {
            let grant = ManagerGrant::from_bytes(&grant)?;
            state.add_manager(caller, manager, grant, block)
        })
    }

    pub fn update_manager(
        &mut self,
        manager: Address,
        grant: Vec<u8>,
    ) -> Result<(), WalletRevert> {
        self.update(&[manager], |state, caller, _| {
            let grant = ManagerGrant::from_bytes(&grant)?;
            state.update_manager(caller, manager, grant)
        })
    }

    pub fn remove_manager(&mut self, manager: Address) -> Result<(), WalletRevert> {
        self.update(&[manager], |state, caller, _| state.remove_manager(caller, manager))
    }

    pub fn set_global_manager_settings(&mut self, settings: Vec<u8>) -> Result<(), WalletRevert> {
        self.update(&[], |state, caller, _| {
            let settings = GlobalManagerSettings::from_bytes(&settings)?;
            state.set_global_manager_settings(caller, settings)
        })
    }

    pub fn set_global_payee_settings(&mut self, settings: Vec<u8>) -> Result<(), WalletRevert> {
        self.update(&[], |state, caller, _| {
            let settings = GlobalPayeeSettings::from_bytes(&settings)?;
            state.set_global_payee_settings(caller, settings)
        })
    }

    pub fn add_payee(&mut self, payee: Address, grant: Vec<u8>) -> Result<(), WalletRevert> {
        self.update(&[payee], |state, caller, block| {
            let grant = PayeeGrant::from_bytes(&grant)?;
            state.add_payee(caller, payee, grant, block)
        })
    }

    pub fn update_payee(&mut self, payee: Address, grant: Vec<u8>) -> Result<(), WalletRevert> {
        self.update(&[payee], |state, caller, _| {
            let grant = PayeeGrant::from_bytes(&grant)?;
            state.update_payee(caller, payee, grant)
        })
    }

    pub fn remove_payee(&mut self, payee: Address) -> Result<(), WalletRevert> {
        self.update(&[payee], |state, caller, _| state.remove_payee(caller, payee))
    }

    pub fn add_pending_payee(
        &mut self,
        payee: Address,
        grant: Vec<u8>,
    ) -> Result<(), WalletRevert> {
        self.update(&[payee], |state, caller, block| {
            let grant = PayeeGrant::from_bytes(&grant)?;
            state.add_pending_payee(caller, payee, grant, block)
        })
    }

    pub fn confirm_pending_payee(&mut self, payee: Address) -> Result<(), WalletRevert> {
        self.update(&[payee], |state, caller, block| {
            state.confirm_pending_payee(caller, payee, block)
        })
    }

    pub fn cancel_pending_payee(&mut self, payee: Address) -> Result<(), WalletRevert> {
        self.update(&[payee], |state, caller, block| {
            state.cancel_pending_payee(caller, payee, block)
        })
    }

    pub fn add_pending_whitelist_addr(&mut self, addr: Address) -> Result<(), WalletRevert> {
        self.update(&[addr], |state, caller, block| {
            state.add_pending_whitelist(caller, addr, block)
        })
    }

    pub fn confirm_whitelist_addr(&mut self, addr: Address) -> Result<(), WalletRevert> {
        self.update(&[addr], |state, caller, block| {
            state.confirm_whitelist(caller, addr, block)
        })
    }

    pub fn cancel_pending_whitelist_addr(&mut self, addr: Address) -> Result<(), WalletRevert> {
        self.update(&[addr], |state, caller, block| {
            state.cancel_pending_whitelist(caller, addr, block)
        })
    }

    pub fn remove_whitelist_addr(&mut self, addr: Address) -> Result<(), WalletRevert> {
        self.update(&[addr], |state, caller, block| {
            state.remove_whitelist(caller, addr, block)
        })
    }
}

fn load_entry<V: Codec>(
    map: &StorageMap<Address, StorageBytes>,
    key: Address,
    into: &mut BTreeMap<Address, V>,
) -> WalletResult<()> {
    let slot = map.getter(key);
    if !slot.is_empty() {
        into.insert(key, V::from_bytes(&slot.get_bytes())?);
    }
    Ok(())
}

fn store_entry<V: Codec + PartialEq>(
    map: &mut StorageMap<Address, StorageBytes>,
    key: Address,
    before: &BTreeMap<Address, V>,
    after: &BTreeMap<Address, V>,
) -> WalletResult<()> {
    let value = after.get(&key);
    if before.get(&key) == value {
        return Ok(());
    }
    let mut slot = map.setter(key);
    match value {
        Some(value) => slot.set_bytes(value.to_bytes()?),
        None => slot.erase(),
    }
    Ok(())
}

impl AgentWallet {
    fn require_initialized(&self) -> WalletResult<()> {
        if !self.initialized.get() {
            return Err(InputError::NotInitialized.into());
        }
        Ok(())
    }

    /// Wallet-wide records plus the per-address records of `keys`.
    fn load_state(&self, keys: &[Address]) -> WalletResult<WalletState> {
        self.require_initialized()?;
        let mut state = WalletState::new(WalletConfig::from_bytes(&self.config.get_bytes())?);
        state.nonce = NonceState::new(self.nonce.get());
        state.global_manager = GlobalManagerSettings::from_bytes(&self.global_manager.get_bytes())?;
        state.global_payee = GlobalPayeeSettings::from_bytes(&self.global_payee.get_bytes())?;
        for &key in keys {
            load_entry(&self.managers, key, &mut state.managers)?;
            load_entry(&self.manager_data, key, &mut state.manager_data)?;
            load_entry(&self.payees, key, &mut state.payees)?;
            load_entry(&self.payee_data, key, &mut state.payee_data)?;
            load_entry(&self.pending_payees, key, &mut state.pending_payees)?;
            load_entry(&self.pending_whitelist, key, &mut state.pending_whitelist)?;
            if self.whitelist.get(key) {
                state.whitelist.insert(key);
            }
        }
        Ok(state)
    }

    /// Write back every record of `after` that differs from `before`.
    fn store_state(
        &mut self,
        before: &WalletState,
        after: &WalletState,
        keys: &[Address],
    ) -> WalletResult<()> {
        if before.config != after.config {
            self.config.set_bytes(after.config.to_bytes()?);
        }
        if before.nonce != after.nonce {
            self.nonce.set(after.nonce.current());
        }
        if before.global_manager != after.global_manager {
            self.global_manager.set_bytes(after.global_manager.to_bytes()?);
        }
        if before.global_payee != after.global_payee {
            self.global_payee.set_bytes(after.global_payee.to_bytes()?);
        }
        for &key in keys {
            store_entry(&mut self.managers, key, &before.managers, &after.managers)?;
            store_entry(&mut self.manager_data, key, &before.manager_data, &after.manager_data)?;
            store_entry(&mut self.payees, key, &before.payees, &after.payees)?;
            store_entry(&mut self.payee_data, key, &before.payee_data, &after.payee_data)?;
            store_entry(
                &mut self.pending_payees,
                key,
                &before.pending_payees,
                &after.pending_payees,
            )?;
            store_entry(
                &mut self.pending_whitelist,
                key,
                &before.pending_whitelist,
                &after.pending_whitelist,
            )?;
            let listed = after.whitelist.contains(&key);
            if before.whitelist.contains(&key) != listed {
                self.whitelist.insert(key, listed);
            }
        }
        Ok(())
    }

    fn host(&self, config: &WalletConfig) -> OnchainHost<'_> {
        let ctx = CallContext {
            block_number: self.vm().block_number(),
            timestamp: self.vm().block_timestamp(),
            chain_id: self.vm().chain_id(),
            wallet: self.vm().contract_address(),
        };
        OnchainHost::new(
            self.vm(),
            ctx,
            config.price_oracle,
            config.lego_book,
            STATIC_CALL_GAS,
        )
    }

    /// Load the caller's and `subjects`' records, mutate with the caller and current block,
    /// and persist on success.
    fn update<T>(
        &mut self,
        subjects: &[Address],
        f: impl FnOnce(&mut WalletState, Address, u64) -> WalletResult<T>,
    ) -> Result<T, WalletRevert> {
        let caller = self.vm().msg_sender();
        let block = self.vm().block_number();
        let mut keys = subjects.to_vec();
        keys.push(caller);
        keys.sort_unstable();
        keys.dedup();

        let before = self.load_state(&keys)?;
        let mut state = before.clone();
        let out = f(&mut state, caller, block)?;
        self.store_state(&before, &state, &keys)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::split_signature,
        host::interfaces::IERC20,
        testing::{owner, owner_key, relay, sign, ALICE, BOB, CHAIN_ID, CHARLIE, USDC, WALLET},
    };
    use agent_wallet_types::{
        batch_digest, codec::encode_batch, Amount, ManagerSettings, SigningDomain,
    };
    use stylus_sdk::{alloy_sol_types::SolCall, testing::*};

    const BLOCK: u64 = 5_000;
    const TIME: u64 = 1_700_000_000;

    fn config_bytes(owner: Address) -> Vec<u8> {
        WalletConfig {
            version: WalletConfig::VERSION,
            owner,
            switchboard: Address::ZERO,
            price_oracle: Address::ZERO,
            lego_book: Address::ZERO,
            whitelist_timelock: 0,
        }
        .to_bytes()
        .unwrap()
    }

    fn ok<T>(res: Result<T, WalletRevert>) -> T {
        match res {
            Ok(value) => value,
            Err(err) => panic!("reverted: 0x{}", hex::encode(Vec::<u8>::from(err))),
        }
    }

    fn vm() -> TestVM {
        let vm = TestVM::default();
        vm.set_chain_id(CHAIN_ID);
        vm.set_contract_address(WALLET);
        vm.set_block_number(BLOCK);
        vm.set_block_timestamp(TIME);
        vm
    }

    fn deployed(vm: &TestVM) -> AgentWallet {
        let mut wallet = AgentWallet::from(vm);
        vm.set_sender(owner());
        ok(wallet.initialize(config_bytes(owner())));
        wallet
    }

    fn whitelist(vm: &TestVM, wallet: &mut AgentWallet, addr: Address) {
        vm.set_sender(owner());
        ok(wallet.add_pending_whitelist_addr(addr));
        ok(wallet.confirm_whitelist_addr(addr));
    }

    fn transfer(to: Address, amount: u64) -> ActionInstruction {
        let mut ix = ActionInstruction::new(ActionKind::Transfer);
        ix.asset = USDC;
        ix.target = to;
        ix.amount = Amount::from(amount);
        ix
    }

    fn transfer_call(to: Address, amount: u64) -> Vec<u8> {
        IERC20::transferCall {
            to,
            amount: U256::from(amount),
        }
        .abi_encode()
    }

    #[test]
    fn constructor_installs_owner_and_zero_nonce() {
        let vm = vm();
        let wallet = deployed(&vm);
        assert_eq!(ok(wallet.owner()), owner());
        assert_eq!(ok(wallet.current_nonce()), U256::ZERO);
        assert!(ok(wallet.manager_settings(ALICE)).is_empty());
    }

    #[test]
    fn zero_owner_is_refused_at_deployment() {
        let vm = vm();
        let mut wallet = AgentWallet::from(&vm);
        let res = wallet.initialize(config_bytes(Address::ZERO));
        assert!(matches!(res, Err(WalletRevert::InvalidInput(_))));
        assert!(matches!(wallet.owner(), Err(WalletRevert::InvalidInput(_))));
    }

    #[test]
    fn setup_cannot_be_replayed_by_another_account() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        vm.set_sender(BOB);
        let res = wallet.initialize(config_bytes(BOB));
        let Err(WalletRevert::InvalidInput(err)) = res else {
            panic!("second setup must revert");
        };
        assert_eq!(err.reason, "AlreadyInitialized");
        assert_eq!(ok(wallet.owner()), owner());
    }

    #[test]
    fn calls_before_setup_revert() {
        let vm = vm();
        let mut wallet = AgentWallet::from(&vm);
        vm.set_sender(owner());
        let Err(WalletRevert::InvalidInput(err)) = wallet.increment_nonce() else {
            panic!("uninitialized wallet must revert");
        };
        assert_eq!(err.reason, "NotInitialized");
        assert!(wallet.is_whitelisted(CHARLIE).is_err());
    }

    #[test]
    fn owner_registers_a_manager() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        ok(wallet.add_manager(ALICE, ManagerGrant::unrestricted().to_bytes().unwrap()));

        let stored = ManagerSettings::from_bytes(&ok(wallet.manager_settings(ALICE))).unwrap();
        assert_eq!(stored.start_block, BLOCK);

        let again = wallet.add_manager(ALICE, ManagerGrant::unrestricted().to_bytes().unwrap());
        assert!(matches!(again, Err(WalletRevert::InvalidInput(_))));

        ok(wallet.remove_manager(ALICE));
        assert!(ok(wallet.manager_settings(ALICE)).is_empty());
    }

    #[test]
    fn strangers_cannot_manage_the_wallet() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        vm.set_sender(BOB);
        let res = wallet.add_manager(ALICE, ManagerGrant::unrestricted().to_bytes().unwrap());
        assert!(matches!(res, Err(WalletRevert::PermissionDenied(_))));
        assert!(ok(wallet.manager_settings(ALICE)).is_empty());
        assert!(matches!(wallet.increment_nonce(), Err(WalletRevert::PermissionDenied(_))));
    }

    #[test]
    fn nonce_bump_is_persisted() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        assert_eq!(ok(wallet.increment_nonce()), U256::from(1u64));
        assert_eq!(ok(wallet.increment_nonce()), U256::from(2u64));
        assert_eq!(ok(wallet.current_nonce()), U256::from(2u64));
    }

    #[test]
    fn whitelist_confirmation_is_persisted() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        assert!(!ok(wallet.is_whitelisted(CHARLIE)));
        whitelist(&vm, &mut wallet, CHARLIE);
        assert!(ok(wallet.is_whitelisted(CHARLIE)));
        ok(wallet.remove_whitelist_addr(CHARLIE));
        assert!(!ok(wallet.is_whitelisted(CHARLIE)));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        let res = wallet.perform_batch(encode_batch(&[]).unwrap(), Vec::new(), U256::ZERO, 0);
        assert!(matches!(res, Err(WalletRevert::InvalidInput(_))));
    }

    #[test]
    fn owner_pays_a_whitelisted_address() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        whitelist(&vm, &mut wallet, CHARLIE);
        vm.mock_call(
            USDC,
            transfer_call(CHARLIE, 250),
            Ok(U256::from(1u64).to_be_bytes::<32>().to_vec()),
        );

        let batch = encode_batch(&[transfer(CHARLIE, 250)]).unwrap();
        let out = ok(wallet.perform_batch(batch, Vec::new(), U256::ZERO, 0));
        assert_eq!(out, vec![U256::from(250u64)]);
        // The owner needs no signature, so no nonce is consumed.
        assert_eq!(ok(wallet.current_nonce()), U256::ZERO);
    }

    #[test]
    fn transfer_to_an_unknown_recipient_is_denied() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        let batch = encode_batch(&[transfer(BOB, 250)]).unwrap();
        let res = wallet.perform_batch(batch, Vec::new(), U256::ZERO, 0);
        let Err(WalletRevert::PermissionDenied(err)) = res else {
            panic!("unknown recipient must be refused");
        };
        assert_eq!(err.reason, "NotPayee");
    }

    #[test]
    fn failing_token_reverts_the_batch() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        whitelist(&vm, &mut wallet, CHARLIE);
        vm.mock_call(USDC, transfer_call(CHARLIE, 250), Err(Vec::new()));

        let batch = encode_batch(&[transfer(CHARLIE, 250)]).unwrap();
        let res = wallet.perform_batch(batch, Vec::new(), U256::ZERO, 0);
        assert!(matches!(res, Err(WalletRevert::UnderlyingActionFailed(_))));
    }

    #[test]
    fn relayed_batch_consumes_the_owner_nonce() {
        let vm = vm();
        let mut wallet = deployed(&vm);
        whitelist(&vm, &mut wallet, CHARLIE);
        ok(wallet.add_manager(relay(), ManagerGrant::unrestricted().to_bytes().unwrap()));

        let instructions = [transfer(CHARLIE, 100)];
        let expiration = TIME + 600;
        let domain = SigningDomain {
            chain_id: CHAIN_ID,
            wallet: WALLET,
        };
        let digest = batch_digest(&domain, &instructions, U256::ZERO, expiration).unwrap();
        let signature = sign(&owner_key(), digest);
        let parts = split_signature(&signature).unwrap();
        vm.mock_static_call(
            EcrecoverPrecompile::ADDRESS,
            EcrecoverPrecompile::input(digest, parts.v, parts.r, parts.s).to_vec(),
            Ok(owner().into_word().to_vec()),
        );
        vm.mock_call(USDC, transfer_call(CHARLIE, 100), Ok(Vec::new()));

        vm.set_sender(relay());
        let batch = encode_batch(&instructions).unwrap();
        let out = ok(wallet.perform_batch(batch.clone(), signature.clone(), U256::ZERO, expiration));
        assert_eq!(out, vec![U256::from(100u64)]);
        assert_eq!(ok(wallet.current_nonce()), U256::from(1u64));

        let replay = wallet.perform_batch(batch, signature, U256::ZERO, expiration);
        assert!(matches!(replay, Err(WalletRevert::AuthenticationFailed(_))));
    }

    #[test]
    fn touched_accounts_cover_caller_and_recipients() {
        let mut swap = ActionInstruction::new(ActionKind::Swap);
        swap.target = BOB;
        let batch = [transfer(CHARLIE, 1), swap, transfer(CHARLIE, 2), transfer(ALICE, 3)];
        let mut expected = vec![owner(), ALICE, CHARLIE];
        expected.sort_unstable();
        assert_eq!(accounts_touched(owner(), &batch), expected);
    }
}
