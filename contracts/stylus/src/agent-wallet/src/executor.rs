//! Batch action executor.
//!
//! Instructions run strictly in order. Each one may take the previous step's primary output
//! as its input amount; a zero output falls back to the instruction's own amount.

use alloc::vec::Vec;

use stylus_sdk::alloy_primitives::{Address, B256, U256};
use tracing::{debug, trace};

use agent_wallet_types::{
    Action, ActionInstruction, ActionKind, Amount, LegoOutcome, LegoParams, PayeeData, SwapStep,
    WalletHost,
};

use crate::{
    errors::{InputError, Result},
    payees::{check_payee, PayeeContext, PayeeDecision, Payment},
    permissions::{can_perform, check_manager_usage, Operation, Request, Role},
    wallet::WalletState,
};

/// What one instruction moved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub amount_in: U256,
    /// Primary output, the value later steps may chain on.
    pub amount_out: U256,
    pub usd_value: U256,
}

/// Runs instructions for one authenticated caller against a staged wallet state.
pub struct Executor<'a, H: WalletHost> {
    host: &'a mut H,
    state: &'a mut WalletState,
    role: Role,
    block: u64,
}

impl<'a, H: WalletHost> Executor<'a, H> {
    pub fn new(host: &'a mut H, state: &'a mut WalletState, role: Role) -> Self {
        let block = host.block_number();
        Self {
            host,
            state,
            role,
            block,
        }
    }

    /// Execute `instructions` in order, threading primary outputs between steps.
    pub fn run(&mut self, instructions: &[ActionInstruction]) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(instructions.len());
        let mut prev_amount_out = U256::ZERO;

        for (index, ix) in instructions.iter().enumerate() {
            let action = if ix.use_prev_amount_out && !prev_amount_out.is_zero() {
                let mut chained = ix.clone();
                chained.set_primary_amount(prev_amount_out);
                chained.view()
            } else {
                ix.view()
            };

            trace!(index, kind = ?ix.kind, "dispatching instruction");
            let outcome = self.execute(&action)?;
            prev_amount_out = outcome.amount_out;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Execute a single action.
    pub fn execute(&mut self, action: &Action) -> Result<StepOutcome> {
        match action {
            Action::Transfer {
                asset,
                recipient,
                amount,
            } => self.transfer(*asset, *recipient, *amount),

            Action::DepositForYield {
                lego_id,
                asset,
                vault,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::DepositForYield)?;
                let amount = self.spendable(*amount, *asset)?;
                let params = LegoParams {
                    asset: *asset,
                    target: *vault,
                    amount,
                    extra_data: *extra_data,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::DepositForYield, &params)?;
                self.finish(out, *asset, out.amount_out)
            }

            Action::WithdrawFromYield {
                lego_id,
                vault_token,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::WithdrawFromYield)?;
                let amount = self.spendable(*amount, *vault_token)?;
                let params = LegoParams {
                    asset: *vault_token,
                    amount,
                    extra_data: *extra_data,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::WithdrawFromYield, &params)?;
                self.finish(out, *vault_token, out.amount_out)
            }

            Action::RebalanceYieldPosition {
                from_lego_id,
                from_vault_token,
                to_lego_id,
                to_vault,
                underlying,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::RebalanceYieldPosition)?;
                let amount = self.spendable(*amount, *from_vault_token)?;
                let withdraw = LegoParams {
                    asset: *from_vault_token,
                    amount,
                    extra_data: *extra_data,
                    ..Default::default()
                };
                let withdrawn =
                    self.lego(*from_lego_id, ActionKind::WithdrawFromYield, &withdraw)?;
                let deposit = LegoParams {
                    asset: *underlying,
                    target: *to_vault,
                    amount: withdrawn.amount_out,
                    extra_data: *extra_data,
                    ..Default::default()
                };
                let deposited = self.lego(*to_lego_id, ActionKind::DepositForYield, &deposit)?;
                let out = LegoOutcome {
                    amount_in: withdrawn.amount_in,
                    amount_out: deposited.amount_out,
                    secondary_out: U256::ZERO,
                    usd_value: withdrawn.usd_value.max(deposited.usd_value),
                };
                self.finish(out, *from_vault_token, out.amount_out)
            }

            Action::Swap { steps } => {
                self.authorize(action, ActionKind::Swap)?;
                self.swap(steps)
            }

            Action::MintOrRedeemAsset {
                lego_id,
                token_in,
                token_out,
                amount_in,
                min_amount_out,
                extra_data,
            } => {
                self.authorize(action, ActionKind::MintOrRedeemAsset)?;
                let amount = self.spendable(*amount_in, *token_in)?;
                let params = LegoParams {
                    asset: *token_in,
                    asset2: *token_out,
                    amount,
                    min_out1: *min_amount_out,
                    extra_data: *extra_data,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::MintOrRedeemAsset, &params)?;
                self.finish(out, *token_in, out.amount_out)
            }

            Action::ConfirmMintOrRedeemAsset {
                lego_id,
                token_in,
                token_out,
                extra_data,
            } => {
                self.authorize(action, ActionKind::ConfirmMintOrRedeemAsset)?;
                let params = LegoParams {
                    asset: *token_in,
                    asset2: *token_out,
                    extra_data: *extra_data,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::ConfirmMintOrRedeemAsset, &params)?;
                self.finish(out, *token_out, out.amount_out)
            }

            Action::AddCollateral {
                lego_id,
                asset,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::AddCollateral)?;
                let amount = self.spendable(*amount, *asset)?;
                let out =
                    self.debt_call(*lego_id, ActionKind::AddCollateral, *asset, amount, *extra_data)?;
                self.finish(out, *asset, U256::ZERO)
            }

            Action::RemoveCollateral {
                lego_id,
                asset,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::RemoveCollateral)?;
                let amount = exact_only(*amount)?;
                let out =
                    self.debt_call(*lego_id, ActionKind::RemoveCollateral, *asset, amount, *extra_data)?;
                self.finish(out, *asset, out.amount_out)
            }

            Action::BorrowAsset {
                lego_id,
                asset,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::BorrowAsset)?;
                let amount = exact_only(*amount)?;
                let out =
                    self.debt_call(*lego_id, ActionKind::BorrowAsset, *asset, amount, *extra_data)?;
                self.finish(out, *asset, out.amount_out)
            }

            Action::RepayDebt {
                lego_id,
                asset,
                amount,
                extra_data,
            } => {
                self.authorize(action, ActionKind::RepayDebt)?;
                let amount = self.spendable(*amount, *asset)?;
                let out =
                    self.debt_call(*lego_id, ActionKind::RepayDebt, *asset, amount, *extra_data)?;
                self.finish(out, *asset, U256::ZERO)
            }

            Action::ClaimRewards {
                lego_id,
                reward_token,
                reward_amount,
                proofs,
            } => {
                self.authorize(action, ActionKind::ClaimRewards)?;
                let Amount::Exact(amount) = *reward_amount else {
                    return Err(InputError::EntireBalanceUnsupported.into());
                };
                let params = LegoParams {
                    asset: *reward_token,
                    amount,
                    aux_data: proofs.clone(),
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::ClaimRewards, &params)?;
                self.finish(out, *reward_token, out.amount_out)
            }

            Action::AddLiquidity {
                lego_id,
                pool,
                token_a,
                token_b,
                amount_a,
                amount_b,
                min_amount_a,
                min_amount_b,
                min_lp_amount,
            } => {
                self.authorize(action, ActionKind::AddLiquidity)?;
                let (amount_a, amount_b) = self.pair(*amount_a, *token_a, *amount_b, *token_b)?;
                let params = LegoParams {
                    asset: *token_a,
                    asset2: *token_b,
                    target: *pool,
                    amount: amount_a,
                    amount2: amount_b,
                    min_out1: *min_amount_a,
                    min_out2: *min_amount_b,
                    extra_val: *min_lp_amount,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::AddLiquidity, &params)?;
                self.finish(out, *token_a, out.amount_out)
            }

            Action::RemoveLiquidity {
                lego_id,
                pool,
                token_a,
                token_b,
                lp_token,
                lp_amount,
                min_amount_a,
                min_amount_b,
            } => {
                self.authorize(action, ActionKind::RemoveLiquidity)?;
                let lp_amount = self.spendable(*lp_amount, *lp_token)?;
                let params = LegoParams {
                    asset: *token_a,
                    asset2: *token_b,
                    target: *pool,
                    amount: lp_amount,
                    min_out1: *min_amount_a,
                    min_out2: *min_amount_b,
                    extra_addr: *lp_token,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::RemoveLiquidity, &params)?;
                // Token B lands in the wallet but is never chained.
                self.finish(out, *token_a, out.amount_out)
            }

            Action::AddLiquidityConcentrated {
                lego_id,
                nft_addr,
                nft_token_id,
                pool,
                token_a,
                token_b,
                amount_a,
                amount_b,
                tick_lower,
                tick_upper,
                min_amount_a,
                min_amount_b,
            } => {
                self.authorize(action, ActionKind::AddLiquidityConcentrated)?;
                let (amount_a, amount_b) = self.pair(*amount_a, *token_a, *amount_b, *token_b)?;
                let params = LegoParams {
                    asset: *token_a,
                    asset2: *token_b,
                    target: *pool,
                    amount: amount_a,
                    amount2: amount_b,
                    min_out1: *min_amount_a,
                    min_out2: *min_amount_b,
                    tick_lower: *tick_lower,
                    tick_upper: *tick_upper,
                    extra_addr: *nft_addr,
                    extra_val: *nft_token_id,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::AddLiquidityConcentrated, &params)?;
                self.finish(out, *token_a, out.amount_out)
            }

            Action::RemoveLiquidityConcentrated {
                lego_id,
                nft_addr,
                nft_token_id,
                pool,
                token_a,
                token_b,
                liquidity,
                min_amount_a,
                min_amount_b,
            } => {
                self.authorize(action, ActionKind::RemoveLiquidityConcentrated)?;
                // Position liquidity is not a token balance.
                let liquidity = exact_only(*liquidity)?;
                let params = LegoParams {
                    asset: *token_a,
                    asset2: *token_b,
                    target: *pool,
                    amount: liquidity,
                    min_out1: *min_amount_a,
                    min_out2: *min_amount_b,
                    extra_addr: *nft_addr,
                    extra_val: *nft_token_id,
                    ..Default::default()
                };
                let out = self.lego(*lego_id, ActionKind::RemoveLiquidityConcentrated, &params)?;
                self.finish(out, *token_a, out.amount_out)
            }
        }
    }

    fn transfer(
        &mut self,
        asset: Address,
        recipient: Address,
        amount: Amount,
    ) -> Result<StepOutcome> {
        if recipient == Address::ZERO {
            return Err(InputError::InvalidAddress.into());
        }
        let request = Request {
            op: Operation::Action(ActionKind::Transfer),
            assets: &[asset],
            legos: &[],
            payee: Some(recipient),
        };
        self.permit(&request)?;

        let amount = self.spendable(amount, asset)?;
        let usd_value = self.host.usd_value(asset, amount)?;

        let payment = Payment {
            recipient,
            asset,
            amount,
            usd_value,
        };
        let decision = {
            let state = &*self.state;
            let fresh = PayeeData::default();
            let ctx = PayeeContext {
                owner: state.config.owner,
                is_whitelisted: state.whitelist.contains(&recipient),
                settings: state.payees.get(&recipient),
                global: &state.global_payee,
                data: state.payee_data.get(&recipient).unwrap_or(&fresh),
            };
            check_payee(&payment, &ctx, self.block)?
        };
        if let PayeeDecision::Metered(data) = decision {
            self.state.payee_data.insert(recipient, data);
        }

        self.record_usage(usd_value)?;
        self.host.transfer(asset, recipient, amount)?;
        debug!(%asset, %recipient, %amount, "transfer executed");

        Ok(StepOutcome {
            amount_in: amount,
            amount_out: amount,
            usd_value,
        })
    }

    fn swap(&mut self, steps: &[SwapStep]) -> Result<StepOutcome> {
        validate_swap_path(steps)?;

        let mut amount_in = U256::ZERO;
        let mut carried = U256::ZERO;
        let mut usd_value = U256::ZERO;
        for (i, step) in steps.iter().enumerate() {
            let token_in = step.token_in().ok_or(InputError::InvalidSwapPath)?;
            let token_out = step.token_out().ok_or(InputError::InvalidSwapPath)?;
            let amount = if i == 0 {
                self.spendable(step.amount_in, token_in)?
            } else {
                carried
            };
            let params = LegoParams {
                asset: token_in,
                asset2: token_out,
                amount,
                min_out1: step.min_amount_out,
                token_path: step.token_path.clone(),
                pool_path: step.pool_path.clone(),
                ..Default::default()
            };
            let out = self.lego(step.lego_id, ActionKind::Swap, &params)?;
            if i == 0 {
                amount_in = out.amount_in;
            }
            carried = out.amount_out;
            usd_value = usd_value.max(self.priced(&out, token_in)?);
        }

        self.record_usage(usd_value)?;
        Ok(StepOutcome {
            amount_in,
            amount_out: carried,
            usd_value,
        })
    }

    fn debt_call(
        &mut self,
        lego_id: u16,
        kind: ActionKind,
        asset: Address,
        amount: U256,
        extra_data: B256,
    ) -> Result<LegoOutcome> {
        let params = LegoParams {
            asset,
            amount,
            extra_data,
            ..Default::default()
        };
        self.lego(lego_id, kind, &params)
    }

    fn authorize(&self, action: &Action, kind: ActionKind) -> Result<()> {
        let assets = action.assets();
        let legos = action.legos();
        let request = Request {
            op: Operation::Action(kind),
            assets: &assets,
            legos: &legos,
            payee: None,
        };
        self.permit(&request)
    }

    fn permit(&self, request: &Request<'_>) -> Result<()> {
        let state = &*self.state;
        can_perform(self.role, &state.global_manager, &state.managers, request, self.block)?;
        Ok(())
    }

    /// Resolve an amount the wallet is about to spend from its balance of `asset`.
    fn spendable(&self, amount: Amount, asset: Address) -> Result<U256> {
        let value = match amount {
            Amount::Exact(value) => value,
            Amount::EntireBalance => self.host.balance_of(asset)?,
        };
        if value.is_zero() {
            return Err(InputError::ZeroAmount.into());
        }
        Ok(value)
    }

    /// Liquidity legs: each side resolves independently, at least one must be non-zero.
    fn pair(
        &self,
        a: Amount,
        token_a: Address,
        b: Amount,
        token_b: Address,
    ) -> Result<(U256, U256)> {
        let resolve = |amount: Amount, token: Address| -> Result<U256> {
            match amount {
                Amount::Exact(value) => Ok(value),
                Amount::EntireBalance => Ok(self.host.balance_of(token)?),
            }
        };
        let (a, b) = (resolve(a, token_a)?, resolve(b, token_b)?);
        if a.is_zero() && b.is_zero() {
            return Err(InputError::ZeroAmount.into());
        }
        Ok((a, b))
    }

    fn lego(&mut self, lego_id: u16, kind: ActionKind, params: &LegoParams) -> Result<LegoOutcome> {
        let out = self.host.perform_lego_action(lego_id, kind, params)?;
        trace!(
            lego_id,
            ?kind,
            amount_in = %out.amount_in,
            amount_out = %out.amount_out,
            "lego call returned"
        );
        Ok(out)
    }

    /// USD value of a lego step; priced from its input when the lego reports none.
    fn priced(&self, out: &LegoOutcome, asset: Address) -> Result<U256> {
        if !out.usd_value.is_zero() || out.amount_in.is_zero() {
            return Ok(out.usd_value);
        }
        Ok(self.host.usd_value(asset, out.amount_in)?)
    }

    fn finish(
        &mut self,
        out: LegoOutcome,
        priced_asset: Address,
        primary: U256,
    ) -> Result<StepOutcome> {
        let usd_value = self.priced(&out, priced_asset)?;
        self.record_usage(usd_value)?;
        Ok(StepOutcome {
            amount_in: out.amount_in,
            amount_out: primary,
            usd_value,
        })
    }

    /// Meter a manager's consumption. Owner and payee calls are not metered here.
    fn record_usage(&mut self, usd_value: U256) -> Result<()> {
        let Role::Manager(manager) = self.role else {
            return Ok(());
        };
        let global = &self.state.global_manager;
        let Some(settings) = self.state.managers.get(&manager) else {
            return Ok(());
        };
        let current = self.state.manager_data.get(&manager).copied().unwrap_or_default();
        let next = check_manager_usage(
            usd_value,
            &settings.limits,
            &global.limits,
            global.manager_period,
            &current,
            self.block,
        )
        .inspect_err(|err| {
            debug!(%manager, %usd_value, %err, "manager limit rejected action");
        })?;
        self.state.manager_data.insert(manager, next);
        Ok(())
    }
}

fn exact_only(amount: Amount) -> Result<U256> {
    match amount {
        Amount::Exact(value) if value.is_zero() => Err(InputError::ZeroAmount.into()),
        Amount::Exact(value) => Ok(value),
        Amount::EntireBalance => Err(InputError::EntireBalanceUnsupported.into()),
    }
}

/// Steps must be non-empty, each with a path of at least two tokens, and each step must
/// start where the previous one ended.
pub fn validate_swap_path(steps: &[SwapStep]) -> Result<()> {
    if steps.is_empty() {
        return Err(InputError::InvalidSwapPath.into());
    }
    for step in steps {
        if step.token_path.len() < 2 {
            return Err(InputError::InvalidSwapPath.into());
        }
    }
    for pair in steps.windows(2) {
        if pair[0].token_out() != pair[1].token_in() {
            return Err(InputError::InvalidSwapPath.into());
        }
    }
    Ok(())
}
