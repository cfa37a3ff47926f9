use alloc::vec::Vec;

use alloy_primitives::{Address, B256, U256};

/// Action kinds a wallet can execute. The discriminant is the wire byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ActionKind {
    Transfer = 0x01,

    DepositForYield = 0x10,
    WithdrawFromYield = 0x11,
    RebalanceYieldPosition = 0x12,

    Swap = 0x20,
    MintOrRedeemAsset = 0x21,
    ConfirmMintOrRedeemAsset = 0x22,

    AddCollateral = 0x30,
    RemoveCollateral = 0x31,
    BorrowAsset = 0x32,
    RepayDebt = 0x33,

    ClaimRewards = 0x40,

    AddLiquidity = 0x50,
    RemoveLiquidity = 0x51,
    AddLiquidityConcentrated = 0x52,
    RemoveLiquidityConcentrated = 0x53,
}

impl ActionKind {
    pub const ALL: [ActionKind; 16] = [
        ActionKind::Transfer,
        ActionKind::DepositForYield,
        ActionKind::WithdrawFromYield,
        ActionKind::RebalanceYieldPosition,
        ActionKind::Swap,
        ActionKind::MintOrRedeemAsset,
        ActionKind::ConfirmMintOrRedeemAsset,
        ActionKind::AddCollateral,
        ActionKind::RemoveCollateral,
        ActionKind::BorrowAsset,
        ActionKind::RepayDebt,
        ActionKind::ClaimRewards,
        ActionKind::AddLiquidity,
        ActionKind::RemoveLiquidity,
        ActionKind::AddLiquidityConcentrated,
        ActionKind::RemoveLiquidityConcentrated,
    ];

    /// The permission family a kind belongs to.
    pub fn category(self) -> ActionCategory {
        use ActionKind::*;
        match self {
            Transfer => ActionCategory::Transfer,
            DepositForYield | WithdrawFromYield | RebalanceYieldPosition => ActionCategory::Yield,
            Swap | MintOrRedeemAsset | ConfirmMintOrRedeemAsset => ActionCategory::BuyAndSell,
            AddCollateral | RemoveCollateral | BorrowAsset | RepayDebt => ActionCategory::Debt,
            ClaimRewards => ActionCategory::Rewards,
            AddLiquidity
            | RemoveLiquidity
            | AddLiquidityConcentrated
            | RemoveLiquidityConcentrated => ActionCategory::Liquidity,
        }
    }
}

impl TryFrom<u8> for ActionKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| *kind as u8 == value)
            .ok_or(())
    }
}

/// Coarse permission families, each gated by one manager permission bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionCategory {
    Transfer,
    Yield,
    BuyAndSell,
    Debt,
    Liquidity,
    Rewards,
}

/// Instruction amount. `EntireBalance` is resolved against the wallet's live balance when
/// the step executes, never when the instruction is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amount {
    Exact(U256),
    EntireBalance,
}

impl Amount {
    /// Wire sentinel for [`Amount::EntireBalance`].
    pub const ENTIRE_BALANCE_WORD: U256 = U256::MAX;

    pub fn from_word(word: U256) -> Self {
        if word == Self::ENTIRE_BALANCE_WORD {
            Amount::EntireBalance
        } else {
            Amount::Exact(word)
        }
    }

    pub fn to_word(self) -> U256 {
        match self {
            Amount::Exact(v) => v,
            Amount::EntireBalance => Self::ENTIRE_BALANCE_WORD,
        }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Exact(U256::ZERO)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount::Exact(U256::from(value))
    }
}

/// One hop (or hop group) of a swap, executed by a single lego.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapStep {
    pub lego_id: u16,
    pub amount_in: Amount,
    pub min_amount_out: U256,
    pub token_path: Vec<Address>,
    pub pool_path: Vec<Address>,
}

impl SwapStep {
    pub fn token_in(&self) -> Option<Address> {
        self.token_path.first().copied()
    }

    pub fn token_out(&self) -> Option<Address> {
        self.token_path.last().copied()
    }
}

/// Flat wire-level instruction. Handlers never read it directly: see [`ActionInstruction::view`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionInstruction {
    pub use_prev_amount_out: bool,
    pub kind: ActionKind,
    pub lego_id: u16,
    pub asset: Address,
    pub target: Address,
    pub amount: Amount,
    pub asset2: Address,
    pub amount2: Amount,
    pub min_out1: U256,
    pub min_out2: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub extra_addr: Address,
    pub extra_val: U256,
    pub extra_data: B256,
    pub aux_data: Vec<u8>,
    /// Destination lego of a rebalance. Kept apart from `amount2` so no field changes meaning by kind.
    pub to_lego_id: u16,
    pub swap_steps: Vec<SwapStep>,
}

impl ActionInstruction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            use_prev_amount_out: false,
            kind,
            lego_id: 0,
            asset: Address::ZERO,
            target: Address::ZERO,
            amount: Amount::default(),
            asset2: Address::ZERO,
            amount2: Amount::default(),
            min_out1: U256::ZERO,
            min_out2: U256::ZERO,
            tick_lower: 0,
            tick_upper: 0,
            extra_addr: Address::ZERO,
            extra_val: U256::ZERO,
            extra_data: B256::ZERO,
            aux_data: Vec::new(),
            to_lego_id: 0,
            swap_steps: Vec::new(),
        }
    }

    /// Replace the primary input amount with a chained value.
    ///
    /// The primary amount is `amount` for every kind except swaps, where it is the first
    /// step's `amount_in`.
    pub fn set_primary_amount(&mut self, value: U256) {
        match self.kind {
            ActionKind::Swap => {
                if let Some(first) = self.swap_steps.first_mut() {
                    first.amount_in = Amount::Exact(value);
                }
            }
            _ => self.amount = Amount::Exact(value),
        }
    }

    /// Narrow, kind-specific view of the instruction.
    pub fn view(&self) -> Action {
        match self.kind {
            ActionKind::Transfer => Action::Transfer {
                asset: self.asset,
                recipient: self.target,
                amount: self.amount,
            },
            ActionKind::DepositForYield => Action::DepositForYield {
                lego_id: self.lego_id,
                asset: self.asset,
                vault: self.target,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::WithdrawFromYield => Action::WithdrawFromYield {
                lego_id: self.lego_id,
                vault_token: self.asset,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::RebalanceYieldPosition => Action::RebalanceYieldPosition {
                from_lego_id: self.lego_id,
                from_vault_token: self.asset,
                to_lego_id: self.to_lego_id,
                to_vault: self.target,
                underlying: self.asset2,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::Swap => Action::Swap {
                steps: self.swap_steps.clone(),
            },
            ActionKind::MintOrRedeemAsset => Action::MintOrRedeemAsset {
                lego_id: self.lego_id,
                token_in: self.asset,
                token_out: self.asset2,
                amount_in: self.amount,
                min_amount_out: self.min_out1,
                extra_data: self.extra_data,
            },
            ActionKind::ConfirmMintOrRedeemAsset => Action::ConfirmMintOrRedeemAsset {
                lego_id: self.lego_id,
                token_in: self.asset,
                token_out: self.asset2,
                extra_data: self.extra_data,
            },
            ActionKind::AddCollateral => Action::AddCollateral {
                lego_id: self.lego_id,
                asset: self.asset,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::RemoveCollateral => Action::RemoveCollateral {
                lego_id: self.lego_id,
                asset: self.asset,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::BorrowAsset => Action::BorrowAsset {
                lego_id: self.lego_id,
                asset: self.asset,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::RepayDebt => Action::RepayDebt {
                lego_id: self.lego_id,
                asset: self.asset,
                amount: self.amount,
                extra_data: self.extra_data,
            },
            ActionKind::ClaimRewards => Action::ClaimRewards {
                lego_id: self.lego_id,
                reward_token: self.asset,
                reward_amount: self.amount,
                proofs: self.aux_data.clone(),
            },
            ActionKind::AddLiquidity => Action::AddLiquidity {
                lego_id: self.lego_id,
                pool: self.target,
                token_a: self.asset,
                token_b: self.asset2,
                amount_a: self.amount,
                amount_b: self.amount2,
                min_amount_a: self.min_out1,
                min_amount_b: self.min_out2,
                min_lp_amount: self.extra_val,
            },
            ActionKind::RemoveLiquidity => Action::RemoveLiquidity {
                lego_id: self.lego_id,
                pool: self.target,
                token_a: self.asset,
                token_b: self.asset2,
                lp_token: self.extra_addr,
                lp_amount: self.amount,
                min_amount_a: self.min_out1,
                min_amount_b: self.min_out2,
            },
            ActionKind::AddLiquidityConcentrated => Action::AddLiquidityConcentrated {
                lego_id: self.lego_id,
                nft_addr: self.extra_addr,
                nft_token_id: self.extra_val,
                pool: self.target,
                token_a: self.asset,
                token_b: self.asset2,
                amount_a: self.amount,
                amount_b: self.amount2,
                tick_lower: self.tick_lower,
                tick_upper: self.tick_upper,
                min_amount_a: self.min_out1,
                min_amount_b: self.min_out2,
            },
            ActionKind::RemoveLiquidityConcentrated => Action::RemoveLiquidityConcentrated {
                lego_id: self.lego_id,
                nft_addr: self.extra_addr,
                nft_token_id: self.extra_val,
                pool: self.target,
                token_a: self.asset,
                token_b: self.asset2,
                liquidity: self.amount,
                min_amount_a: self.min_out1,
                min_amount_b: self.min_out2,
            },
        }
    }
}

/// Kind-specific view of an [`ActionInstruction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Transfer {
        asset: Address,
        recipient: Address,
        amount: Amount,
    },
    DepositForYield {
        lego_id: u16,
        asset: Address,
        vault: Address,
        amount: Amount,
        extra_data: B256,
    },
    WithdrawFromYield {
        lego_id: u16,
        vault_token: Address,
        amount: Amount,
        extra_data: B256,
    },
    RebalanceYieldPosition {
        from_lego_id: u16,
        from_vault_token: Address,
        to_lego_id: u16,
        to_vault: Address,
        /// Asset released by the withdrawal and re-deposited.
        underlying: Address,
        amount: Amount,
        extra_data: B256,
    },
    Swap {
        steps: Vec<SwapStep>,
    },
    MintOrRedeemAsset {
        lego_id: u16,
        token_in: Address,
        token_out: Address,
        amount_in: Amount,
        min_amount_out: U256,
        extra_data: B256,
    },
    ConfirmMintOrRedeemAsset {
        lego_id: u16,
        token_in: Address,
        token_out: Address,
        extra_data: B256,
    },
    AddCollateral {
        lego_id: u16,
        asset: Address,
        amount: Amount,
        extra_data: B256,
    },
    RemoveCollateral {
        lego_id: u16,
        asset: Address,
        amount: Amount,
        extra_data: B256,
    },
    BorrowAsset {
        lego_id: u16,
        asset: Address,
        amount: Amount,
        extra_data: B256,
    },
    RepayDebt {
        lego_id: u16,
        asset: Address,
        amount: Amount,
        extra_data: B256,
    },
    ClaimRewards {
        lego_id: u16,
        reward_token: Address,
        reward_amount: Amount,
        proofs: Vec<u8>,
    },
    AddLiquidity {
        lego_id: u16,
        pool: Address,
        token_a: Address,
        token_b: Address,
        amount_a: Amount,
        amount_b: Amount,
        min_amount_a: U256,
        min_amount_b: U256,
        min_lp_amount: U256,
    },
    RemoveLiquidity {
        lego_id: u16,
        pool: Address,
        token_a: Address,
        token_b: Address,
        lp_token: Address,
        lp_amount: Amount,
        min_amount_a: U256,
        min_amount_b: U256,
    },
    AddLiquidityConcentrated {
        lego_id: u16,
        nft_addr: Address,
        nft_token_id: U256,
        pool: Address,
        token_a: Address,
        token_b: Address,
        amount_a: Amount,
        amount_b: Amount,
        tick_lower: i32,
        tick_upper: i32,
        min_amount_a: U256,
        min_amount_b: U256,
    },
    RemoveLiquidityConcentrated {
        lego_id: u16,
        nft_addr: Address,
        nft_token_id: U256,
        pool: Address,
        token_a: Address,
        token_b: Address,
        liquidity: Amount,
        min_amount_a: U256,
        min_amount_b: U256,
    },
}

impl Action {
    /// Assets the action touches, for allow-list checks.
    pub fn assets(&self) -> Vec<Address> {
        let mut out = match self {
            Action::Transfer { asset, .. }
            | Action::DepositForYield { asset, .. }
            | Action::AddCollateral { asset, .. }
            | Action::RemoveCollateral { asset, .. }
            | Action::BorrowAsset { asset, .. }
            | Action::RepayDebt { asset, .. } => alloc::vec![*asset],
            Action::WithdrawFromYield { vault_token, .. } => alloc::vec![*vault_token],
            Action::RebalanceYieldPosition { from_vault_token, underlying, .. } => {
                alloc::vec![*from_vault_token, *underlying]
            }
            Action::Swap { steps } => steps
                .iter()
                .flat_map(|step| step.token_path.iter().copied())
                .collect(),
            Action::MintOrRedeemAsset { token_in, token_out, .. }
            | Action::ConfirmMintOrRedeemAsset { token_in, token_out, .. } => {
                alloc::vec![*token_in, *token_out]
            }
            Action::ClaimRewards { reward_token, .. } => alloc::vec![*reward_token],
            Action::AddLiquidity { token_a, token_b, .. }
            | Action::RemoveLiquidity { token_a, token_b, .. }
            | Action::AddLiquidityConcentrated { token_a, token_b, .. }
            | Action::RemoveLiquidityConcentrated { token_a, token_b, .. } => {
                alloc::vec![*token_a, *token_b]
            }
        };
        out.retain(|a| *a != Address::ZERO);
        out.sort();
        out.dedup();
        out
    }

    /// Legos the action calls into. Transfers use none.
    pub fn legos(&self) -> Vec<u16> {
        let mut out = match self {
            Action::Transfer { .. } => Vec::new(),
            Action::RebalanceYieldPosition { from_lego_id, to_lego_id, .. } => {
                alloc::vec![*from_lego_id, *to_lego_id]
            }
            Action::Swap { steps } => steps.iter().map(|s| s.lego_id).collect(),
            Action::DepositForYield { lego_id, .. }
            | Action::WithdrawFromYield { lego_id, .. }
            | Action::MintOrRedeemAsset { lego_id, .. }
            | Action::ConfirmMintOrRedeemAsset { lego_id, .. }
            | Action::AddCollateral { lego_id, .. }
            | Action::RemoveCollateral { lego_id, .. }
            | Action::BorrowAsset { lego_id, .. }
            | Action::RepayDebt { lego_id, .. }
            | Action::ClaimRewards { lego_id, .. }
            | Action::AddLiquidity { lego_id, .. }
            | Action::RemoveLiquidity { lego_id, .. }
            | Action::AddLiquidityConcentrated { lego_id, .. }
            | Action::RemoveLiquidityConcentrated { lego_id, .. } => alloc::vec![*lego_id],
        };
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_bytes_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::try_from(kind as u8), Ok(kind));
        }
        assert!(ActionKind::try_from(0xEE).is_err());
    }

    #[test]
    fn swap_primary_amount_is_first_step_input() {
        let mut ix = ActionInstruction::new(ActionKind::Swap);
        ix.swap_steps = alloc::vec![SwapStep::default(), SwapStep::default()];
        ix.set_primary_amount(U256::from(77u64));
        assert_eq!(ix.swap_steps[0].amount_in, Amount::from(77));
        assert_eq!(ix.swap_steps[1].amount_in, Amount::default());
        assert_eq!(ix.amount, Amount::default());
    }

    #[test]
    fn rebalance_view_uses_dedicated_destination_lego() {
        let mut ix = ActionInstruction::new(ActionKind::RebalanceYieldPosition);
        ix.lego_id = 1;
        ix.to_lego_id = 4;
        ix.amount2 = Amount::from(9);
        let action = ix.view();
        assert_eq!(action.legos(), alloc::vec![1, 4]);
    }

    #[test]
    fn entire_balance_word_is_max() {
        assert_eq!(Amount::from_word(U256::MAX), Amount::EntireBalance);
        assert_eq!(Amount::EntireBalance.to_word(), U256::MAX);
        assert_eq!(Amount::from_word(U256::from(5u64)), Amount::from(5));
    }
}
