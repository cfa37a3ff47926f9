use std::str::FromStr;

use agent_wallet_types::{ActionInstruction, ActionKind, Amount, SigningDomain, SwapStep};
use alloy_primitives::{Address, B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// JSON names of the action kinds.
const KIND_NAMES: [(ActionKind, &str); 16] = [
    (ActionKind::Transfer, "transfer"),
    (ActionKind::DepositForYield, "depositForYield"),
    (ActionKind::WithdrawFromYield, "withdrawFromYield"),
    (ActionKind::RebalanceYieldPosition, "rebalanceYieldPosition"),
    (ActionKind::Swap, "swap"),
    (ActionKind::MintOrRedeemAsset, "mintOrRedeemAsset"),
    (ActionKind::ConfirmMintOrRedeemAsset, "confirmMintOrRedeemAsset"),
    (ActionKind::AddCollateral, "addCollateral"),
    (ActionKind::RemoveCollateral, "removeCollateral"),
    (ActionKind::BorrowAsset, "borrowAsset"),
    (ActionKind::RepayDebt, "repayDebt"),
    (ActionKind::ClaimRewards, "claimRewards"),
    (ActionKind::AddLiquidity, "addLiquidity"),
    (ActionKind::RemoveLiquidity, "removeLiquidity"),
    (ActionKind::AddLiquidityConcentrated, "addLiquidityConcentrated"),
    (ActionKind::RemoveLiquidityConcentrated, "removeLiquidityConcentrated"),
];

pub fn parse_kind(name: &str) -> Result<ActionKind> {
    KIND_NAMES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(kind, _)| *kind)
        .ok_or_else(|| anyhow!("unknown action kind `{name}`"))
}

pub fn kind_name(kind: ActionKind) -> &'static str {
    KIND_NAMES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

/// `"max"` selects the wallet's entire balance at execution time; anything else is a
/// decimal or `0x` hex amount. Missing means zero.
pub fn parse_amount(raw: Option<&str>) -> Result<Amount> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Amount::Exact(U256::ZERO)),
        Some(s) if s.eq_ignore_ascii_case("max") => Ok(Amount::EntireBalance),
        Some(s) => {
            let value = U256::from_str(s).with_context(|| format!("invalid amount `{s}`"))?;
            Ok(Amount::Exact(value))
        }
    }
}

/// A batch (or single action) to be signed, as read from a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub chain_id: u64,
    /// Wallet contract the signature is bound to.
    pub wallet: Address,
    pub nonce: U256,
    /// Unix timestamp after which the signature is void.
    pub expiration: u64,
    pub instructions: Vec<InstructionSpec>,
}

impl BatchRequest {
    pub fn domain(&self) -> SigningDomain {
        SigningDomain {
            chain_id: self.chain_id,
            wallet: self.wallet,
        }
    }

    pub fn to_instructions(&self) -> Result<Vec<ActionInstruction>> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.to_instruction().with_context(|| format!("instruction {i}")))
            .collect()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstructionSpec {
    pub kind: String,
    pub use_prev_amount_out: bool,
    pub lego_id: u16,
    pub asset: Address,
    pub target: Address,
    pub amount: Option<String>,
    pub asset2: Address,
    pub amount2: Option<String>,
    pub min_out1: U256,
    pub min_out2: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub extra_addr: Address,
    pub extra_val: U256,
    pub extra_data: B256,
    /// Hex-encoded opaque bytes (reward proofs).
    pub aux_data: Option<String>,
    pub to_lego_id: u16,
    pub swap_steps: Vec<SwapStepSpec>,
}

impl InstructionSpec {
    pub fn to_instruction(&self) -> Result<ActionInstruction> {
        let kind = parse_kind(&self.kind)?;
        if kind == ActionKind::Swap && self.swap_steps.is_empty() {
            bail!("swap needs at least one step");
        }

        let mut ix = ActionInstruction::new(kind);
        ix.use_prev_amount_out = self.use_prev_amount_out;
        ix.lego_id = self.lego_id;
        ix.asset = self.asset;
        ix.target = self.target;
        ix.amount = parse_amount(self.amount.as_deref())?;
        ix.asset2 = self.asset2;
        ix.amount2 = parse_amount(self.amount2.as_deref())?;
        ix.min_out1 = self.min_out1;
        ix.min_out2 = self.min_out2;
        ix.tick_lower = self.tick_lower;
        ix.tick_upper = self.tick_upper;
        ix.extra_addr = self.extra_addr;
        ix.extra_val = self.extra_val;
        ix.extra_data = self.extra_data;
        if let Some(aux) = &self.aux_data {
            ix.aux_data = hex::decode(aux.trim_start_matches("0x")).context("auxData is not hex")?;
        }
        ix.to_lego_id = self.to_lego_id;
        ix.swap_steps = self
            .swap_steps
            .iter()
            .map(SwapStepSpec::to_step)
            .collect::<Result<_>>()?;
        Ok(ix)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwapStepSpec {
    pub lego_id: u16,
    pub amount_in: Option<String>,
    pub min_amount_out: U256,
    pub token_path: Vec<Address>,
    pub pool_path: Vec<Address>,
}

impl SwapStepSpec {
    pub fn to_step(&self) -> Result<SwapStep> {
        if self.token_path.len() < 2 {
            bail!("swap step needs a token path of at least two tokens");
        }
        Ok(SwapStep {
            lego_id: self.lego_id,
            amount_in: parse_amount(self.amount_in.as_deref())?,
            min_amount_out: self.min_amount_out,
            token_path: self.token_path.clone(),
            pool_path: self.pool_path.clone(),
        })
    }
}
