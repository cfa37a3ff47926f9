//! Rate limiting of outbound transfer recipients.
//!
//! Scoped per recipient rather than per caller: a payee's counters move no matter who
//! initiated the transfer.

use stylus_sdk::alloy_primitives::{Address, U256};
use tracing::debug;

use agent_wallet_types::{GlobalPayeeSettings, Lifecycle, PayeeData, PayeeSettings};

use crate::{
    errors::{LimitError, PermissionError, Result},
    permissions::merge_limits,
};

/// Outcome of a recipient check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayeeDecision {
    /// Whitelisted recipient; nothing is metered.
    Whitelisted,
    /// The wallet owner; allowed by `can_pay_owner`, nothing is metered.
    Owner,
    /// Registered payee; the caller stores the returned record.
    Metered(PayeeData),
}

/// One outbound transfer being checked.
#[derive(Clone, Copy, Debug)]
pub struct Payment {
    pub recipient: Address,
    pub asset: Address,
    pub amount: U256,
    pub usd_value: U256,
}

/// Recipient-side state the limiter reads.
#[derive(Clone, Copy, Debug)]
pub struct PayeeContext<'a> {
    pub owner: Address,
    pub is_whitelisted: bool,
    pub settings: Option<&'a PayeeSettings>,
    pub global: &'a GlobalPayeeSettings,
    pub data: &'a PayeeData,
}

/// Check a transfer against the recipient's payee limits and return the updated record.
pub fn check_payee(payment: &Payment, ctx: &PayeeContext<'_>, block: u64) -> Result<PayeeDecision> {
    if ctx.is_whitelisted {
        return Ok(PayeeDecision::Whitelisted);
    }
    if payment.recipient == ctx.owner {
        if !ctx.global.can_pay_owner {
            return Err(PermissionError::OwnerNotPayable.into());
        }
        return Ok(PayeeDecision::Owner);
    }

    let settings = ctx.settings.ok_or(PermissionError::NotPayee)?;
    if settings.lifecycle(block) != Lifecycle::Active {
        return Err(PermissionError::PayeeNotActive.into());
    }
    let is_primary = payment.asset == settings.primary_asset;
    if settings.only_primary_asset && !is_primary {
        return Err(PermissionError::AssetNotPrimary.into());
    }

    let data = record_payment(payment, settings, ctx.global, ctx.data, is_primary, block)
        .inspect_err(|err| {
            debug!(recipient = %payment.recipient, %err, "payee limit rejected transfer");
        })?;
    Ok(PayeeDecision::Metered(data))
}

fn record_payment(
    payment: &Payment,
    settings: &PayeeSettings,
    global: &GlobalPayeeSettings,
    data: &PayeeData,
    is_primary: bool,
    block: u64,
) -> core::result::Result<PayeeData, LimitError> {
    let Payment { amount, usd_value, .. } = *payment;

    if (settings.fail_on_zero_price || global.fail_on_zero_price) && usd_value.is_zero() {
        return Err(LimitError::ZeroPriceRejected);
    }

    let cooldown = settings.tx_cooldown_blocks.max(global.tx_cooldown_blocks);
    if cooldown > 0
        && data.last_tx_block != 0
        && block.saturating_sub(data.last_tx_block) < cooldown
    {
        return Err(LimitError::CooldownActive);
    }

    let period_length = if settings.period_length == 0 {
        global.default_period_length
    } else {
        settings.period_length
    };
    let mut next = *data;
    if block >= data.period_start_block.saturating_add(period_length) {
        next.num_txs_in_period = 0;
        next.total_units_in_period = U256::ZERO;
        next.total_usd_value_in_period = U256::ZERO;
        next.period_start_block = block;
    }

    let max_txs = match (settings.max_num_txs_per_period, global.max_num_txs_per_period) {
        (0, g) => g,
        (s, 0) => s,
        (s, g) => s.min(g),
    };
    if max_txs > 0 && next.num_txs_in_period >= max_txs {
        return Err(LimitError::MaxTxsPerPeriodReached);
    }

    // Units only make sense in the payee's primary asset.
    let units = if is_primary { amount } else { U256::ZERO };
    let units_in_period = next.total_units_in_period.saturating_add(units);
    let units_total = next.total_units.saturating_add(units);
    if is_primary {
        let caps = &settings.unit_limits;
        if !caps.per_tx_cap.is_zero() && units > caps.per_tx_cap {
            return Err(LimitError::UnitPerTxCapExceeded);
        }
        if !caps.per_period_cap.is_zero() && units_in_period > caps.per_period_cap {
            return Err(LimitError::UnitPerPeriodCapExceeded);
        }
        if !caps.lifetime_cap.is_zero() && units_total > caps.lifetime_cap {
            return Err(LimitError::UnitLifetimeCapExceeded);
        }
    }

    let caps = merge_limits(&settings.usd_limits, &global.usd_limits);
    let usd_in_period = next.total_usd_value_in_period.saturating_add(usd_value);
    let usd_total = next.total_usd_value.saturating_add(usd_value);
    if !caps.per_tx_cap.is_zero() && usd_value > caps.per_tx_cap {
        return Err(LimitError::UsdPerTxCapExceeded);
    }
    if !caps.per_period_cap.is_zero() && usd_in_period > caps.per_period_cap {
        return Err(LimitError::UsdPerPeriodCapExceeded);
    }
    if !caps.lifetime_cap.is_zero() && usd_total > caps.lifetime_cap {
        return Err(LimitError::UsdLifetimeCapExceeded);
    }

    next.num_txs_in_period = next.num_txs_in_period.saturating_add(1);
    next.total_units_in_period = units_in_period;
    next.total_usd_value_in_period = usd_in_period;
    next.total_num_txs = next.total_num_txs.saturating_add(1);
    next.total_units = units_total;
    next.total_usd_value = usd_total;
    next.last_tx_block = block;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WalletError;
    use agent_wallet_types::Limits;
    use stylus_sdk::alloy_primitives::address;

    const OWNER: Address = address!("00000000000000000000000000000000000000aa");
    const BOB: Address = address!("00000000000000000000000000000000000000b0");
    const USDC: Address = address!("0000000000000000000000000000000000000c01");
    const WETH: Address = address!("0000000000000000000000000000000000000c02");

    fn pay(recipient: Address, asset: Address, amount: u64, usd: u64) -> Payment {
        Payment {
            recipient,
            asset,
            amount: U256::from(amount),
            usd_value: U256::from(usd),
        }
    }

    fn bob() -> PayeeSettings {
        PayeeSettings {
            start_block: 0,
            expiry_block: 1_000,
            period_length: 100,
            primary_asset: USDC,
            unit_limits: Limits {
                per_tx_cap: U256::from(50u64),
                per_period_cap: U256::from(80u64),
                lifetime_cap: U256::ZERO,
            },
            ..Default::default()
        }
    }

    fn check(
        payment: Payment,
        settings: Option<&PayeeSettings>,
        global: &GlobalPayeeSettings,
        data: &PayeeData,
        block: u64,
    ) -> Result<PayeeDecision> {
        let ctx = PayeeContext {
            owner: OWNER,
            is_whitelisted: false,
            settings,
            global,
            data,
        };
        check_payee(&payment, &ctx, block)
    }

    fn metered(decision: PayeeDecision) -> PayeeData {
        match decision {
            PayeeDecision::Metered(data) => data,
            other => panic!("expected metered decision, got {other:?}"),
        }
    }

    #[test]
    fn whitelisted_recipient_is_never_metered() {
        let data = PayeeData::default();
        let global = GlobalPayeeSettings {
            can_pay_owner: false,
            ..Default::default()
        };
        let ctx = PayeeContext {
            owner: OWNER,
            is_whitelisted: true,
            settings: None,
            global: &global,
            data: &data,
        };
        let decision = check_payee(&pay(BOB, WETH, 1_000_000, 0), &ctx, 5).unwrap();
        assert_eq!(decision, PayeeDecision::Whitelisted);
    }

    #[test]
    fn owner_payments_follow_global_flag() {
        let data = PayeeData::default();
        let mut global = GlobalPayeeSettings::default();
        assert_eq!(
            check(pay(OWNER, USDC, 1, 1), None, &global, &data, 5),
            Ok(PayeeDecision::Owner)
        );
        global.can_pay_owner = false;
        assert_eq!(
            check(pay(OWNER, USDC, 1, 1), None, &global, &data, 5),
            Err(WalletError::Permission(PermissionError::OwnerNotPayable))
        );
    }

    #[test]
    fn unknown_or_inactive_payee_is_rejected() {
        let data = PayeeData::default();
        let global = GlobalPayeeSettings::default();
        assert_eq!(
            check(pay(BOB, USDC, 1, 1), None, &global, &data, 5),
            Err(WalletError::Permission(PermissionError::NotPayee))
        );
        let settings = bob();
        assert_eq!(
            check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &data, 1_000),
            Err(WalletError::Permission(PermissionError::PayeeNotActive))
        );
    }

    #[test]
    fn unit_caps_apply_to_primary_asset_only() {
        let settings = bob();
        let global = GlobalPayeeSettings::default();
        let data = PayeeData::default();

        assert_eq!(
            check(pay(BOB, USDC, 51, 51), Some(&settings), &global, &data, 5),
            Err(WalletError::Limit(LimitError::UnitPerTxCapExceeded))
        );
        let data = metered(check(pay(BOB, USDC, 50, 50), Some(&settings), &global, &data, 5).unwrap());
        assert_eq!(
            check(pay(BOB, USDC, 40, 40), Some(&settings), &global, &data, 6),
            Err(WalletError::Limit(LimitError::UnitPerPeriodCapExceeded))
        );

        // Same raw amount in another asset is not unit-limited.
        let data = metered(check(pay(BOB, WETH, 5_000, 40), Some(&settings), &global, &data, 6).unwrap());
        assert_eq!(data.total_units, U256::from(50u64));
        assert_eq!(data.total_usd_value, U256::from(90u64));
        assert_eq!(data.num_txs_in_period, 2);
    }

    #[test]
    fn only_primary_asset() {
        let settings = PayeeSettings {
            only_primary_asset: true,
            ..bob()
        };
        let global = GlobalPayeeSettings::default();
        assert_eq!(
            check(pay(BOB, WETH, 1, 1), Some(&settings), &global, &PayeeData::default(), 5),
            Err(WalletError::Permission(PermissionError::AssetNotPrimary))
        );
    }

    #[test]
    fn usd_caps_merge_with_global() {
        let settings = bob();
        let global = GlobalPayeeSettings {
            usd_limits: Limits {
                per_tx_cap: U256::from(30u64),
                ..Limits::UNLIMITED
            },
            ..Default::default()
        };
        assert_eq!(
            check(pay(BOB, USDC, 10, 31), Some(&settings), &global, &PayeeData::default(), 5),
            Err(WalletError::Limit(LimitError::UsdPerTxCapExceeded))
        );
    }

    #[test]
    fn cooldown_uses_longer_setting_and_skips_first_payment() {
        let settings = PayeeSettings {
            tx_cooldown_blocks: 3,
            ..bob()
        };
        let global = GlobalPayeeSettings {
            tx_cooldown_blocks: 10,
            ..Default::default()
        };
        let data = metered(
            check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &PayeeData::default(), 2)
                .unwrap(),
        );
        assert_eq!(
            check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &data, 11),
            Err(WalletError::Limit(LimitError::CooldownActive))
        );
        assert!(check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &data, 12).is_ok());
    }

    #[test]
    fn zero_price_and_tx_count() {
        let settings = PayeeSettings {
            max_num_txs_per_period: 1,
            ..bob()
        };
        let global = GlobalPayeeSettings {
            fail_on_zero_price: true,
            ..Default::default()
        };
        assert_eq!(
            check(pay(BOB, USDC, 1, 0), Some(&settings), &global, &PayeeData::default(), 5),
            Err(WalletError::Limit(LimitError::ZeroPriceRejected))
        );
        let data = metered(
            check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &PayeeData::default(), 5)
                .unwrap(),
        );
        assert_eq!(
            check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &data, 50),
            Err(WalletError::Limit(LimitError::MaxTxsPerPeriodReached))
        );
        // Next period.
        assert!(check(pay(BOB, USDC, 1, 1), Some(&settings), &global, &data, 105).is_ok());
    }
}
