use alloc::{format, string::String, vec::Vec};

use stylus_sdk::{
    alloy_primitives::{Address, U256},
    alloy_sol_types::SolCall,
    stylus_core::{
        calls::{context::Call, errors::Error as CallError, CallAccess},
        Host,
    },
};
use tracing::debug;

use agent_wallet_types::{ActionKind, Codec, HostError, LegoOutcome, LegoParams, WalletHost};

use crate::host::interfaces::{IERC20, ILego, ILegoBook, IPriceOracle};

/// `Error(string)` selector.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Block facts read once at the top of a call.
#[derive(Clone, Copy, Debug)]
pub struct CallContext {
    pub block_number: u64,
    pub timestamp: u64,
    pub chain_id: u64,
    pub wallet: Address,
}

/// Host that reaches tokens, the price oracle and legos through the contract's VM.
///
/// There is nothing to snapshot: a failed request reverts the transaction, which unwinds
/// every call made here.
pub struct OnchainHost<'a> {
    vm: &'a dyn Host,
    pub ctx: CallContext,
    pub price_oracle: Address,
    pub lego_book: Address,
    pub gas_cap: u64,
}

impl<'a> OnchainHost<'a> {
    pub fn new(
        vm: &'a dyn Host,
        ctx: CallContext,
        price_oracle: Address,
        lego_book: Address,
        gas_cap: u64,
    ) -> Self {
        Self {
            vm,
            ctx,
            price_oracle,
            lego_book,
            gas_cap,
        }
    }

    fn staticcall(&self, target: Address, data: &[u8]) -> Result<Vec<u8>, HostError> {
        self.vm
            .static_call(&Call::new().gas(self.gas_cap), target, data)
            .map_err(call_error)
    }

    fn call(&mut self, target: Address, data: &[u8]) -> Result<Vec<u8>, HostError> {
        self.vm.call(&Call::new(), target, data).map_err(call_error)
    }

    fn staticcall_u256(&self, target: Address, data: &[u8]) -> Result<U256, HostError> {
        let out = self.staticcall(target, data)?;
        word(&out, 0)
    }

    fn lego_addr(&self, lego_id: u16) -> Result<Address, HostError> {
        if self.lego_book == Address::ZERO {
            return Err(HostError::UnknownLego(lego_id));
        }
        let data = ILegoBook::getLegoAddrCall {
            legoId: U256::from(lego_id),
        }
        .abi_encode();
        let out = self.staticcall(self.lego_book, &data)?;
        if out.len() < 32 {
            return Err(HostError::MalformedReturn);
        }
        let addr = Address::from_slice(&out[12..32]);
        if addr == Address::ZERO {
            return Err(HostError::UnknownLego(lego_id));
        }
        Ok(addr)
    }
}

impl WalletHost for OnchainHost<'_> {
    type Snapshot = ();

    fn block_number(&self) -> u64 {
        self.ctx.block_number
    }

    fn timestamp(&self) -> u64 {
        self.ctx.timestamp
    }

    fn chain_id(&self) -> u64 {
        self.ctx.chain_id
    }

    fn wallet(&self) -> Address {
        self.ctx.wallet
    }

    fn balance_of(&self, asset: Address) -> Result<U256, HostError> {
        let data = IERC20::balanceOfCall {
            account: self.ctx.wallet,
        }
        .abi_encode();
        self.staticcall_u256(asset, &data)
    }

    fn usd_value(&self, asset: Address, amount: U256) -> Result<U256, HostError> {
        if self.price_oracle == Address::ZERO {
            return Ok(U256::ZERO);
        }
        let data = IPriceOracle::getUsdValueCall { asset, amount }.abi_encode();
        self.staticcall_u256(self.price_oracle, &data)
    }

    fn transfer(&mut self, asset: Address, recipient: Address, amount: U256) -> Result<(), HostError> {
        let data = IERC20::transferCall {
            to: recipient,
            amount,
        }
        .abi_encode();
        let out = self.call(asset, &data)?;
        // Tokens that return nothing signal success by not reverting.
        if !out.is_empty() && word(&out, 0)?.is_zero() {
            return Err(HostError::Reverted(String::from("TransferFailed")));
        }
        Ok(())
    }

    fn perform_lego_action(
        &mut self,
        lego_id: u16,
        kind: ActionKind,
        params: &LegoParams,
    ) -> Result<LegoOutcome, HostError> {
        let lego = self.lego_addr(lego_id)?;
        let params = params.to_bytes().map_err(|_| HostError::UnencodableParams)?;
        let data = ILego::performActionCall {
            kind: kind as u8,
            params: params.into(),
        }
        .abi_encode();
        let out = self.call(lego, &data)?;
        // (uint256 amountIn, uint256 amountOut, uint256 secondaryOut, uint256 usdValue)
        if out.len() < 32 * 4 {
            return Err(HostError::MalformedReturn);
        }
        let outcome = LegoOutcome {
            amount_in: word(&out, 0)?,
            amount_out: word(&out, 1)?,
            secondary_out: word(&out, 2)?,
            usd_value: word(&out, 3)?,
        };
        debug!(lego_id, %lego, ?kind, "lego call complete");
        Ok(outcome)
    }

    fn snapshot(&self) -> Self::Snapshot {}

    fn restore(&mut self, _snapshot: Self::Snapshot) {}
}

fn word(out: &[u8], index: usize) -> Result<U256, HostError> {
    let start = index * 32;
    out.get(start..start + 32)
        .map(U256::from_be_slice)
        .ok_or(HostError::MalformedReturn)
}

fn call_error(err: CallError) -> HostError {
    match err {
        CallError::Revert(data) => revert_reason(&data),
        CallError::AbiDecodingFailed(_) => HostError::MalformedReturn,
    }
}

/// Turn revert data into a reason: the `Error(string)` message when there is one, otherwise
/// the raw bytes as hex.
pub fn revert_reason(data: &[u8]) -> HostError {
    if data.is_empty() {
        return HostError::CallFailed;
    }
    if let Some(reason) = error_string(data) {
        return HostError::Reverted(reason);
    }
    HostError::Reverted(format!("0x{}", hex::encode(data)))
}

fn error_string(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let offset = usize::try_from(word(body, 0).ok()?).ok()?;
    let len_end = offset.checked_add(32)?;
    let len = usize::try_from(U256::from_be_slice(body.get(offset..len_end)?)).ok()?;
    let text = body.get(len_end..len_end.checked_add(len)?)?;
    String::from_utf8(text.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stylus_sdk::{alloy_primitives::hex, testing::*};

    const TOKEN: Address = Address::with_last_byte(0x70);
    const WALLET: Address = Address::with_last_byte(0xf0);
    const PAYEE: Address = Address::with_last_byte(0xc4);

    fn host(vm: &TestVM) -> OnchainHost<'_> {
        let ctx = CallContext {
            block_number: 1,
            timestamp: 2,
            chain_id: 42_161,
            wallet: WALLET,
        };
        OnchainHost::new(vm, ctx, Address::ZERO, Address::ZERO, 100_000)
    }

    #[test]
    fn balances_are_read_through_the_vm() {
        let vm = TestVM::default();
        let data = IERC20::balanceOfCall { account: WALLET }.abi_encode();
        vm.mock_static_call(TOKEN, data, Ok(U256::from(77u64).to_be_bytes::<32>().to_vec()));
        assert_eq!(host(&vm).balance_of(TOKEN), Ok(U256::from(77u64)));
        // No oracle configured.
        assert_eq!(host(&vm).usd_value(TOKEN, U256::from(5u64)), Ok(U256::ZERO));
    }

    #[test]
    fn token_transfer_outcomes() {
        let vm = TestVM::default();
        let call = |amount: u64| {
            IERC20::transferCall {
                to: PAYEE,
                amount: U256::from(amount),
            }
            .abi_encode()
        };
        vm.mock_call(TOKEN, call(1), Ok(Vec::new()));
        vm.mock_call(TOKEN, call(2), Ok(U256::ZERO.to_be_bytes::<32>().to_vec()));
        vm.mock_call(TOKEN, call(3), Err(vec![0xde, 0xad]));

        let mut host = host(&vm);
        assert_eq!(host.transfer(TOKEN, PAYEE, U256::from(1u64)), Ok(()));
        assert_eq!(
            host.transfer(TOKEN, PAYEE, U256::from(2u64)),
            Err(HostError::Reverted("TransferFailed".into()))
        );
        assert_eq!(
            host.transfer(TOKEN, PAYEE, U256::from(3u64)),
            Err(HostError::Reverted("0xdead".into()))
        );
    }

    #[test]
    fn error_string_reverts_are_unwrapped() {
        // Error("slippage")
        let data = hex!(
            "08c379a0"
            "0000000000000000000000000000000000000000000000000000000000000020"
            "0000000000000000000000000000000000000000000000000000000000000008"
            "736c697070616765000000000000000000000000000000000000000000000000"
        );
        assert_eq!(revert_reason(&data), HostError::Reverted("slippage".into()));
    }

    #[test]
    fn custom_errors_fall_back_to_hex() {
        assert_eq!(
            revert_reason(&[0xde, 0xad, 0xbe, 0xef]),
            HostError::Reverted("0xdeadbeef".into())
        );
        assert_eq!(revert_reason(&[]), HostError::CallFailed);
    }

    #[test]
    fn truncated_error_string_is_not_trusted() {
        let data = hex!(
            "08c379a0"
            "0000000000000000000000000000000000000000000000000000000000000020"
            "00000000000000000000000000000000000000000000000000000000000000ff"
        );
        assert_eq!(
            revert_reason(&data),
            HostError::Reverted(format!("0x{}", hex::encode(data)))
        );
    }
}
