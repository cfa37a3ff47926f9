//! Error taxonomy. Every leaf renders a short stable reason string (its `Display`), which is
//! what reverts carry so off-chain tooling can branch on the cause.

use alloc::string::{String, ToString};

use alloy_sol_types::sol;
use stylus_sdk::stylus_proc::SolidityError;

pub use agent_wallet_types::{DecodeError, EncodeError, HostError};

/// Errors during request authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("InvalidSignatureLength")]
    InvalidSignatureLength,
    #[error("InvalidSValueZero")]
    InvalidSValueZero,
    #[error("InvalidSValueMalleable")]
    InvalidSValueMalleable,
    #[error("InvalidVParameter")]
    InvalidVParameter,
    #[error("SignatureExpired")]
    SignatureExpired,
    #[error("InvalidNonce")]
    InvalidNonce,
    #[error("InvalidSigner")]
    InvalidSigner,
}

/// Errors from role and permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("OwnerCannotManage")]
    OwnerCannotManage,
    #[error("ManagerNotActive")]
    ManagerNotActive,
    #[error("ActionNotPermitted")]
    ActionNotPermitted,
    #[error("LegoNotAllowed")]
    LegoNotAllowed,
    #[error("AssetNotAllowed")]
    AssetNotAllowed,
    #[error("PayeeNotAllowed")]
    PayeeNotAllowed,
    #[error("WhitelistOpNotPermitted")]
    WhitelistOpNotPermitted,
    #[error("PayeeOpNotPermitted")]
    PayeeOpNotPermitted,
    #[error("NotOwner")]
    NotOwner,
    #[error("NotOwnerOrSwitchboard")]
    NotOwnerOrSwitchboard,
    #[error("NotPayee")]
    NotPayee,
    #[error("PayeeNotActive")]
    PayeeNotActive,
    #[error("OwnerNotPayable")]
    OwnerNotPayable,
    #[error("AssetNotPrimary")]
    AssetNotPrimary,
}

/// Errors from rolling consumption limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("UsdPerTxCapExceeded")]
    UsdPerTxCapExceeded,
    #[error("UsdPerPeriodCapExceeded")]
    UsdPerPeriodCapExceeded,
    #[error("UsdLifetimeCapExceeded")]
    UsdLifetimeCapExceeded,
    #[error("UnitPerTxCapExceeded")]
    UnitPerTxCapExceeded,
    #[error("UnitPerPeriodCapExceeded")]
    UnitPerPeriodCapExceeded,
    #[error("UnitLifetimeCapExceeded")]
    UnitLifetimeCapExceeded,
    #[error("MaxTxsPerPeriodReached")]
    MaxTxsPerPeriodReached,
    #[error("CooldownActive")]
    CooldownActive,
    #[error("ZeroPriceRejected")]
    ZeroPriceRejected,
}

/// Errors from malformed requests or settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("NoInstructions")]
    NoInstructions,
    #[error("TooManyInstructions")]
    TooManyInstructions,
    #[error("InvalidActionKind")]
    InvalidActionKind,
    #[error("MalformedPayload")]
    MalformedPayload,
    #[error("PayloadTooLarge")]
    PayloadTooLarge,
    #[error("ZeroAmount")]
    ZeroAmount,
    #[error("EntireBalanceUnsupported")]
    EntireBalanceUnsupported,
    #[error("InvalidSwapPath")]
    InvalidSwapPath,
    #[error("InvalidAddress")]
    InvalidAddress,
    #[error("InvalidLimits")]
    InvalidLimits,
    #[error("InvalidPeriod")]
    InvalidPeriod,
    #[error("InvalidActivation")]
    InvalidActivation,
    #[error("ManagerAlreadyExists")]
    ManagerAlreadyExists,
    #[error("ManagerNotFound")]
    ManagerNotFound,
    #[error("PayeeAlreadyExists")]
    PayeeAlreadyExists,
    #[error("PayeeNotFound")]
    PayeeNotFound,
    #[error("AlreadyWhitelisted")]
    AlreadyWhitelisted,
    #[error("NotWhitelisted")]
    NotWhitelisted,
    #[error("PendingNotFound")]
    PendingNotFound,
    #[error("AlreadyPending")]
    AlreadyPending,
    #[error("TimelockNotElapsed")]
    TimelockNotElapsed,
    #[error("AlreadyInitialized")]
    AlreadyInitialized,
    #[error("NotInitialized")]
    NotInitialized,
}

impl From<DecodeError> for InputError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownActionKind(_) => InputError::InvalidActionKind,
            _ => InputError::MalformedPayload,
        }
    }
}

impl From<EncodeError> for InputError {
    fn from(_: EncodeError) -> Self {
        InputError::PayloadTooLarge
    }
}

/// Top-level error of every wallet operation. Any variant aborts the whole call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Permission(#[from] PermissionError),
    #[error("{0}")]
    Limit(#[from] LimitError),
    #[error("{0}")]
    Input(#[from] InputError),
    #[error("{}", host_reason(.0))]
    Action(HostError),
}

impl From<HostError> for WalletError {
    fn from(err: HostError) -> Self {
        Self::Action(err)
    }
}

impl From<DecodeError> for WalletError {
    fn from(err: DecodeError) -> Self {
        Self::Input(err.into())
    }
}

impl From<EncodeError> for WalletError {
    fn from(err: EncodeError) -> Self {
        Self::Input(err.into())
    }
}

fn host_reason(err: &HostError) -> String {
    match err {
        HostError::Reverted(reason) => reason.clone(),
        HostError::CallFailed => "CallFailed".to_string(),
        HostError::MalformedReturn => "MalformedReturn".to_string(),
        HostError::UnknownLego(_) => "UnknownLego".to_string(),
        HostError::UnencodableParams => "UnencodableParams".to_string(),
    }
}

/// Result type alias for wallet operations.
pub type Result<T> = core::result::Result<T, WalletError>;

sol! {
    error AuthenticationFailed(string reason);
    error PermissionDenied(string reason);
    error LimitExceeded(string reason);
    error InvalidInput(string reason);
    error UnderlyingActionFailed(string reason);
}

/// Solidity-facing revert of the contract entrypoint.
#[derive(SolidityError)]
pub enum WalletRevert {
    AuthenticationFailed(AuthenticationFailed),
    PermissionDenied(PermissionDenied),
    LimitExceeded(LimitExceeded),
    InvalidInput(InvalidInput),
    UnderlyingActionFailed(UnderlyingActionFailed),
}

impl From<WalletError> for WalletRevert {
    fn from(err: WalletError) -> Self {
        let reason = err.to_string();
        match err {
            WalletError::Auth(_) => Self::AuthenticationFailed(AuthenticationFailed { reason }),
            WalletError::Permission(_) => Self::PermissionDenied(PermissionDenied { reason }),
            WalletError::Limit(_) => Self::LimitExceeded(LimitExceeded { reason }),
            WalletError::Input(_) => Self::InvalidInput(InvalidInput { reason }),
            WalletError::Action(_) => {
                Self::UnderlyingActionFailed(UnderlyingActionFailed { reason })
            }
        }
    }
}
