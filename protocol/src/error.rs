//! Error types for the accounting core.
//!
//! Every fallible operation in this crate returns a [`ProtocolError`]. A
//! returned error always means the call had no effect: ledgers are either
//! validated before they are touched or restored from a checkpoint.

use thiserror::Error;

use crate::types::{Address, Amount, Bps};

/// Coarse classification of failures, used by callers that want to decide
/// who has to act (the caller, the owner, or nobody until time passes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller lacks the owner, executor or minter capability.
    Authorization,
    /// The operation is invalid for the current state-machine state.
    StateConflict,
    /// Malformed input.
    Validation,
    /// Elapsed-time precondition or handle validity.
    Timing,
    /// Settlement cannot be funded.
    Resource,
    /// A circuit breaker refused the operation.
    SafetyGuard,
    /// The component is administratively halted.
    Availability,
    /// Action dispatch or strategy execution failed.
    Execution,
    /// Checked arithmetic failed.
    Arithmetic,
}

/// Errors raised by the ledgers, the custody collaborators, accounting
/// and the redemption queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The caller does not hold the capability this operation needs.
    #[error("unauthorized: {0}")]
    Unauthorized(Address),

    /// A vault-share transfer touched a blacklisted account.
    #[error("account blacklisted: {0}")]
    AccountBlacklisted(Address),

    /// The zero address (or an otherwise unusable address) was supplied.
    #[error("invalid address: {0}")]
    InvalidAddress(Address),

    /// A fee or bound above 100% was supplied.
    #[error("invalid fee: {0} bps exceeds 10000")]
    InvalidFee(Bps),

    /// Redemption request below the configured minimum.
    #[error("minimum not met: requested {requested}, minimum {minimum}")]
    MinimumNotMet {
        /// Shares the caller asked to redeem.
        requested: Amount,
        /// Current minimum.
        minimum: Amount,
    },

    /// The deposit would push vault-share assets past the cap.
    #[error("deposit cap exceeded: total after deposit {total}, cap {cap}")]
    DepositCapExceeded {
        /// Total assets the vault share would hold.
        total: Amount,
        /// Configured cap.
        cap: Amount,
    },

    /// The deposit is too small to mint a single share.
    #[error("no shares minted")]
    NoSharesMinted,

    /// Assets with more than 18 decimals are not supported.
    #[error("unsupported decimals: {0}")]
    UnsupportedDecimals(u8),

    /// The asset is not on the custody vault's allow-list.
    #[error("not allowable asset: {0}")]
    NotAllowableAsset(Address),

    /// The deposit converter could not turn the asset into the underlying.
    #[error("conversion to underlying failed for {0}")]
    ConversionToUnderlyingFailed(Address),

    /// No rate source is registered for the asset.
    #[error("rate provider not found for {0}")]
    RateProviderNotFound(Address),

    /// The caller is not an active strategy allowed to pull this asset.
    #[error("invalid strategy: {0}")]
    InvalidStrategy(Address),

    /// No redemption request exists at this index.
    #[error("redemption not found: account {account}, index {index}")]
    RedemptionNotFound {
        /// Requesting account.
        account: Address,
        /// Handle that was looked up.
        index: usize,
    },

    /// The waiting period for this request has not elapsed yet.
    #[error("in waiting period: {remaining_secs}s remaining")]
    InWaitingPeriod {
        /// Seconds until the request becomes eligible.
        remaining_secs: i64,
    },

    /// The custody vault cannot fund the payout.
    #[error("insufficient funds in vault: required {required}, available {available}")]
    InsufficientFundsInVault {
        /// Amount that would have been paid.
        required: Amount,
        /// Underlying held by the custody vault.
        available: Amount,
    },

    /// The component is paused.
    #[error("enforced pause")]
    EnforcedPause,

    /// A generic refusal for an invalid registry update.
    #[error("failed: {0}")]
    Failed(String),

    /// Debit larger than the account balance.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// Debited account.
        account: Address,
        /// Current balance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// `transfer_from` larger than the approved allowance.
    #[error("insufficient allowance: {spender} may move {allowed}, requested {requested}")]
    InsufficientAllowance {
        /// Account spending on behalf of the owner.
        spender: Address,
        /// Remaining allowance.
        allowed: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// Result does not fit in `u128`.
    #[error("math overflow")]
    MathOverflow,

    /// Division by zero in a ratio computation.
    #[error("division by zero")]
    DivisionByZero,

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProtocolError {
    /// Classifies this error according to who can resolve it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Unauthorized(_) | ProtocolError::AccountBlacklisted(_) => {
                ErrorKind::Authorization
            }
            ProtocolError::Failed(_) => ErrorKind::StateConflict,
            ProtocolError::InvalidAddress(_)
            | ProtocolError::InvalidFee(_)
            | ProtocolError::MinimumNotMet { .. }
            | ProtocolError::DepositCapExceeded { .. }
            | ProtocolError::NoSharesMinted
            | ProtocolError::UnsupportedDecimals(_)
            | ProtocolError::InvalidConfig(_) => ErrorKind::Validation,
            ProtocolError::RedemptionNotFound { .. } | ProtocolError::InWaitingPeriod { .. } => {
                ErrorKind::Timing
            }
            ProtocolError::InsufficientFundsInVault { .. }
            | ProtocolError::InsufficientBalance { .. }
            | ProtocolError::InsufficientAllowance { .. } => ErrorKind::Resource,
            ProtocolError::EnforcedPause => ErrorKind::Availability,
            ProtocolError::NotAllowableAsset(_)
            | ProtocolError::ConversionToUnderlyingFailed(_)
            | ProtocolError::RateProviderNotFound(_)
            | ProtocolError::InvalidStrategy(_) => ErrorKind::Execution,
            ProtocolError::MathOverflow | ProtocolError::DivisionByZero => ErrorKind::Arithmetic,
        }
    }
}

/// Shorthand used throughout the crate.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
