//! Errors raised by the execution sandbox.
//!
//! [`ContractError`] wraps every [`ProtocolError`] transparently, so a
//! failure from the accounting core (a vault pull refused, a ledger out of
//! balance) surfaces unchanged through an action batch. Authorization
//! failures use [`ProtocolError::Unauthorized`] in both crates.

use canopy_protocol::{Amount, Bps, ErrorKind, ProtocolError};
use thiserror::Error;

use crate::action::ActionId;
use crate::strategy::StrategyId;

/// Failures of the action registry, strategy storage, executor, strategy
/// and NAV reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// A failure from the accounting core.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `add_new_contract` for an id that is already registered.
    #[error("entry already exists: {0}")]
    EntryAlreadyExistsError(ActionId),

    /// The action id is not registered.
    #[error("entry does not exist: {0}")]
    EntryNonExistentError(ActionId),

    /// Approve or cancel without a pending change.
    #[error("entry not in change: {0}")]
    EntryNotInChangeError(ActionId),

    /// Revert attempted while a change is pending.
    #[error("entry has a pending change: {0}")]
    EntryInChangeError(ActionId),

    /// Revert without a previous address.
    #[error("no previous address for {0}")]
    EmptyPrevAddrError(ActionId),

    /// Strategy, action or asset already stored or whitelisted.
    #[error("already exists: {0}")]
    AlreadyExist(String),

    /// Strategy, action or asset not stored or not whitelisted.
    #[error("does not exist: {0}")]
    DoesNotExist(String),

    /// Action ids and calldatas differ in length.
    #[error("array length mismatch: {ids} action ids, {calldatas} calldatas")]
    ArrayLengthMismatch {
        /// Number of action ids.
        ids: usize,
        /// Number of calldatas.
        calldatas: usize,
    },

    /// The action id is not registered in the action registry.
    #[error("action id not found: {0}")]
    ActionIdNotFound(ActionId),

    /// The action id is not on the strategy's whitelist.
    #[error("action not whitelisted: {0}")]
    ActionNotWhitelisted(ActionId),

    /// The strategy is paused or was never stored.
    #[error("strategy not active: {0}")]
    StrategyNotActive(StrategyId),

    /// Implied NAV is too far from recorded NAV.
    #[error("deviation exceeded: {} bps over a bound of {bound} bps", fmt_deviation(.deviation))]
    DeviationExceeded {
        /// Measured deviation; `None` when recorded NAV is zero.
        deviation: Option<Amount>,
        /// Configured bound.
        bound: Bps,
    },

    /// A strategy call failed.
    #[error("failed: {0}")]
    Failed(String),

    /// Calldata could not be decoded for the target action.
    #[error("invalid calldata: {0}")]
    InvalidCalldata(String),
}

impl ContractError {
    /// Classifies this error according to who can resolve it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Protocol(e) => e.kind(),
            ContractError::EntryAlreadyExistsError(_)
            | ContractError::EntryNonExistentError(_)
            | ContractError::EntryNotInChangeError(_)
            | ContractError::EntryInChangeError(_)
            | ContractError::EmptyPrevAddrError(_)
            | ContractError::AlreadyExist(_)
            | ContractError::DoesNotExist(_) => ErrorKind::StateConflict,
            ContractError::ArrayLengthMismatch { .. } | ContractError::InvalidCalldata(_) => {
                ErrorKind::Validation
            }
            ContractError::DeviationExceeded { .. } => ErrorKind::SafetyGuard,
            ContractError::ActionIdNotFound(_)
            | ContractError::ActionNotWhitelisted(_)
            | ContractError::StrategyNotActive(_)
            | ContractError::Failed(_) => ErrorKind::Execution,
        }
    }
}

fn fmt_deviation(deviation: &Option<Amount>) -> String {
    match deviation {
        Some(bps) => bps.to_string(),
        None => "unbounded".to_string(),
    }
}

/// Shorthand used throughout the crate.
pub type ContractResult<T> = Result<T, ContractError>;
