//! # Canopy Execution Sandbox
//!
//! Controlled deployment of vault capital. The accounting core in
//! `canopy-protocol` decides what shares are worth; this crate decides what
//! the capital behind them is allowed to do.
//!
//! - **action**: executable actions, their stable ids, and the two-step
//!   registry that maps each id to its current implementation.
//! - **strategy**: capital-holding strategies, their whitelists, and the
//!   executor that runs batches of actions on them.
//! - **nav**: measuring NAV across vault and strategies and feeding the
//!   difference to the accounting ledger.
//!
//! ## Design Principles
//!
//! 1. Every hop re-checks its own caller. The executor checks its member
//!    set, the strategy checks its bound executor, and the vault checks the
//!    strategy's whitelist.
//! 2. State machines are enums, not sentinel addresses.
//! 3. A failed batch or reconciliation leaves no trace.
//! 4. Every public type is serializable (serde).

pub mod action;
pub mod error;
pub mod nav;
pub mod strategy;

pub use action::{Action, ActionBook, ActionId, ActionRegistry, ExecutionContext, RegistryEntry};
pub use error::{ContractError, ContractResult};
pub use nav::{AccountingReport, NavHelper, NavReconciler, NavSource, StrategyContext};
pub use strategy::{ExecutionEnv, Strategy, StrategyExecutor, StrategyId, StrategyStorage};
