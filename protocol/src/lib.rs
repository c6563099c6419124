// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Canopy Protocol: Accounting Core
//!
//! Canopy runs a yield-bearing vault whose capital is deployed into
//! strategies. This crate is the part that has to be right about money:
//! who owns how many shares, what those shares are worth, and how they
//! leave the system.
//!
//! ## Architecture
//!
//! - **ledger**: the Share Ledger (an internal unit of account only
//!   minters can move) and the Vault Share users actually hold.
//! - **accounting**: mark-to-market of the Share Ledger against measured NAV.
//! - **redemption**: the delayed exit queue.
//! - **custody**: the vault, rate registry, deposit router and external
//!   token balances the core is wired to.
//! - **access**, **events**, **clock**, **math**, **types**: the plumbing.
//! - **config**, **logging**, **error**: parameters, tracing setup, failures.
//!
//! ## Model
//!
//! Components are plain structs. An operation that touches several of
//! them takes the others by reference, and the caller's identity is always
//! an explicit argument. There are no globals and no interior mutability
//! on the accounting path, so a whole system state can be cloned, and
//! every multi-ledger operation restores its checkpoint when it fails.
//!
//! Amounts are `u128` in 18-decimal fixed point. Everything rounds down.

pub mod access;
pub mod accounting;
pub mod clock;
pub mod config;
pub mod custody;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod redemption;
pub mod types;

pub use error::{ErrorKind, ProtocolError, ProtocolResult};
pub use types::{Address, Amount, Bps, Direction};
