//! # Access Control
//!
//! Ownership, capability sets and pause flags. Every component keeps its
//! own instances of these; there is no global role registry. A call is
//! authorized by checking the caller against the specific set relevant to
//! that call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Address;

// ---------------------------------------------------------------------------
// Ownable
// ---------------------------------------------------------------------------

/// Single-owner administration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    /// Creates an ownership record for `owner`.
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Returns `true` if `caller` is the owner.
    pub fn is_owner(&self, caller: Address) -> bool {
        caller == self.owner
    }

    /// Fails with [`ProtocolError::Unauthorized`] unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: Address) -> ProtocolResult<()> {
        if !self.is_owner(caller) {
            return Err(ProtocolError::Unauthorized(caller));
        }
        Ok(())
    }

    /// Hands ownership to `new_owner`. Owner-only; the zero address is refused.
    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> ProtocolResult<()> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(ProtocolError::InvalidAddress(new_owner));
        }
        tracing::info!(from = %self.owner, to = %new_owner, "ownership transferred");
        self.owner = new_owner;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CapabilitySet
// ---------------------------------------------------------------------------

/// An explicit set of accounts holding one capability (minters, executors,
/// blacklisted accounts). May be emptied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    members: BTreeSet<Address>,
}

impl CapabilitySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `account`. Returns `false` if it was already present.
    pub fn grant(&mut self, account: Address) -> bool {
        self.members.insert(account)
    }

    /// Removes `account`. Returns `false` if it was absent.
    pub fn revoke(&mut self, account: Address) -> bool {
        self.members.remove(&account)
    }

    /// Membership test.
    pub fn contains(&self, account: Address) -> bool {
        self.members.contains(&account)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if nobody holds the capability.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }
}

// ---------------------------------------------------------------------------
// PauseFlag
// ---------------------------------------------------------------------------

/// Per-component interlock checked before any side effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseFlag {
    paused: bool,
}

impl PauseFlag {
    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Sets the flag.
    pub fn set(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Fails with [`ProtocolError::EnforcedPause`] while paused.
    pub fn ensure_not_paused(&self) -> ProtocolResult<()> {
        if self.paused {
            return Err(ProtocolError::EnforcedPause);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_owner_passes() {
        let owner = Address::from_label("owner");
        let ownable = Ownable::new(owner);
        assert!(ownable.ensure_owner(owner).is_ok());
        assert_eq!(
            ownable.ensure_owner(Address::from_label("mallory")),
            Err(ProtocolError::Unauthorized(Address::from_label("mallory")))
        );
    }

    #[test]
    fn ownership_transfer() {
        let owner = Address::from_label("owner");
        let next = Address::from_label("next");
        let mut ownable = Ownable::new(owner);
        assert!(ownable.transfer_ownership(owner, Address::ZERO).is_err());
        ownable.transfer_ownership(owner, next).unwrap();
        assert_eq!(ownable.owner(), next);
        assert!(ownable.ensure_owner(owner).is_err());
    }

    #[test]
    fn capability_set_can_be_emptied() {
        let alice = Address::from_label("alice");
        let mut set = CapabilitySet::new();
        assert!(set.grant(alice));
        assert!(!set.grant(alice));
        assert!(set.contains(alice));
        assert!(set.revoke(alice));
        assert!(!set.revoke(alice));
        assert!(set.is_empty());
    }

    #[test]
    fn pause_flag_blocks() {
        let mut flag = PauseFlag::default();
        assert!(flag.ensure_not_paused().is_ok());
        flag.set(true);
        assert_eq!(flag.ensure_not_paused(), Err(ProtocolError::EnforcedPause));
    }
}
