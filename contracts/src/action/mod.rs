//! # Actions
//!
//! An action is a unit of strategy behaviour: pull capital from the vault,
//! push it back, stake it somewhere. Each action has a stable
//! [`ActionId`] derived from its name, and any number of implementations
//! deployed at different addresses in the [`ActionBook`]. The
//! [`registry::ActionRegistry`] decides which address is current for an id.
//!
//! Strategies whitelist ids, not addresses, so upgrading an implementation
//! never requires re-whitelisting.

pub mod builtin;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use canopy_protocol::custody::{AssetBook, CustodyVault, StrategyRegistry};
use canopy_protocol::Address;

use crate::error::ContractResult;

pub use builtin::{TransferCall, VaultPull, VaultPush};
pub use registry::{ActionRegistry, RegistryEntry, RegistryEvent};

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Four-byte identifier of an action, independent of its implementation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId([u8; 4]);

impl ActionId {
    /// Derives the id for an action name: the first four bytes of
    /// `BLAKE3(name)`.
    pub fn derive(name: &str) -> Self {
        let digest = blake3::hash(name.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest.as_bytes()[..4]);
        Self(bytes)
    }

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({self})")
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What an action may touch while it runs on behalf of a strategy.
pub struct ExecutionContext<'a> {
    /// The strategy the action acts for. Balances move in and out of this
    /// address.
    pub strategy: Address,
    /// External balances.
    pub assets: &'a mut AssetBook,
    /// Custody vault, for pulls and pushes.
    pub vault: &'a CustodyVault,
    /// Strategy whitelists, checked by the vault on every pull.
    pub registry: &'a dyn StrategyRegistry,
}

/// An executable action implementation.
pub trait Action: Send + Sync {
    /// Declared identity. Every implementation of the same action returns
    /// the same name.
    fn name(&self) -> &'static str;

    /// Id derived from [`name`](Self::name).
    fn id(&self) -> ActionId {
        ActionId::derive(self.name())
    }

    /// Runs the action. `hints` carry optional off-chain routing data and
    /// may be empty.
    fn execute(
        &self,
        ctx: &mut ExecutionContext<'_>,
        calldata: &[u8],
        hints: &[u8],
    ) -> ContractResult<()>;
}

// ---------------------------------------------------------------------------
// ActionBook
// ---------------------------------------------------------------------------

/// Deployed action implementations, keyed by address.
#[derive(Clone, Default)]
pub struct ActionBook {
    deployed: BTreeMap<Address, Arc<dyn Action>>,
}

impl fmt::Debug for ActionBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.deployed.iter().map(|(addr, a)| (addr, a.name())))
            .finish()
    }
}

impl ActionBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys `action` at a fresh address and returns it.
    pub fn deploy(&mut self, action: Arc<dyn Action>) -> Address {
        let address =
            Address::from_label(&format!("action/{}/{}", action.name(), self.deployed.len()));
        tracing::debug!(name = action.name(), %address, "action deployed");
        self.deployed.insert(address, action);
        address
    }

    /// The implementation at `address`, if any.
    pub fn resolve(&self, address: Address) -> Option<Arc<dyn Action>> {
        self.deployed.get(&address).cloned()
    }

    /// Number of deployed implementations.
    pub fn len(&self) -> usize {
        self.deployed.len()
    }

    /// Returns `true` if nothing is deployed.
    pub fn is_empty(&self) -> bool {
        self.deployed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_depends_only_on_name() {
        assert_eq!(VaultPull.id(), ActionId::derive("VaultPull"));
        assert_ne!(VaultPull.id(), VaultPush.id());
    }

    #[test]
    fn id_displays_as_hex() {
        let id = ActionId::from_bytes([0x11, 0x11, 0x11, 0x11]);
        assert_eq!(id.to_string(), "0x11111111");
    }

    #[test]
    fn each_deployment_gets_its_own_address() {
        let mut book = ActionBook::new();
        let a = book.deploy(Arc::new(VaultPull));
        let b = book.deploy(Arc::new(VaultPull));
        assert_ne!(a, b);
        assert_eq!(book.resolve(a).map(|x| x.id()), Some(VaultPull.id()));
        assert!(book.resolve(Address::from_label("nowhere")).is_none());
    }
}
