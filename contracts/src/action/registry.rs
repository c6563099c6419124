//! # Action Registry
//!
//! Maps each [`ActionId`] to the address of its current implementation,
//! with a two-step upgrade path:
//!
//! ```text
//!   add_new_contract
//!         │
//!         ▼
//!   Registered{current, previous} ──start_contract_change──▶ ChangePending{current, previous, pending}
//!         ▲   │                                                  │        │
//!         │   └── revert_to_previous_address (swap)              │        │
//!         ├──────────────────── approve (pending → current) ─────┘        │
//!         └──────────────────── cancel  (pending dropped) ────────────────┘
//! ```
//!
//! One level of history is kept. Reverting twice returns to where you
//! started. All transitions are owner-only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use canopy_protocol::access::Ownable;
use canopy_protocol::events::EventLog;
use canopy_protocol::{Address, ProtocolError};

use crate::action::ActionId;
use crate::error::{ContractError, ContractResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// State of one action id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEntry {
    /// Stable. `previous` is the address before the last upgrade.
    Registered {
        /// Implementation in use.
        current: Address,
        /// Implementation before the last approved change or revert.
        previous: Option<Address>,
    },
    /// An upgrade awaits approval. `current` is still in use.
    ChangePending {
        /// Implementation in use.
        current: Address,
        /// Kept so a cancelled change leaves history intact.
        previous: Option<Address>,
        /// Proposed implementation.
        pending: Address,
    },
}

impl RegistryEntry {
    /// The implementation in use, regardless of state.
    pub fn current(&self) -> Address {
        match self {
            RegistryEntry::Registered { current, .. }
            | RegistryEntry::ChangePending { current, .. } => *current,
        }
    }

    /// The previous implementation, if any.
    pub fn previous(&self) -> Option<Address> {
        match self {
            RegistryEntry::Registered { previous, .. }
            | RegistryEntry::ChangePending { previous, .. } => *previous,
        }
    }

    /// The proposed implementation while a change is pending.
    pub fn pending(&self) -> Option<Address> {
        match self {
            RegistryEntry::ChangePending { pending, .. } => Some(*pending),
            RegistryEntry::Registered { .. } => None,
        }
    }
}

/// Events emitted by [`ActionRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A new id was registered.
    AddNewContract {
        /// Action id.
        id: ActionId,
        /// Initial implementation.
        address: Address,
    },
    /// A change was proposed (or re-proposed).
    StartContractChange {
        /// Action id.
        id: ActionId,
        /// Implementation in use.
        current: Address,
        /// Proposed implementation.
        pending: Address,
    },
    /// A pending change was promoted.
    ApproveContractChange {
        /// Action id.
        id: ActionId,
        /// Replaced implementation.
        old: Address,
        /// New implementation.
        new: Address,
    },
    /// A pending change was dropped.
    CancelContractChange {
        /// Action id.
        id: ActionId,
        /// Implementation kept.
        current: Address,
        /// Dropped proposal.
        cancelled: Address,
    },
    /// Current and previous were swapped.
    RevertToPreviousAddress {
        /// Who reverted.
        caller: Address,
        /// Action id.
        id: ActionId,
        /// Implementation that was current.
        from: Address,
        /// Implementation that is current now.
        to: Address,
    },
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

/// Versioned table of action implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRegistry {
    ownable: Ownable,
    entries: BTreeMap<ActionId, RegistryEntry>,
    events: EventLog<RegistryEvent>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new(owner: Address) -> Self {
        Self {
            ownable: Ownable::new(owner),
            entries: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<RegistryEvent> {
        &self.events
    }

    /// Returns `true` if `id` has an entry.
    pub fn is_registered(&self, id: ActionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The entry for `id`.
    pub fn entry(&self, id: ActionId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    /// Current implementation of `id`.
    pub fn get_addr(&self, id: ActionId) -> ContractResult<Address> {
        self.entries
            .get(&id)
            .map(RegistryEntry::current)
            .ok_or(ContractError::EntryNonExistentError(id))
    }

    /// Registers `id` at `address`.
    pub fn add_new_contract(
        &mut self,
        caller: Address,
        id: ActionId,
        address: Address,
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        if self.entries.contains_key(&id) {
            return Err(ContractError::EntryAlreadyExistsError(id));
        }
        if address.is_zero() {
            return Err(ProtocolError::InvalidAddress(address).into());
        }
        self.entries.insert(
            id,
            RegistryEntry::Registered {
                current: address,
                previous: None,
            },
        );
        info!(%id, %address, "action registered");
        self.events.emit(RegistryEvent::AddNewContract { id, address });
        Ok(())
    }

    /// Proposes `pending` as the next implementation of `id`. Calling it
    /// again while a change is pending replaces the proposal.
    pub fn start_contract_change(
        &mut self,
        caller: Address,
        id: ActionId,
        pending: Address,
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        if pending.is_zero() {
            return Err(ProtocolError::InvalidAddress(pending).into());
        }
        let entry = self.entry_mut(id)?;
        let (current, previous) = (entry.current(), entry.previous());
        *entry = RegistryEntry::ChangePending {
            current,
            previous,
            pending,
        };
        self.events.emit(RegistryEvent::StartContractChange {
            id,
            current,
            pending,
        });
        Ok(())
    }

    /// Promotes the pending implementation of `id`.
    pub fn approve_contract_change(&mut self, caller: Address, id: ActionId) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let entry = self.entry_mut(id)?;
        let RegistryEntry::ChangePending {
            current, pending, ..
        } = *entry
        else {
            return Err(ContractError::EntryNotInChangeError(id));
        };
        *entry = RegistryEntry::Registered {
            current: pending,
            previous: Some(current),
        };
        info!(%id, old = %current, new = %pending, "action upgraded");
        self.events.emit(RegistryEvent::ApproveContractChange {
            id,
            old: current,
            new: pending,
        });
        Ok(())
    }

    /// Drops the pending implementation of `id`.
    pub fn cancel_contract_change(&mut self, caller: Address, id: ActionId) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let entry = self.entry_mut(id)?;
        let RegistryEntry::ChangePending {
            current,
            previous,
            pending,
        } = *entry
        else {
            return Err(ContractError::EntryNotInChangeError(id));
        };
        *entry = RegistryEntry::Registered { current, previous };
        self.events.emit(RegistryEvent::CancelContractChange {
            id,
            current,
            cancelled: pending,
        });
        Ok(())
    }

    /// Swaps current and previous implementation of `id`.
    pub fn revert_to_previous_address(&mut self, caller: Address, id: ActionId) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let entry = self.entry_mut(id)?;
        let (from, to) = match *entry {
            RegistryEntry::ChangePending { .. } => {
                return Err(ContractError::EntryInChangeError(id));
            }
            RegistryEntry::Registered { previous: None, .. } => {
                return Err(ContractError::EmptyPrevAddrError(id));
            }
            RegistryEntry::Registered {
                current,
                previous: Some(previous),
            } => (current, previous),
        };
        *entry = RegistryEntry::Registered {
            current: to,
            previous: Some(from),
        };
        info!(%id, %from, %to, "action reverted");
        self.events.emit(RegistryEvent::RevertToPreviousAddress {
            caller,
            id,
            from,
            to,
        });
        Ok(())
    }

    fn entry_mut(&mut self, id: ActionId) -> ContractResult<&mut RegistryEntry> {
        self.entries
            .get_mut(&id)
            .ok_or(ContractError::EntryNonExistentError(id))
    }
}
