//! # Strategy Storage
//!
//! One record per strategy: which action ids it may run, which assets it
//! may hold, and whether it is active. Ids are assigned sequentially from
//! zero and never reused. Pausing a strategy suspends execution and vault
//! pulls; the record itself stays.
//!
//! Whitelist edits are all-or-nothing: if any entry in a batch is a
//! duplicate (or missing, for removals) nothing changes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use canopy_protocol::access::Ownable;
use canopy_protocol::custody::StrategyRegistry;
use canopy_protocol::events::EventLog;
use canopy_protocol::{Address, ProtocolError};

use crate::action::ActionId;
use crate::error::{ContractError, ContractResult};
use crate::strategy::StrategyId;

/// Everything stored about one strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Strategy address.
    pub address: Address,
    /// Action ids the strategy may execute.
    pub actions: BTreeSet<ActionId>,
    /// Assets the strategy may hold and pull from the vault.
    pub assets: BTreeSet<Address>,
    /// `false` while paused.
    pub active: bool,
}

/// Events emitted by [`StrategyStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageEvent {
    /// A strategy was stored.
    StrategyCreated {
        /// Assigned id.
        id: StrategyId,
        /// Strategy address.
        address: Address,
        /// Initial action whitelist.
        actions: Vec<ActionId>,
        /// Initial asset whitelist.
        assets: Vec<Address>,
    },
    /// An action was whitelisted.
    ActionWhitelisted(StrategyId, ActionId),
    /// An action was removed from the whitelist.
    ActionUnwhitelisted(StrategyId, ActionId),
    /// An asset was whitelisted.
    AssetWhitelisted(StrategyId, Address),
    /// An asset was removed from the whitelist.
    AssetUnwhitelisted(StrategyId, Address),
    /// Execution suspended.
    StrategyPaused(StrategyId),
    /// Execution resumed.
    StrategyUnpaused(StrategyId),
}

/// Per-strategy whitelists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStorage {
    address: Address,
    ownable: Ownable,
    strategies: Vec<StrategyRecord>,
    index: BTreeMap<Address, StrategyId>,
    events: EventLog<StorageEvent>,
}

impl StrategyStorage {
    /// Creates an empty storage.
    pub fn new(owner: Address) -> Self {
        Self {
            address: Address::from_label(&format!("StrategyStorage_{owner}")),
            ownable: Ownable::new(owner),
            strategies: Vec::new(),
            index: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    /// The storage's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<StorageEvent> {
        &self.events
    }

    // -- queries -----------------------------------------------------------

    /// Number of stored strategies.
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// The record for `id`.
    pub fn strategy(&self, id: StrategyId) -> ContractResult<&StrategyRecord> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.strategies.get(i))
            .ok_or_else(|| ContractError::DoesNotExist(format!("strategy {id}")))
    }

    /// Address of strategy `id`.
    pub fn strategy_address(&self, id: StrategyId) -> ContractResult<Address> {
        self.strategy(id).map(|r| r.address)
    }

    /// Id of the strategy at `address`.
    pub fn strategy_id(&self, address: Address) -> Option<StrategyId> {
        self.index.get(&address).copied()
    }

    /// Returns `true` if `address` is a stored, unpaused strategy.
    pub fn is_active_strategy(&self, address: Address) -> bool {
        self.record_of(address).map(|r| r.active).unwrap_or(false)
    }

    /// Returns `true` if `address` may execute `action`.
    pub fn is_action_whitelisted(&self, address: Address, action: ActionId) -> bool {
        self.record_of(address)
            .map(|r| r.actions.contains(&action))
            .unwrap_or(false)
    }

    /// Returns `true` if `address` may hold `asset`.
    pub fn is_asset_whitelisted(&self, address: Address, asset: Address) -> bool {
        self.record_of(address)
            .map(|r| r.assets.contains(&asset))
            .unwrap_or(false)
    }

    // -- mutations ---------------------------------------------------------

    /// Stores a new strategy, active, and returns its id. The initial
    /// lists may not repeat an entry.
    pub fn store_strategy(
        &mut self,
        caller: Address,
        address: Address,
        actions: &[ActionId],
        assets: &[Address],
    ) -> ContractResult<StrategyId> {
        self.ownable.ensure_owner(caller)?;
        if address.is_zero() {
            return Err(ProtocolError::InvalidAddress(address).into());
        }
        if self.index.contains_key(&address) {
            return Err(ContractError::AlreadyExist(format!("strategy {address}")));
        }
        ensure_all_new(&BTreeSet::new(), actions, |a| format!("action {a}"))?;
        ensure_all_new(&BTreeSet::new(), assets, |a| format!("asset {a}"))?;
        let id = self.strategies.len() as StrategyId;
        self.strategies.push(StrategyRecord {
            address,
            actions: actions.iter().copied().collect(),
            assets: assets.iter().copied().collect(),
            active: true,
        });
        self.index.insert(address, id);
        info!(id, %address, "strategy stored");
        self.events.emit(StorageEvent::StrategyCreated {
            id,
            address,
            actions: actions.to_vec(),
            assets: assets.to_vec(),
        });
        Ok(id)
    }

    /// Adds `actions` to the whitelist of strategy `id`.
    pub fn whitelist_actions(
        &mut self,
        caller: Address,
        id: StrategyId,
        actions: &[ActionId],
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let record = self.record_mut(id)?;
        ensure_all_new(&record.actions, actions, |a| format!("action {a}"))?;
        record.actions.extend(actions.iter().copied());
        for action in actions {
            self.events.emit(StorageEvent::ActionWhitelisted(id, *action));
        }
        Ok(())
    }

    /// Removes `actions` from the whitelist of strategy `id`.
    pub fn unwhitelist_actions(
        &mut self,
        caller: Address,
        id: StrategyId,
        actions: &[ActionId],
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let record = self.record_mut(id)?;
        ensure_all_present(&record.actions, actions, |a| format!("action {a}"))?;
        for action in actions {
            record.actions.remove(action);
        }
        for action in actions {
            self.events.emit(StorageEvent::ActionUnwhitelisted(id, *action));
        }
        Ok(())
    }

    /// Adds `assets` to the whitelist of strategy `id`.
    pub fn whitelist_assets(
        &mut self,
        caller: Address,
        id: StrategyId,
        assets: &[Address],
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let record = self.record_mut(id)?;
        ensure_all_new(&record.assets, assets, |a| format!("asset {a}"))?;
        record.assets.extend(assets.iter().copied());
        for asset in assets {
            self.events.emit(StorageEvent::AssetWhitelisted(id, *asset));
        }
        Ok(())
    }

    /// Removes `assets` from the whitelist of strategy `id`.
    pub fn unwhitelist_assets(
        &mut self,
        caller: Address,
        id: StrategyId,
        assets: &[Address],
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        let record = self.record_mut(id)?;
        ensure_all_present(&record.assets, assets, |a| format!("asset {a}"))?;
        for asset in assets {
            record.assets.remove(asset);
        }
        for asset in assets {
            self.events.emit(StorageEvent::AssetUnwhitelisted(id, *asset));
        }
        Ok(())
    }

    /// Suspends strategy `id`.
    pub fn pause_strategy(&mut self, caller: Address, id: StrategyId) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        self.record_mut(id)?.active = false;
        info!(id, "strategy paused");
        self.events.emit(StorageEvent::StrategyPaused(id));
        Ok(())
    }

    /// Resumes strategy `id`.
    pub fn unpause_strategy(&mut self, caller: Address, id: StrategyId) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        self.record_mut(id)?.active = true;
        info!(id, "strategy unpaused");
        self.events.emit(StorageEvent::StrategyUnpaused(id));
        Ok(())
    }

    fn record_of(&self, address: Address) -> Option<&StrategyRecord> {
        let id = *self.index.get(&address)?;
        self.strategies.get(usize::try_from(id).ok()?)
    }

    fn record_mut(&mut self, id: StrategyId) -> ContractResult<&mut StrategyRecord> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.strategies.get_mut(i))
            .ok_or_else(|| ContractError::DoesNotExist(format!("strategy {id}")))
    }
}

impl StrategyRegistry for StrategyStorage {
    fn registry_address(&self) -> Address {
        self.address
    }

    fn is_active_strategy(&self, strategy: Address) -> bool {
        StrategyStorage::is_active_strategy(self, strategy)
    }

    fn is_asset_whitelisted(&self, strategy: Address, asset: Address) -> bool {
        StrategyStorage::is_asset_whitelisted(self, strategy, asset)
    }
}

fn ensure_all_new<T: Ord + Copy>(
    existing: &BTreeSet<T>,
    incoming: &[T],
    describe: impl Fn(&T) -> String,
) -> ContractResult<()> {
    let mut seen = BTreeSet::new();
    for item in incoming {
        if existing.contains(item) || !seen.insert(*item) {
            return Err(ContractError::AlreadyExist(describe(item)));
        }
    }
    Ok(())
}

fn ensure_all_present<T: Ord + Copy>(
    existing: &BTreeSet<T>,
    outgoing: &[T],
    describe: impl Fn(&T) -> String,
) -> ContractResult<()> {
    let mut seen = BTreeSet::new();
    for item in outgoing {
        if !existing.contains(item) || !seen.insert(*item) {
            return Err(ContractError::DoesNotExist(describe(item)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn strategy() -> Address {
        Address::from_label("strategy")
    }

    fn weth() -> Address {
        Address::from_label("weth")
    }

    fn pull() -> ActionId {
        ActionId::derive("VaultPull")
    }

    #[test]
    fn ids_are_sequential() {
        let mut storage = StrategyStorage::new(owner());
        let a = storage.store_strategy(owner(), strategy(), &[pull()], &[weth()]).unwrap();
        let b = storage
            .store_strategy(owner(), Address::from_label("other"), &[], &[])
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(storage.strategy_count(), 2);
        assert_eq!(storage.strategy_address(0).unwrap(), strategy());
        assert_eq!(
            storage.events().events()[0],
            StorageEvent::StrategyCreated {
                id: 0,
                address: strategy(),
                actions: vec![pull()],
                assets: vec![weth()],
            }
        );
    }

    #[test]
    fn storing_twice_fails() {
        let mut storage = StrategyStorage::new(owner());
        storage.store_strategy(owner(), strategy(), &[], &[]).unwrap();
        assert!(matches!(
            storage.store_strategy(owner(), strategy(), &[], &[]),
            Err(ContractError::AlreadyExist(_))
        ));
    }

    #[test]
    fn initial_lists_reject_repeats() {
        let mut storage = StrategyStorage::new(owner());
        assert!(matches!(
            storage.store_strategy(owner(), strategy(), &[pull(), pull()], &[]),
            Err(ContractError::AlreadyExist(_))
        ));
        assert!(matches!(
            storage.store_strategy(owner(), strategy(), &[pull()], &[weth(), weth()]),
            Err(ContractError::AlreadyExist(_))
        ));
        assert_eq!(storage.strategy_count(), 0);
        assert!(storage.events().events().is_empty());
        assert!(!storage.is_active_strategy(strategy()));
    }

    #[test]
    fn unknown_strategy_does_not_exist() {
        let storage = StrategyStorage::new(owner());
        assert!(matches!(
            storage.strategy_address(3),
            Err(ContractError::DoesNotExist(_))
        ));
        assert!(!storage.is_active_strategy(strategy()));
    }

    #[test]
    fn whitelist_edits_are_all_or_nothing() {
        let mut storage = StrategyStorage::new(owner());
        let id = storage.store_strategy(owner(), strategy(), &[pull()], &[]).unwrap();
        let push = ActionId::derive("VaultPush");

        assert!(matches!(
            storage.whitelist_actions(owner(), id, &[push, pull()]),
            Err(ContractError::AlreadyExist(_))
        ));
        assert!(!storage.is_action_whitelisted(strategy(), push));

        storage.whitelist_actions(owner(), id, &[push]).unwrap();
        assert!(storage.is_action_whitelisted(strategy(), push));

        storage.unwhitelist_actions(owner(), id, &[push]).unwrap();
        assert!(matches!(
            storage.unwhitelist_actions(owner(), id, &[push]),
            Err(ContractError::DoesNotExist(_))
        ));
    }

    #[test]
    fn asset_whitelist() {
        let mut storage = StrategyStorage::new(owner());
        let id = storage.store_strategy(owner(), strategy(), &[], &[]).unwrap();
        storage.whitelist_assets(owner(), id, &[weth()]).unwrap();
        assert!(storage.is_asset_whitelisted(strategy(), weth()));
        assert!(storage.whitelist_assets(owner(), id, &[weth()]).is_err());
        storage.unwhitelist_assets(owner(), id, &[weth()]).unwrap();
        assert!(!storage.is_asset_whitelisted(strategy(), weth()));
        assert_eq!(
            storage.events().last(),
            Some(&StorageEvent::AssetUnwhitelisted(id, weth()))
        );
    }

    #[test]
    fn pause_toggles_activity() {
        let mut storage = StrategyStorage::new(owner());
        let id = storage.store_strategy(owner(), strategy(), &[], &[]).unwrap();
        storage.pause_strategy(owner(), id).unwrap();
        assert!(!storage.is_active_strategy(strategy()));
        storage.unpause_strategy(owner(), id).unwrap();
        assert!(storage.is_active_strategy(strategy()));
    }

    #[test]
    fn mutations_are_owner_only() {
        let mut storage = StrategyStorage::new(owner());
        let mallory = Address::from_label("mallory");
        assert_eq!(
            storage.store_strategy(mallory, strategy(), &[], &[]),
            Err(ContractError::Protocol(ProtocolError::Unauthorized(mallory)))
        );
        storage.store_strategy(owner(), strategy(), &[], &[]).unwrap();
        assert!(storage.pause_strategy(mallory, 0).is_err());
        assert!(storage.whitelist_assets(mallory, 0, &[weth()]).is_err());
    }
}
