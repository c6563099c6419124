//! # Custody Vault
//!
//! Holds the underlying and every other allowable asset on behalf of the
//! vault share. Balances live in the [`AssetBook`] under the vault's own
//! address; this type owns only the policy: which assets are allowed,
//! which redemption queue may draw payouts, and which strategies may pull
//! capital out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::access::Ownable;
use crate::config::MAX_ASSET_DECIMALS;
use crate::custody::assets::AssetBook;
use crate::custody::rates::RateProviderRegistry;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::EventLog;
use crate::types::{Address, Amount};

/// Read access to strategy whitelists. Implemented by the strategy
/// storage in the execution layer.
pub trait StrategyRegistry {
    /// Address the registry is deployed at.
    fn registry_address(&self) -> Address;

    /// Returns `true` if `strategy` is stored and not paused.
    fn is_active_strategy(&self, strategy: Address) -> bool;

    /// Returns `true` if `strategy` may hold `asset`.
    fn is_asset_whitelisted(&self, strategy: Address, asset: Address) -> bool;
}

/// Events emitted by [`CustodyVault`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// An asset became allowable.
    AllowableAssetAdded(Address),
    /// An asset stopped being allowable.
    AllowableAssetRemoved(Address),
    /// The redemption binding changed.
    RedemptionUpdated {
        /// New redemption queue.
        new: Address,
        /// Previous redemption queue.
        old: Address,
    },
    /// The strategy storage binding changed.
    StrategyStorageUpdated {
        /// New storage.
        new: Address,
        /// Previous storage.
        old: Address,
    },
}

/// The custody vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyVault {
    address: Address,
    ownable: Ownable,
    underlying: Address,
    allowable: BTreeSet<Address>,
    redemption: Address,
    strategy_storage: Address,
    events: EventLog<VaultEvent>,
}

impl CustodyVault {
    /// Creates a vault holding `underlying`. The underlying is allowable
    /// from the start.
    pub fn new(owner: Address, underlying: Address) -> Self {
        let mut allowable = BTreeSet::new();
        allowable.insert(underlying);
        Self {
            address: Address::from_label(&format!("CustodyVault_{underlying}")),
            ownable: Ownable::new(owner),
            underlying,
            allowable,
            redemption: Address::ZERO,
            strategy_storage: Address::ZERO,
            events: EventLog::new(),
        }
    }

    /// The vault's own address (holder of custody balances).
    pub fn address(&self) -> Address {
        self.address
    }

    /// The asset redemptions are paid in.
    pub fn underlying(&self) -> Address {
        self.underlying
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Bound redemption queue, zero if unset.
    pub fn redemption(&self) -> Address {
        self.redemption
    }

    /// Bound strategy storage, zero if unset.
    pub fn strategy_storage(&self) -> Address {
        self.strategy_storage
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<VaultEvent> {
        &self.events
    }

    // -- allow-list --------------------------------------------------------

    /// Allows `asset` to be deposited and held.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnsupportedDecimals`] above 18 decimals.
    /// - [`ProtocolError::RateProviderNotFound`] if the asset cannot be priced.
    /// - [`ProtocolError::Failed`] if already allowable.
    pub fn add_allowable_asset(
        &mut self,
        caller: Address,
        asset: Address,
        assets: &AssetBook,
        rates: &RateProviderRegistry,
    ) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        let decimals = assets.decimals(asset)?;
        if decimals > MAX_ASSET_DECIMALS {
            return Err(ProtocolError::UnsupportedDecimals(decimals));
        }
        rates.check_has_rate_provider(asset)?;
        if !self.allowable.insert(asset) {
            return Err(ProtocolError::Failed(format!("{asset} already allowable")));
        }
        info!(%asset, "allowable asset added");
        self.events.emit(VaultEvent::AllowableAssetAdded(asset));
        Ok(())
    }

    /// Removes `asset` from the allow-list. Fails with
    /// [`ProtocolError::Failed`] if it was not allowable.
    pub fn remove_allowable_asset(&mut self, caller: Address, asset: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if !self.allowable.remove(&asset) {
            return Err(ProtocolError::Failed(format!("{asset} not allowable")));
        }
        info!(%asset, "allowable asset removed");
        self.events.emit(VaultEvent::AllowableAssetRemoved(asset));
        Ok(())
    }

    /// Returns whether `asset` is allowable. The zero address is rejected.
    pub fn is_allowable_asset(&self, asset: Address) -> ProtocolResult<bool> {
        if asset.is_zero() {
            return Err(ProtocolError::InvalidAddress(asset));
        }
        Ok(self.allowable.contains(&asset))
    }

    /// All allowable assets, in address order.
    pub fn allowable_assets(&self) -> Vec<Address> {
        self.allowable.iter().copied().collect()
    }

    /// Number of allowable assets.
    pub fn allowable_asset_count(&self) -> usize {
        self.allowable.len()
    }

    // -- bindings ----------------------------------------------------------

    /// Binds the redemption queue allowed to draw payouts. Owner-only.
    pub fn set_redemption(&mut self, caller: Address, redemption: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if redemption.is_zero() {
            return Err(ProtocolError::InvalidAddress(redemption));
        }
        let old = std::mem::replace(&mut self.redemption, redemption);
        self.events.emit(VaultEvent::RedemptionUpdated {
            new: redemption,
            old,
        });
        Ok(())
    }

    /// Binds the strategy storage consulted by [`withdraw`](Self::withdraw). Owner-only.
    pub fn set_strategy_storage(&mut self, caller: Address, storage: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if storage.is_zero() {
            return Err(ProtocolError::InvalidAddress(storage));
        }
        let old = std::mem::replace(&mut self.strategy_storage, storage);
        self.events.emit(VaultEvent::StrategyStorageUpdated { new: storage, old });
        Ok(())
    }

    // -- capital movement --------------------------------------------------

    /// Underlying held in custody.
    pub fn underlying_balance(&self, assets: &AssetBook) -> Amount {
        assets.balance_of(self.underlying, self.address)
    }

    /// Pays `amount` of the underlying to `to`. Only the bound redemption
    /// queue may call this.
    pub fn pay_redemption(
        &self,
        caller: Address,
        to: Address,
        amount: Amount,
        assets: &mut AssetBook,
    ) -> ProtocolResult<()> {
        if self.redemption.is_zero() || caller != self.redemption {
            return Err(ProtocolError::Unauthorized(caller));
        }
        let available = self.underlying_balance(assets);
        if available < amount {
            warn!(required = amount, available, "vault cannot fund redemption");
            return Err(ProtocolError::InsufficientFundsInVault {
                required: amount,
                available,
            });
        }
        assets.transfer(self.underlying, self.address, to, amount)?;
        debug!(%to, amount, "redemption paid");
        Ok(())
    }

    /// Moves `amount` of `asset` to `caller`, which must be an active
    /// strategy whitelisted for that asset in the bound strategy storage.
    pub fn withdraw(
        &self,
        caller: Address,
        asset: Address,
        amount: Amount,
        registry: &dyn StrategyRegistry,
        assets: &mut AssetBook,
    ) -> ProtocolResult<()> {
        if self.strategy_storage.is_zero()
            || registry.registry_address() != self.strategy_storage
            || !registry.is_active_strategy(caller)
            || !registry.is_asset_whitelisted(caller, asset)
        {
            return Err(ProtocolError::InvalidStrategy(caller));
        }
        assets.transfer(asset, self.address, caller, amount)?;
        info!(strategy = %caller, %asset, amount, "capital pulled from vault");
        Ok(())
    }
}
