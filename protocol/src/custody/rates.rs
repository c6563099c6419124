//! # Rate Sources
//!
//! A rate is the value of one whole unit of an asset in the base asset,
//! scaled by `WAD`. The base asset itself always rates at `WAD`.
//! How a provider arrives at its number is not this crate's business;
//! [`FixedRate`] and [`AdjustableRate`] cover configuration and
//! operator-fed values.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::access::Ownable;
use crate::config::WAD;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::EventLog;
use crate::types::{Address, Amount};

/// Something that can quote an asset's rate against the base asset.
pub trait RateProvider: Send + Sync {
    /// Current rate, `WAD` = parity.
    fn rate(&self) -> ProtocolResult<Amount>;
}

/// A constant rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRate(pub Amount);

impl RateProvider for FixedRate {
    fn rate(&self) -> ProtocolResult<Amount> {
        Ok(self.0)
    }
}

/// A rate that can be changed after it is registered. Clones share the
/// same value, so the handle kept by an operator moves the rate seen by
/// the registry.
#[derive(Debug, Clone)]
pub struct AdjustableRate {
    rate: Arc<RwLock<Amount>>,
}

impl AdjustableRate {
    /// Starts at `rate`.
    pub fn new(rate: Amount) -> Self {
        Self {
            rate: Arc::new(RwLock::new(rate)),
        }
    }

    /// Replaces the rate.
    pub fn set(&self, rate: Amount) {
        *self.rate.write() = rate;
    }
}

impl RateProvider for AdjustableRate {
    fn rate(&self) -> ProtocolResult<Amount> {
        Ok(*self.rate.read())
    }
}

/// Events emitted by [`RateProviderRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateEvent {
    /// A provider was set (or replaced) for an asset.
    RateProviderUpdated {
        /// Asset whose provider changed.
        asset: Address,
    },
}

/// Read-through registry from asset to rate source.
#[derive(Clone)]
pub struct RateProviderRegistry {
    ownable: Ownable,
    base_asset: Address,
    providers: BTreeMap<Address, Arc<dyn RateProvider>>,
    events: EventLog<RateEvent>,
}

impl fmt::Debug for RateProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateProviderRegistry")
            .field("owner", &self.ownable.owner())
            .field("base_asset", &self.base_asset)
            .field("assets", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RateProviderRegistry {
    /// Creates a registry quoting against `base_asset`.
    pub fn new(owner: Address, base_asset: Address) -> Self {
        Self {
            ownable: Ownable::new(owner),
            base_asset,
            providers: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    /// The asset every rate is quoted in.
    pub fn base_asset(&self) -> Address {
        self.base_asset
    }

    /// Sets the provider for `asset`. Owner-only.
    pub fn update(
        &mut self,
        caller: Address,
        asset: Address,
        provider: Arc<dyn RateProvider>,
    ) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if asset.is_zero() {
            return Err(ProtocolError::InvalidAddress(asset));
        }
        self.providers.insert(asset, provider);
        info!(%asset, "rate provider updated");
        self.events.emit(RateEvent::RateProviderUpdated { asset });
        Ok(())
    }

    /// Returns `true` if `asset` can be priced.
    pub fn has_rate_provider(&self, asset: Address) -> bool {
        asset == self.base_asset || self.providers.contains_key(&asset)
    }

    /// Fails with [`ProtocolError::RateProviderNotFound`] unless `asset` can be priced.
    pub fn check_has_rate_provider(&self, asset: Address) -> ProtocolResult<()> {
        if !self.has_rate_provider(asset) {
            return Err(ProtocolError::RateProviderNotFound(asset));
        }
        Ok(())
    }

    /// Current rate of `asset` in the base asset.
    pub fn rate_of(&self, asset: Address) -> ProtocolResult<Amount> {
        if asset == self.base_asset {
            return Ok(WAD);
        }
        self.providers
            .get(&asset)
            .ok_or(ProtocolError::RateProviderNotFound(asset))?
            .rate()
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<RateEvent> {
        &self.events
    }
}
