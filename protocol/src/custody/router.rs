//! # Deposit Router
//!
//! Entry point for outside capital. A deposit moves the asset into custody,
//! mints the matching Share-Ledger units to the router and wraps them into
//! vault shares for the depositor. The router must be a Share-Ledger minter.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::access::{Ownable, PauseFlag};
use crate::custody::assets::AssetBook;
use crate::custody::rates::RateProviderRegistry;
use crate::custody::vault::CustodyVault;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::EventLog;
use crate::ledger::share::ShareLedger;
use crate::ledger::vault_share::VaultShare;
use crate::math::{checked_add, mul_div, to_wad};
use crate::types::{Address, Amount};

/// Values a deposit asset in units of the underlying.
pub trait UnderlyingConverter: Send + Sync {
    /// Underlying-equivalent of `amount` of `asset`, or `None` if the
    /// asset cannot be mapped. `amount` is already scaled to 18 decimals.
    fn to_underlying(
        &self,
        asset: Address,
        amount: Amount,
        underlying: Address,
        rates: &RateProviderRegistry,
    ) -> Option<Amount>;
}

/// Converts through the rate registry: `wad(amount) * rate(asset) / rate(underlying)`.
/// Only the underlying and the listed assets are convertible.
#[derive(Debug, Clone, Default)]
pub struct RateConverter {
    convertible: BTreeSet<Address>,
}

impl RateConverter {
    /// A converter for the underlying plus `assets`.
    pub fn new(assets: impl IntoIterator<Item = Address>) -> Self {
        Self {
            convertible: assets.into_iter().collect(),
        }
    }
}

impl UnderlyingConverter for RateConverter {
    fn to_underlying(
        &self,
        asset: Address,
        amount: Amount,
        underlying: Address,
        rates: &RateProviderRegistry,
    ) -> Option<Amount> {
        if asset == underlying {
            return Some(amount);
        }
        if !self.convertible.contains(&asset) {
            return None;
        }
        let asset_rate = rates.rate_of(asset).ok()?;
        let underlying_rate = rates.rate_of(underlying).ok()?;
        mul_div(amount, asset_rate, underlying_rate).ok()
    }
}

/// Events emitted by [`Router`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// A deposit was accepted.
    Deposited {
        /// Depositing account.
        depositor: Address,
        /// Asset deposited.
        asset: Address,
        /// Underlying-equivalent credited.
        underlying_amount: Amount,
        /// Vault shares minted to the depositor.
        shares: Amount,
    },
    /// The deposit cap changed.
    DepositCapUpdated {
        /// New cap.
        new: Amount,
        /// Previous cap.
        old: Amount,
    },
}

/// Ledgers a deposit touches.
pub struct DepositContext<'a> {
    /// Share Ledger (the router mints here).
    pub share_ledger: &'a mut ShareLedger,
    /// Vault share credited to the depositor.
    pub vault_share: &'a mut VaultShare,
    /// Custody vault receiving the asset.
    pub vault: &'a CustodyVault,
    /// External balances.
    pub assets: &'a mut AssetBook,
    /// Rate registry used by the converter.
    pub rates: &'a RateProviderRegistry,
}

/// The deposit router.
#[derive(Clone)]
pub struct Router {
    address: Address,
    ownable: Ownable,
    pause: PauseFlag,
    deposit_cap: Amount,
    converter: Arc<dyn UnderlyingConverter>,
    events: EventLog<RouterEvent>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("address", &self.address)
            .field("owner", &self.ownable.owner())
            .field("paused", &self.pause.is_paused())
            .field("deposit_cap", &self.deposit_cap)
            .finish()
    }
}

impl Router {
    /// Creates a router with the given cap and converter.
    pub fn new(
        owner: Address,
        deposit_cap: Amount,
        converter: Arc<dyn UnderlyingConverter>,
    ) -> Self {
        Self {
            address: Address::from_label(&format!("Router_{owner}")),
            ownable: Ownable::new(owner),
            pause: PauseFlag::default(),
            deposit_cap,
            converter,
            events: EventLog::new(),
        }
    }

    /// The router's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current cap on vault-share total assets.
    pub fn deposit_cap(&self) -> Amount {
        self.deposit_cap
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<RouterEvent> {
        &self.events
    }

    /// Pauses or resumes deposits. Owner-only.
    pub fn set_pause(&mut self, caller: Address, paused: bool) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        self.pause.set(paused);
        info!(paused, "router pause updated");
        Ok(())
    }

    /// Replaces the deposit cap. Owner-only.
    pub fn set_deposit_cap(&mut self, caller: Address, cap: Amount) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        let old = std::mem::replace(&mut self.deposit_cap, cap);
        self.events
            .emit(RouterEvent::DepositCapUpdated { new: cap, old });
        Ok(())
    }

    /// Deposits `amount` of `asset` from `caller` and returns the shares minted.
    ///
    /// # Errors
    ///
    /// In check order: [`ProtocolError::EnforcedPause`],
    /// [`ProtocolError::NotAllowableAsset`],
    /// [`ProtocolError::ConversionToUnderlyingFailed`],
    /// [`ProtocolError::NoSharesMinted`],
    /// [`ProtocolError::DepositCapExceeded`]. Balance and minter failures
    /// from the ledgers are passed through. A failed deposit changes nothing.
    pub fn deposit(
        &mut self,
        caller: Address,
        asset: Address,
        amount: Amount,
        mut ctx: DepositContext<'_>,
    ) -> ProtocolResult<Amount> {
        self.pause.ensure_not_paused()?;
        if !ctx.vault.is_allowable_asset(asset)? {
            return Err(ProtocolError::NotAllowableAsset(asset));
        }
        let normalized = to_wad(amount, ctx.assets.decimals(asset)?)?;
        let underlying_amount = self
            .converter
            .to_underlying(asset, normalized, ctx.vault.underlying(), ctx.rates)
            .ok_or(ProtocolError::ConversionToUnderlyingFailed(asset))?;
        let shares = ctx
            .vault_share
            .preview_deposit(ctx.share_ledger, underlying_amount)?;
        if shares == 0 {
            return Err(ProtocolError::NoSharesMinted);
        }
        let total = checked_add(
            ctx.vault_share.total_assets(ctx.share_ledger),
            underlying_amount,
        )?;
        if total > self.deposit_cap {
            return Err(ProtocolError::DepositCapExceeded {
                total,
                cap: self.deposit_cap,
            });
        }

        let checkpoint = (
            ctx.share_ledger.clone(),
            ctx.vault_share.clone(),
            ctx.assets.clone(),
        );
        let shares = match self.settle(caller, asset, amount, underlying_amount, &mut ctx) {
            Ok(shares) => shares,
            Err(e) => {
                let (share_ledger, vault_share, assets) = checkpoint;
                *ctx.share_ledger = share_ledger;
                *ctx.vault_share = vault_share;
                *ctx.assets = assets;
                return Err(e);
            }
        };

        self.events.emit(RouterEvent::Deposited {
            depositor: caller,
            asset,
            underlying_amount,
            shares,
        });
        Ok(shares)
    }

    fn settle(
        &self,
        caller: Address,
        asset: Address,
        amount: Amount,
        underlying_amount: Amount,
        ctx: &mut DepositContext<'_>,
    ) -> ProtocolResult<Amount> {
        ctx.assets
            .transfer(asset, caller, ctx.vault.address(), amount)?;
        ctx.share_ledger
            .mint_to(self.address, self.address, underlying_amount)?;
        ctx.share_ledger
            .approve(self.address, ctx.vault_share.address(), underlying_amount);
        ctx.vault_share
            .deposit(ctx.share_ledger, self.address, underlying_amount, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WAD;
    use crate::custody::rates::FixedRate;

    struct Fixture {
        owner: Address,
        alice: Address,
        weth: Address,
        wsteth: Address,
        iau: ShareLedger,
        share: VaultShare,
        vault: CustodyVault,
        book: AssetBook,
        rates: RateProviderRegistry,
        router: Router,
    }

    impl Fixture {
        fn new() -> Self {
            let owner = Address::from_label("owner");
            let alice = Address::from_label("alice");
            let weth = Address::from_label("weth");
            let wsteth = Address::from_label("wsteth");

            let mut book = AssetBook::new();
            book.register_token(weth, "WETH", 18).unwrap();
            book.register_token(wsteth, "wstETH", 18).unwrap();
            book.mint(weth, alice, 100 * WAD).unwrap();
            book.mint(wsteth, alice, 100 * WAD).unwrap();

            let mut rates = RateProviderRegistry::new(owner, weth);
            rates
                .update(owner, wsteth, Arc::new(FixedRate(WAD)))
                .unwrap();

            let mut iau = ShareLedger::new(owner, wsteth, "wstETH", "wstETH");
            let share = VaultShare::new(owner, &iau, "Canopy ETH", "cETH");
            let vault = CustodyVault::new(owner, wsteth);
            let router = Router::new(owner, 100 * WAD, Arc::new(RateConverter::new([weth])));
            iau.add_minter(owner, router.address()).unwrap();

            Self {
                owner,
                alice,
                weth,
                wsteth,
                iau,
                share,
                vault,
                book,
                rates,
                router,
            }
        }

        fn deposit(&mut self, asset: Address, amount: Amount) -> ProtocolResult<Amount> {
            let ctx = DepositContext {
                share_ledger: &mut self.iau,
                vault_share: &mut self.share,
                vault: &self.vault,
                assets: &mut self.book,
                rates: &self.rates,
            };
            self.router.deposit(self.alice, asset, amount, ctx)
        }
    }

    #[test]
    fn underlying_deposit_mints_shares() {
        let mut f = Fixture::new();
        let shares = f.deposit(f.wsteth, WAD).unwrap();

        assert_eq!(shares, WAD);
        assert_eq!(f.share.balance_of(f.alice), WAD);
        assert_eq!(f.share.total_assets(&f.iau), WAD);
        assert_eq!(f.book.balance_of(f.wsteth, f.vault.address()), WAD);
        assert_eq!(
            f.router.events().last(),
            Some(&RouterEvent::Deposited {
                depositor: f.alice,
                asset: f.wsteth,
                underlying_amount: WAD,
                shares: WAD,
            })
        );
    }

    #[test]
    fn paused_router_rejects() {
        let mut f = Fixture::new();
        f.router.set_pause(f.owner, true).unwrap();
        assert_eq!(f.deposit(f.wsteth, WAD), Err(ProtocolError::EnforcedPause));
    }

    #[test]
    fn asset_must_be_allowable() {
        let mut f = Fixture::new();
        assert_eq!(
            f.deposit(f.weth, WAD),
            Err(ProtocolError::NotAllowableAsset(f.weth))
        );
    }

    #[test]
    fn allowable_but_unconvertible_asset() {
        let mut f = Fixture::new();
        let other = Address::from_label("other");
        f.book.register_token(other, "OTH", 18).unwrap();
        f.rates
            .update(f.owner, other, Arc::new(FixedRate(WAD)))
            .unwrap();
        f.vault
            .add_allowable_asset(f.owner, other, &f.book, &f.rates)
            .unwrap();
        assert_eq!(
            f.deposit(other, WAD),
            Err(ProtocolError::ConversionToUnderlyingFailed(other))
        );
    }

    #[test]
    fn convertible_asset_is_valued_at_rate() {
        let mut f = Fixture::new();
        f.vault
            .add_allowable_asset(f.owner, f.weth, &f.book, &f.rates)
            .unwrap();
        f.rates
            .update(f.owner, f.wsteth, Arc::new(FixedRate(2 * WAD)))
            .unwrap();
        // 1 WETH buys half a wstETH
        let shares = f.deposit(f.weth, WAD).unwrap();
        assert_eq!(shares, WAD / 2);
        assert_eq!(f.book.balance_of(f.weth, f.vault.address()), WAD);
    }

    #[test]
    fn six_decimal_asset_is_scaled_before_pricing() {
        let mut f = Fixture::new();
        let usdc = Address::from_label("usdc");
        f.book.register_token(usdc, "USDC", 6).unwrap();
        f.book.mint(usdc, f.alice, 5_000_000).unwrap();
        f.rates
            .update(f.owner, usdc, Arc::new(FixedRate(WAD)))
            .unwrap();
        f.vault
            .add_allowable_asset(f.owner, usdc, &f.book, &f.rates)
            .unwrap();
        f.router = Router::new(f.owner, 100 * WAD, Arc::new(RateConverter::new([usdc])));
        f.iau.add_minter(f.owner, f.router.address()).unwrap();

        // 1.0 USDC at parity is one whole share, not 1e6 wei of one
        let shares = f.deposit(usdc, 1_000_000).unwrap();
        assert_eq!(shares, WAD);
        assert_eq!(f.share.total_assets(&f.iau), WAD);
        assert_eq!(f.book.balance_of(usdc, f.vault.address()), 1_000_000);
        assert_eq!(f.book.balance_of(usdc, f.alice), 4_000_000);
    }

    #[test]
    fn deposit_cap_is_inclusive() {
        let mut f = Fixture::new();
        f.deposit(f.wsteth, WAD).unwrap();

        f.router.set_deposit_cap(f.owner, 19 * WAD / 10).unwrap();
        assert_eq!(
            f.deposit(f.wsteth, WAD),
            Err(ProtocolError::DepositCapExceeded {
                total: 2 * WAD,
                cap: 19 * WAD / 10
            })
        );

        f.router.set_deposit_cap(f.owner, 2 * WAD).unwrap();
        f.deposit(f.wsteth, WAD).unwrap();
        assert!(matches!(
            f.deposit(f.wsteth, WAD),
            Err(ProtocolError::DepositCapExceeded { .. })
        ));
    }

    #[test]
    fn zero_deposit_mints_nothing() {
        let mut f = Fixture::new();
        assert_eq!(f.deposit(f.wsteth, 0), Err(ProtocolError::NoSharesMinted));
    }

    #[test]
    fn failed_settlement_rolls_back() {
        let mut f = Fixture::new();
        let before = (f.iau.clone(), f.share.clone(), f.book.clone());
        // alice only holds 100 wstETH
        f.router.set_deposit_cap(f.owner, Amount::MAX).unwrap();
        assert!(matches!(
            f.deposit(f.wsteth, 101 * WAD),
            Err(ProtocolError::InsufficientBalance { .. })
        ));
        assert_eq!((f.iau.clone(), f.share.clone(), f.book.clone()), before);
    }

    #[test]
    fn router_must_be_minter() {
        let mut f = Fixture::new();
        f.iau.remove_minter(f.owner, f.router.address()).unwrap();
        assert_eq!(
            f.deposit(f.wsteth, WAD),
            Err(ProtocolError::Unauthorized(f.router.address()))
        );
        assert_eq!(f.book.balance_of(f.wsteth, f.alice), 100 * WAD);
    }
}
