//! # Vault Share
//!
//! The user-facing share, an ERC4626-style wrapper around the
//! [`ShareLedger`]. Deposits pull Share-Ledger units into the vault
//! share's own balance and mint shares; the price per share is
//! `total_assets / total_supply`, where `total_assets` is the vault
//! share's Share-Ledger balance. Accounting moves that balance, which is
//! how profit and loss reach share holders.
//!
//! Conversions use a virtual offset of one unit on both sides:
//!
//! ```text
//! shares = assets * (supply + 1) / (total_assets + 1)
//! assets = shares * (total_assets + 1) / (supply + 1)
//! ```
//!
//! Both round down.
//!
//! Ordinary holders cannot redeem. `redeem` is reserved for Share-Ledger
//! minters (the redemption queue), so every exit goes through the
//! waiting period.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::{CapabilitySet, Ownable};
use crate::error::{ProtocolError, ProtocolResult};
use crate::ledger::balance::BalanceLedger;
use crate::ledger::share::ShareLedger;
use crate::math::mul_div;
use crate::types::{Address, Amount};

/// The redeemable share token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultShare {
    address: Address,
    name: String,
    symbol: String,
    asset: Address,
    ownable: Ownable,
    blacklister: Address,
    blacklist: CapabilitySet,
    ledger: BalanceLedger,
}

impl VaultShare {
    /// Creates a vault share over `share_ledger`. The owner starts out as
    /// the blacklister.
    pub fn new(owner: Address, share_ledger: &ShareLedger, name: &str, symbol: &str) -> Self {
        Self {
            address: Address::from_label(&format!("VaultShare_{name}")),
            name: name.to_string(),
            symbol: symbol.to_string(),
            asset: share_ledger.address(),
            ownable: Ownable::new(owner),
            blacklister: owner,
            blacklist: CapabilitySet::new(),
            ledger: BalanceLedger::new(),
        }
    }

    /// This token's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Token name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Address of the wrapped Share Ledger.
    pub fn asset(&self) -> Address {
        self.asset
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Account allowed to edit the blacklist.
    pub fn blacklister(&self) -> Address {
        self.blacklister
    }

    // -- ERC20 views -------------------------------------------------------

    /// Share balance of `account`.
    pub fn balance_of(&self, account: Address) -> Amount {
        self.ledger.balance_of(account)
    }

    /// Shares in existence.
    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }

    /// Remaining allowance of `spender` over `owner`'s shares.
    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.ledger.allowance(owner, spender)
    }

    /// Sum over all holders. Always equal to [`total_supply`](Self::total_supply).
    pub fn sum_of_balances(&self) -> Amount {
        self.ledger.sum_of_balances()
    }

    // -- ERC4626 views -----------------------------------------------------

    /// Share-Ledger units backing all shares.
    pub fn total_assets(&self, share_ledger: &ShareLedger) -> Amount {
        share_ledger.balance_of(self.address)
    }

    /// Shares that `assets` units would buy.
    pub fn convert_to_shares(
        &self,
        share_ledger: &ShareLedger,
        assets: Amount,
    ) -> ProtocolResult<Amount> {
        mul_div(
            assets,
            self.total_supply().saturating_add(1),
            self.total_assets(share_ledger).saturating_add(1),
        )
    }

    /// Units that `shares` shares are worth.
    pub fn convert_to_assets(
        &self,
        share_ledger: &ShareLedger,
        shares: Amount,
    ) -> ProtocolResult<Amount> {
        mul_div(
            shares,
            self.total_assets(share_ledger).saturating_add(1),
            self.total_supply().saturating_add(1),
        )
    }

    /// Shares minted by depositing `assets` now.
    pub fn preview_deposit(
        &self,
        share_ledger: &ShareLedger,
        assets: Amount,
    ) -> ProtocolResult<Amount> {
        self.convert_to_shares(share_ledger, assets)
    }

    /// Units released by redeeming `shares` now.
    pub fn preview_redeem(
        &self,
        share_ledger: &ShareLedger,
        shares: Amount,
    ) -> ProtocolResult<Amount> {
        self.convert_to_assets(share_ledger, shares)
    }

    // -- blacklist ---------------------------------------------------------

    /// Returns `true` if `account` is barred from share transfers.
    pub fn is_blacklisted(&self, account: Address) -> bool {
        self.blacklist.contains(account)
    }

    /// Bars `account`. Blacklister-only.
    pub fn blacklist(&mut self, caller: Address, account: Address) -> ProtocolResult<()> {
        self.ensure_blacklister(caller)?;
        if self.blacklist.grant(account) {
            info!(share = %self.symbol, %account, "account blacklisted");
        }
        Ok(())
    }

    /// Lifts the bar on `account`. Blacklister-only.
    pub fn un_blacklist(&mut self, caller: Address, account: Address) -> ProtocolResult<()> {
        self.ensure_blacklister(caller)?;
        if self.blacklist.revoke(account) {
            info!(share = %self.symbol, %account, "account unblacklisted");
        }
        Ok(())
    }

    /// Replaces the blacklister. Owner-only.
    pub fn update_blacklister(&mut self, caller: Address, blacklister: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if blacklister.is_zero() {
            return Err(ProtocolError::InvalidAddress(blacklister));
        }
        info!(share = %self.symbol, old = %self.blacklister, new = %blacklister, "blacklister updated");
        self.blacklister = blacklister;
        Ok(())
    }

    // -- ERC20 movement ----------------------------------------------------

    /// Sets an allowance over the caller's shares.
    pub fn approve(&mut self, caller: Address, spender: Address, amount: Amount) -> ProtocolResult<()> {
        self.ensure_not_blacklisted(&[caller, spender])?;
        self.ledger.approve(caller, spender, amount);
        Ok(())
    }

    /// Moves the caller's own shares.
    pub fn transfer(&mut self, caller: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        self.ensure_not_blacklisted(&[caller, to])?;
        self.ledger.transfer(caller, to, amount)?;
        debug!(share = %self.symbol, from = %caller, %to, amount, "shares transferred");
        Ok(())
    }

    /// Moves shares on behalf of `from`.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> ProtocolResult<()> {
        self.ensure_not_blacklisted(&[caller, from, to])?;
        let available = self.ledger.balance_of(from);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                account: from,
                available,
                requested: amount,
            });
        }
        if to.is_zero() {
            return Err(ProtocolError::InvalidAddress(to));
        }
        if caller != from {
            self.ledger.spend_allowance(from, caller, amount)?;
        }
        self.ledger.transfer(from, to, amount)?;
        debug!(share = %self.symbol, %from, %to, amount, "shares transferred");
        Ok(())
    }

    // -- ERC4626 entry points ----------------------------------------------

    /// Pulls `assets` Share-Ledger units from `caller` and mints the
    /// corresponding shares to `receiver`.
    ///
    /// The caller must have approved the vault share on the Share Ledger,
    /// and the Share-Ledger movement must satisfy its minter rule (in
    /// practice the caller is the router or the accounting ledger).
    pub fn deposit(
        &mut self,
        share_ledger: &mut ShareLedger,
        caller: Address,
        assets: Amount,
        receiver: Address,
    ) -> ProtocolResult<Amount> {
        self.ensure_not_blacklisted(&[caller, receiver])?;
        if receiver.is_zero() {
            return Err(ProtocolError::InvalidAddress(receiver));
        }
        let shares = self.preview_deposit(share_ledger, assets)?;
        share_ledger.transfer_from(self.address, caller, self.address, assets)?;
        self.ledger.mint(receiver, shares)?;
        debug!(share = %self.symbol, %caller, %receiver, assets, shares, "deposit");
        Ok(shares)
    }

    /// Burns `shares` from `owner` and releases the backing Share-Ledger
    /// units to `receiver`. The caller must be a Share-Ledger minter.
    pub fn redeem(
        &mut self,
        share_ledger: &mut ShareLedger,
        caller: Address,
        shares: Amount,
        receiver: Address,
        owner: Address,
    ) -> ProtocolResult<Amount> {
        if !share_ledger.is_minter(caller) {
            return Err(ProtocolError::Unauthorized(caller));
        }
        self.ensure_not_blacklisted(&[caller, owner, receiver])?;
        let assets = self.preview_redeem(share_ledger, shares)?;
        let available = self.ledger.balance_of(owner);
        if available < shares {
            return Err(ProtocolError::InsufficientBalance {
                account: owner,
                available,
                requested: shares,
            });
        }
        if caller != owner {
            self.ledger.spend_allowance(owner, caller, shares)?;
        }
        self.ledger.burn(owner, shares)?;
        share_ledger.transfer(self.address, receiver, assets)?;
        debug!(share = %self.symbol, %owner, %receiver, shares, assets, "redeem");
        Ok(assets)
    }

    fn ensure_blacklister(&self, caller: Address) -> ProtocolResult<()> {
        if caller != self.blacklister {
            return Err(ProtocolError::Unauthorized(caller));
        }
        Ok(())
    }

    fn ensure_not_blacklisted(&self, accounts: &[Address]) -> ProtocolResult<()> {
        match accounts.iter().find(|a| self.blacklist.contains(**a)) {
            Some(account) => Err(ProtocolError::AccountBlacklisted(*account)),
            None => Ok(()),
        }
    }
}
