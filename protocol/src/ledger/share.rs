//! # Share Ledger (Internal Accounting Unit)
//!
//! The base unit of account behind the vault share. It looks like a token
//! but is not one: every balance movement needs a minter somewhere in the
//! picture.
//!
//! - `mint_to` / `burn_from`: the caller must be a minter.
//! - `transfer` / `transfer_from`: at least one of caller, sender or
//!   receiver must be a minter.
//!
//! Minters are managed by the owner. The timelock can replace itself, so a
//! governance timelock can take over from the owner without the owner's
//! help.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::{CapabilitySet, Ownable};
use crate::error::{ProtocolError, ProtocolResult};
use crate::ledger::balance::BalanceLedger;
use crate::types::{Address, Amount};

/// The capability-restricted internal accounting unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    address: Address,
    name: String,
    symbol: String,
    underlying: Address,
    ownable: Ownable,
    timelock: Address,
    minters: CapabilitySet,
    ledger: BalanceLedger,
}

impl ShareLedger {
    /// Creates the ledger for `underlying`.
    ///
    /// Name and symbol are derived from the underlying token's:
    /// `InternalAccountingUnit_<name>` and `IAU_<symbol>`. The timelock
    /// starts out as the owner.
    pub fn new(
        owner: Address,
        underlying: Address,
        underlying_name: &str,
        underlying_symbol: &str,
    ) -> Self {
        let name = format!("InternalAccountingUnit_{underlying_name}");
        Self {
            address: Address::from_label(&name),
            symbol: format!("IAU_{underlying_symbol}"),
            name,
            underlying,
            ownable: Ownable::new(owner),
            timelock: owner,
            minters: CapabilitySet::new(),
            ledger: BalanceLedger::new(),
        }
    }

    // -- identity ----------------------------------------------------------

    /// This ledger's own address.
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

    /// The asset one unit stands for.
    pub fn underlying(&self) -> Address {
        self.underlying
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Current timelock.
    pub fn timelock(&self) -> Address {
        self.timelock
    }

    // -- ERC20 views -------------------------------------------------------

    /// Balance of `account`.
    pub fn balance_of(&self, account: Address) -> Amount {
        self.ledger.balance_of(account)
    }

    /// Total units in existence.
    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }

    /// Remaining allowance of `spender` over `owner`.
    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.ledger.allowance(owner, spender)
    }

    /// Sum over all accounts. Always equal to [`total_supply`](Self::total_supply).
    pub fn sum_of_balances(&self) -> Amount {
        self.ledger.sum_of_balances()
    }

    // -- capability management ---------------------------------------------

    /// Returns `true` if `account` holds the minter capability.
    pub fn is_minter(&self, account: Address) -> bool {
        self.minters.contains(account)
    }

    /// Grants the minter capability. Owner-only.
    pub fn add_minter(&mut self, caller: Address, account: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if account.is_zero() {
            return Err(ProtocolError::InvalidAddress(account));
        }
        if self.minters.grant(account) {
            info!(ledger = %self.symbol, minter = %account, "minter added");
        }
        Ok(())
    }

    /// Revokes the minter capability. Owner-only. Removing the last minter
    /// is allowed and freezes every balance.
    pub fn remove_minter(&mut self, caller: Address, account: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if self.minters.revoke(account) {
            info!(ledger = %self.symbol, minter = %account, "minter removed");
        }
        Ok(())
    }

    /// Replaces the timelock. Callable by the owner or the current timelock.
    pub fn set_timelock(&mut self, caller: Address, timelock: Address) -> ProtocolResult<()> {
        if !self.ownable.is_owner(caller) && caller != self.timelock {
            return Err(ProtocolError::Unauthorized(caller));
        }
        if timelock.is_zero() {
            return Err(ProtocolError::InvalidAddress(timelock));
        }
        info!(ledger = %self.symbol, old = %self.timelock, new = %timelock, "timelock updated");
        self.timelock = timelock;
        Ok(())
    }

    // -- balance movement --------------------------------------------------

    /// Mints `amount` to `to`. The caller must be a minter.
    pub fn mint_to(&mut self, caller: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        self.ensure_minter(caller)?;
        self.ledger.mint(to, amount)?;
        debug!(ledger = %self.symbol, %to, amount, "minted");
        Ok(())
    }

    /// Burns `amount` held by `from`. The caller must be a minter.
    pub fn burn_from(
        &mut self,
        caller: Address,
        from: Address,
        amount: Amount,
    ) -> ProtocolResult<()> {
        self.ensure_minter(caller)?;
        self.ledger.burn(from, amount)?;
        debug!(ledger = %self.symbol, %from, amount, "burned");
        Ok(())
    }

    /// Sets an allowance. Approvals are unrestricted; spending them is not.
    pub fn approve(&mut self, caller: Address, spender: Address, amount: Amount) {
        self.ledger.approve(caller, spender, amount);
    }

    /// Moves the caller's own units.
    pub fn transfer(&mut self, caller: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        self.ensure_movement(caller, caller, to)?;
        self.ledger.transfer(caller, to, amount)?;
        debug!(ledger = %self.symbol, from = %caller, %to, amount, "transferred");
        Ok(())
    }

    /// Moves units on behalf of `from`, spending the caller's allowance
    /// unless the caller is `from`.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> ProtocolResult<()> {
        self.ensure_movement(caller, from, to)?;
        // Check the balance first so a failed transfer leaves the allowance intact.
        if self.ledger.balance_of(from) < amount {
            return Err(ProtocolError::InsufficientBalance {
                account: from,
                available: self.ledger.balance_of(from),
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
        debug!(ledger = %self.symbol, %from, %to, amount, "transferred");
        Ok(())
    }

    fn ensure_minter(&self, caller: Address) -> ProtocolResult<()> {
        if !self.minters.contains(caller) {
            return Err(ProtocolError::Unauthorized(caller));
        }
        Ok(())
    }

    fn ensure_movement(&self, caller: Address, from: Address, to: Address) -> ProtocolResult<()> {
        if self.minters.contains(caller) || self.minters.contains(from) || self.minters.contains(to)
        {
            Ok(())
        } else {
            Err(ProtocolError::Unauthorized(caller))
        }
    }
}
