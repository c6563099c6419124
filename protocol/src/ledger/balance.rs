//! Plain balance bookkeeping shared by every fungible ledger.
//!
//! [`BalanceLedger`] enforces exactly one thing: the sum of all balances
//! equals the recorded total supply. Who may call what is decided by the
//! wrapping ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ProtocolError, ProtocolResult};
use crate::math::checked_add;
use crate::types::{Address, Amount};

/// Account balances, allowances and total supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLedger {
    balances: BTreeMap<Address, Amount>,
    /// `owner -> spender -> remaining allowance`.
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    total_supply: Amount,
}

impl BalanceLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account`, zero if unknown.
    pub fn balance_of(&self, account: Address) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Recorded total supply.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Remaining amount `spender` may move out of `owner`'s balance.
    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances
            .get(&owner)
            .and_then(|s| s.get(&spender))
            .copied()
            .unwrap_or(0)
    }

    /// Sets the allowance of `spender` over `owner`'s balance.
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, amount);
    }

    /// Consumes `amount` of allowance. `Amount::MAX` is treated as infinite.
    pub fn spend_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> ProtocolResult<()> {
        let allowed = self.allowance(owner, spender);
        if allowed == Amount::MAX {
            return Ok(());
        }
        if allowed < amount {
            return Err(ProtocolError::InsufficientAllowance {
                spender,
                allowed,
                requested: amount,
            });
        }
        self.approve(owner, spender, allowed - amount);
        Ok(())
    }

    /// Creates `amount` units in `to`.
    pub fn mint(&mut self, to: Address, amount: Amount) -> ProtocolResult<()> {
        if to.is_zero() {
            return Err(ProtocolError::InvalidAddress(to));
        }
        let new_supply = checked_add(self.total_supply, amount)?;
        let new_balance = checked_add(self.balance_of(to), amount)?;
        self.total_supply = new_supply;
        self.balances.insert(to, new_balance);
        Ok(())
    }

    /// Destroys `amount` units held by `from`.
    pub fn burn(&mut self, from: Address, amount: Amount) -> ProtocolResult<()> {
        let balance = self.ensure_balance(from, amount)?;
        self.set_balance(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    /// Moves `amount` from `from` to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        if to.is_zero() {
            return Err(ProtocolError::InvalidAddress(to));
        }
        let from_balance = self.ensure_balance(from, amount)?;
        if from == to {
            return Ok(());
        }
        let to_balance = checked_add(self.balance_of(to), amount)?;
        self.set_balance(from, from_balance - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    /// Sum of every balance. Equal to [`total_supply`](Self::total_supply)
    /// in every reachable state.
    pub fn sum_of_balances(&self) -> Amount {
        self.balances.values().fold(0, |acc, b| acc.saturating_add(*b))
    }

    /// Accounts with a non-zero balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    fn ensure_balance(&self, account: Address, amount: Amount) -> ProtocolResult<Amount> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                account,
                available,
                requested: amount,
            });
        }
        Ok(available)
    }

    fn set_balance(&mut self, account: Address, balance: Amount) {
        if balance == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}
