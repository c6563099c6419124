//! Multi-token balance book for external collateral.
//!
//! External tokens (the underlying, other deposit assets, anything a
//! strategy acquires) are tracked here rather than as separate ledgers, so
//! a whole set of balances can be checkpointed with a single `clone`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::ledger::balance::BalanceLedger;
use crate::types::{Address, Amount};

/// Metadata and balances of one external token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBook {
    /// Ticker, for logs.
    pub symbol: String,
    /// Decimal places of the token's smallest unit.
    pub decimals: u8,
    balances: BalanceLedger,
}

/// `token -> holder -> balance` for every registered external token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBook {
    tokens: BTreeMap<Address, TokenBook>,
}

impl AssetBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidAddress`] for the zero address,
    /// [`ProtocolError::Failed`] if the token is already registered.
    pub fn register_token(&mut self, token: Address, symbol: &str, decimals: u8) -> ProtocolResult<()> {
        if token.is_zero() {
            return Err(ProtocolError::InvalidAddress(token));
        }
        if self.tokens.contains_key(&token) {
            return Err(ProtocolError::Failed(format!("token {token} already registered")));
        }
        self.tokens.insert(
            token,
            TokenBook {
                symbol: symbol.to_string(),
                decimals,
                balances: BalanceLedger::new(),
            },
        );
        Ok(())
    }

    /// Returns `true` if `token` is registered.
    pub fn is_registered(&self, token: Address) -> bool {
        self.tokens.contains_key(&token)
    }

    /// Decimals of `token`.
    pub fn decimals(&self, token: Address) -> ProtocolResult<u8> {
        self.book(token).map(|b| b.decimals)
    }

    /// Symbol of `token`.
    pub fn symbol(&self, token: Address) -> ProtocolResult<&str> {
        self.book(token).map(|b| b.symbol.as_str())
    }

    /// Balance of `holder` in `token`; zero for unknown tokens.
    pub fn balance_of(&self, token: Address, holder: Address) -> Amount {
        self.tokens
            .get(&token)
            .map(|b| b.balances.balance_of(holder))
            .unwrap_or(0)
    }

    /// Supply of `token`; zero for unknown tokens.
    pub fn total_supply(&self, token: Address) -> Amount {
        self.tokens
            .get(&token)
            .map(|b| b.balances.total_supply())
            .unwrap_or(0)
    }

    /// Sum of all holders of `token`. Equals its total supply.
    pub fn sum_of_balances(&self, token: Address) -> Amount {
        self.tokens
            .get(&token)
            .map(|b| b.balances.sum_of_balances())
            .unwrap_or(0)
    }

    /// Creates `amount` of `token` in `to`.
    pub fn mint(&mut self, token: Address, to: Address, amount: Amount) -> ProtocolResult<()> {
        self.book_mut(token)?.balances.mint(to, amount)?;
        debug!(%token, %to, amount, "asset minted");
        Ok(())
    }

    /// Destroys `amount` of `token` held by `from`.
    pub fn burn(&mut self, token: Address, from: Address, amount: Amount) -> ProtocolResult<()> {
        self.book_mut(token)?.balances.burn(from, amount)?;
        debug!(%token, %from, amount, "asset burned");
        Ok(())
    }

    /// Moves `amount` of `token` between holders.
    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> ProtocolResult<()> {
        self.book_mut(token)?.balances.transfer(from, to, amount)?;
        debug!(%token, %from, %to, amount, "asset transferred");
        Ok(())
    }

    fn book(&self, token: Address) -> ProtocolResult<&TokenBook> {
        self.tokens
            .get(&token)
            .ok_or_else(|| ProtocolError::Failed(format!("unknown token {token}")))
    }

    fn book_mut(&mut self, token: Address) -> ProtocolResult<&mut TokenBook> {
        self.tokens
            .get_mut(&token)
            .ok_or_else(|| ProtocolError::Failed(format!("unknown token {token}")))
    }
}
