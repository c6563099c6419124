//! # Accounting Ledger
//!
//! Mark-to-market for the Share Ledger. When the measured NAV moves, the
//! Share-Ledger balance of the vault share is corrected to match it, which
//! moves the vault share's price per share.
//!
//! A profit mark does two things, in this order:
//!
//! 1. mints `fee` units and deposits them into the vault share for the
//!    treasury, priced at the pre-profit rate;
//! 2. mints `amount` units straight to the vault share.
//!
//! A loss mark burns `amount` units from the vault share.
//!
//! The accounting ledger must hold the Share-Ledger minter capability.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::Ownable;
use crate::config::ensure_fee;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::EventLog;
use crate::ledger::share::ShareLedger;
use crate::ledger::vault_share::VaultShare;
use crate::types::{Address, Amount, Bps, Direction};

/// Events emitted by [`AccountingLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingEvent {
    /// A mark was applied.
    Marked {
        /// Mint or burn.
        direction: Direction,
        /// Share-Ledger units minted to, or burned from, the vault share.
        amount: Amount,
        /// Share-Ledger units converted into treasury shares.
        fee: Amount,
    },
}

/// The accounting ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingLedger {
    address: Address,
    ownable: Ownable,
    executor: Address,
    treasury: Address,
    fee_bps: Bps,
    events: EventLog<AccountingEvent>,
}

impl AccountingLedger {
    /// Creates the ledger for `vault_share`.
    pub fn new(
        owner: Address,
        vault_share: &VaultShare,
        treasury: Address,
        executor: Address,
        fee_bps: Bps,
    ) -> ProtocolResult<Self> {
        ensure_fee(fee_bps)?;
        if treasury.is_zero() {
            return Err(ProtocolError::InvalidAddress(treasury));
        }
        Ok(Self {
            address: Address::from_label(&format!("Accounting_{}", vault_share.address())),
            ownable: Ownable::new(owner),
            executor,
            treasury,
            fee_bps,
            events: EventLog::new(),
        })
    }

    /// The ledger's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Account allowed to mark besides the owner.
    pub fn executor(&self) -> Address {
        self.executor
    }

    /// Recipient of fee shares.
    pub fn treasury(&self) -> Address {
        self.treasury
    }

    /// Protocol fee on profit, in bps.
    pub fn fee_bps(&self) -> Bps {
        self.fee_bps
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<AccountingEvent> {
        &self.events
    }

    /// Replaces the executor. Owner-only.
    pub fn update_executor(&mut self, caller: Address, executor: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        info!(old = %self.executor, new = %executor, "accounting executor updated");
        self.executor = executor;
        Ok(())
    }

    /// Replaces the treasury. Owner-only.
    pub fn update_treasury(&mut self, caller: Address, treasury: Address) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        if treasury.is_zero() {
            return Err(ProtocolError::InvalidAddress(treasury));
        }
        info!(old = %self.treasury, new = %treasury, "treasury updated");
        self.treasury = treasury;
        Ok(())
    }

    /// Sets the protocol fee. Owner-only, at most 10_000 bps.
    pub fn set_fee(&mut self, caller: Address, fee_bps: Bps) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        ensure_fee(fee_bps)?;
        info!(old = self.fee_bps, new = fee_bps, "protocol fee updated");
        self.fee_bps = fee_bps;
        Ok(())
    }

    /// Applies a mark. Owner or executor only.
    ///
    /// `fee` is only meaningful on the mint path; a burn ignores it.
    /// Either both ledgers reflect the whole mark or neither changes.
    pub fn mark(
        &mut self,
        caller: Address,
        direction: Direction,
        amount: Amount,
        fee: Amount,
        share_ledger: &mut ShareLedger,
        vault_share: &mut VaultShare,
    ) -> ProtocolResult<()> {
        if !self.ownable.is_owner(caller) && caller != self.executor {
            return Err(ProtocolError::Unauthorized(caller));
        }

        let checkpoint = (share_ledger.clone(), vault_share.clone());
        let applied = match direction {
            Direction::Mint => self.apply_profit(amount, fee, share_ledger, vault_share),
            Direction::Burn => share_ledger.burn_from(self.address, vault_share.address(), amount),
        };
        if let Err(e) = applied {
            (*share_ledger, *vault_share) = checkpoint;
            return Err(e);
        }

        let fee = match direction {
            Direction::Mint => fee,
            Direction::Burn => 0,
        };
        self.events.emit(AccountingEvent::Marked {
            direction,
            amount,
            fee,
        });
        Ok(())
    }

    fn apply_profit(
        &self,
        amount: Amount,
        fee: Amount,
        share_ledger: &mut ShareLedger,
        vault_share: &mut VaultShare,
    ) -> ProtocolResult<()> {
        if fee > 0 {
            share_ledger.mint_to(self.address, self.address, fee)?;
            share_ledger.approve(self.address, vault_share.address(), fee);
            vault_share.deposit(share_ledger, self.address, fee, self.treasury)?;
        }
        share_ledger.mint_to(self.address, vault_share.address(), amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WAD;

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn treasury() -> Address {
        Address::from_label("treasury")
    }

    fn executor() -> Address {
        Address::from_label("executor")
    }

    /// Share-Ledger supply 10, vault-share supply 10.
    fn setup() -> (ShareLedger, VaultShare, AccountingLedger) {
        let mut iau = ShareLedger::new(owner(), Address::from_label("wsteth"), "wstETH", "wstETH");
        let mut share = VaultShare::new(owner(), &iau, "Canopy ETH", "cETH");
        let accounting = AccountingLedger::new(owner(), &share, treasury(), executor(), 0).unwrap();
        iau.add_minter(owner(), owner()).unwrap();
        iau.add_minter(owner(), accounting.address()).unwrap();
        iau.mint_to(owner(), owner(), 10 * WAD).unwrap();
        iau.approve(owner(), share.address(), Amount::MAX);
        share.deposit(&mut iau, owner(), 10 * WAD, owner()).unwrap();
        (iau, share, accounting)
    }

    #[test]
    fn mint_mark_pays_fee_in_shares() {
        let (mut iau, mut share, mut accounting) = setup();
        accounting
            .mark(owner(), Direction::Mint, 101 * WAD / 10, WAD / 10, &mut iau, &mut share)
            .unwrap();

        assert_eq!(share.total_supply(), 101 * WAD / 10);
        assert_eq!(iau.total_supply(), 202 * WAD / 10);
        assert_eq!(share.balance_of(treasury()), WAD / 10);
        assert_eq!(
            accounting.events().last(),
            Some(&AccountingEvent::Marked {
                direction: Direction::Mint,
                amount: 101 * WAD / 10,
                fee: WAD / 10,
            })
        );
    }

    #[test]
    fn burn_mark_absorbs_loss() {
        let (mut iau, mut share, mut accounting) = setup();
        accounting
            .mark(executor(), Direction::Burn, WAD, 0, &mut iau, &mut share)
            .unwrap();
        assert_eq!(share.total_supply(), 10 * WAD);
        assert_eq!(iau.total_supply(), 9 * WAD);
    }

    #[test]
    fn strangers_cannot_mark() {
        let (mut iau, mut share, mut accounting) = setup();
        let mallory = Address::from_label("mallory");
        assert_eq!(
            accounting.mark(mallory, Direction::Mint, WAD, 0, &mut iau, &mut share),
            Err(ProtocolError::Unauthorized(mallory))
        );
    }

    #[test]
    fn failed_mark_leaves_ledgers_untouched() {
        let (mut iau, mut share, mut accounting) = setup();
        let before = (iau.clone(), share.clone());
        // treasury blacklisted: fee deposit fails after the fee was minted
        share.blacklist(owner(), treasury()).unwrap();
        let before_blacklist = share.clone();
        assert_eq!(
            accounting.mark(owner(), Direction::Mint, WAD, WAD, &mut iau, &mut share),
            Err(ProtocolError::AccountBlacklisted(treasury()))
        );
        assert_eq!(iau, before.0);
        assert_eq!(share, before_blacklist);
        assert!(accounting.events().is_empty());
    }

    #[test]
    fn burn_beyond_backing_fails() {
        let (mut iau, mut share, mut accounting) = setup();
        assert!(matches!(
            accounting.mark(owner(), Direction::Burn, 11 * WAD, 0, &mut iau, &mut share),
            Err(ProtocolError::InsufficientBalance { .. })
        ));
        assert_eq!(iau.total_supply(), 10 * WAD);
    }

    #[test]
    fn parameter_setters_are_owner_only() {
        let (_, _, mut accounting) = setup();
        assert!(accounting.set_fee(executor(), 10).is_err());
        assert_eq!(accounting.set_fee(owner(), 10_001), Err(ProtocolError::InvalidFee(10_001)));
        accounting.set_fee(owner(), 2_000).unwrap();
        assert_eq!(accounting.fee_bps(), 2_000);

        assert!(accounting.update_treasury(owner(), Address::ZERO).is_err());
        let new_exec = Address::from_label("new-exec");
        accounting.update_executor(owner(), new_exec).unwrap();
        assert_eq!(accounting.executor(), new_exec);
    }
}
