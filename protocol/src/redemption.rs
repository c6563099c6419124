//! # Redemption Queue
//!
//! Vault shares leave the system through a queue, not through the vault
//! share itself. A redemption goes through two calls:
//!
//! 1. `redeem` pulls the shares into the queue and records a request
//!    with the conversion preview and the underlying's rate at that time.
//! 2. `finalize_redeem`, once the waiting period has elapsed, prices the
//!    shares again at the current rate, applies the redemption fee and
//!    pays the net amount from the custody vault. Only the net amount of
//!    Share-Ledger backing is burned; the fee and any rate remainder are
//!    handed back to the vault share.
//!
//! Between the two calls the shares stay in the queue and keep their
//! exposure to accounting: a redeemer bears or benefits from any
//! mark-to-market that lands in between. If the underlying's own rate
//! rises in the meantime the payout shrinks so the value handed out does
//! not exceed the value locked at request time; if it falls the redeemer
//! takes the loss.
//!
//! Requests are kept per account in a `Vec` and addressed by index.
//! Settling a request swap-removes it: the last request moves into the
//! freed slot. Callers that settle several requests should re-read
//! [`RedemptionQueue::pending_redeems`] between calls.
//!
//! The queue must hold the Share-Ledger minter capability and be the
//! custody vault's bound redemption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{Ownable, PauseFlag};
use crate::clock::Clock;
use crate::config::{ensure_fee, ProtocolParams};
use crate::custody::assets::AssetBook;
use crate::custody::rates::RateProviderRegistry;
use crate::custody::vault::CustodyVault;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::EventLog;
use crate::ledger::share::ShareLedger;
use crate::ledger::vault_share::VaultShare;
use crate::math::{apply_bps, checked_add, mul_div};
use crate::types::{Address, Amount, Bps};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One outstanding redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// When the request was made.
    pub request_time: DateTime<Utc>,
    /// Vault shares held by the queue for this request.
    pub shares: Amount,
    /// Share-Ledger units the shares were worth at request time.
    pub assets: Amount,
    /// Rate of the underlying at request time.
    pub base_rate: Amount,
}

/// Events emitted by [`RedemptionQueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionEvent {
    /// A request was queued.
    Redeemed {
        /// Requesting account.
        redeemer: Address,
        /// Shares pulled into the queue.
        shares: Amount,
        /// Preview at request time.
        assets: Amount,
    },
    /// A request was settled.
    RedeemFinalized {
        /// Paid account.
        redeemer: Address,
        /// Underlying paid out.
        net_amount: Amount,
        /// Underlying withheld as fee.
        fee: Amount,
    },
}

/// Ledgers and collaborators a redemption touches.
pub struct RedemptionContext<'a> {
    /// Share Ledger; the queue burns here.
    pub share_ledger: &'a mut ShareLedger,
    /// Vault share being redeemed.
    pub vault_share: &'a mut VaultShare,
    /// Custody vault paying out.
    pub vault: &'a CustodyVault,
    /// External balances.
    pub assets: &'a mut AssetBook,
    /// Source of the underlying's rate.
    pub rates: &'a RateProviderRegistry,
}

// ---------------------------------------------------------------------------
// RedemptionQueue
// ---------------------------------------------------------------------------

/// The redemption queue.
#[derive(Debug, Clone)]
pub struct RedemptionQueue {
    address: Address,
    ownable: Ownable,
    pause: PauseFlag,
    min_redeem: Amount,
    waiting_period_secs: u64,
    redemption_fee_bps: Bps,
    requests: BTreeMap<Address, Vec<RedemptionRequest>>,
    redeeming: BTreeMap<Address, Amount>,
    events: EventLog<RedemptionEvent>,
    clock: Arc<dyn Clock>,
}

impl RedemptionQueue {
    /// Creates a queue for `vault` using the redemption fields of `params`.
    pub fn new(
        owner: Address,
        vault: &CustodyVault,
        params: &ProtocolParams,
        clock: Arc<dyn Clock>,
    ) -> ProtocolResult<Self> {
        params.validate()?;
        Ok(Self {
            address: Address::from_label(&format!("Redemption_{}", vault.address())),
            ownable: Ownable::new(owner),
            pause: PauseFlag::default(),
            min_redeem: params.min_redeem,
            waiting_period_secs: params.waiting_period_secs,
            redemption_fee_bps: params.redemption_fee_bps,
            requests: BTreeMap::new(),
            redeeming: BTreeMap::new(),
            events: EventLog::new(),
            clock,
        })
    }

    /// The queue's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<RedemptionEvent> {
        &self.events
    }

    // -- parameters --------------------------------------------------------

    /// Smallest accepted request, in shares.
    pub fn min_redeem(&self) -> Amount {
        self.min_redeem
    }

    /// Waiting period in seconds.
    pub fn waiting_period_secs(&self) -> u64 {
        self.waiting_period_secs
    }

    /// Fee withheld at settlement, in bps.
    pub fn redemption_fee_bps(&self) -> Bps {
        self.redemption_fee_bps
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Owner-only.
    pub fn set_min_redeem(&mut self, caller: Address, min_redeem: Amount) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        info!(old = self.min_redeem, new = min_redeem, "min redeem updated");
        self.min_redeem = min_redeem;
        Ok(())
    }

    /// Owner-only. Applies to outstanding requests too.
    pub fn set_waiting_period(&mut self, caller: Address, secs: u64) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        info!(old = self.waiting_period_secs, new = secs, "waiting period updated");
        self.waiting_period_secs = secs;
        Ok(())
    }

    /// Owner-only, at most 10_000 bps.
    pub fn set_redemption_fee(&mut self, caller: Address, fee_bps: Bps) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        ensure_fee(fee_bps)?;
        info!(old = self.redemption_fee_bps, new = fee_bps, "redemption fee updated");
        self.redemption_fee_bps = fee_bps;
        Ok(())
    }

    /// Owner-only.
    pub fn set_pause(&mut self, caller: Address, paused: bool) -> ProtocolResult<()> {
        self.ownable.ensure_owner(caller)?;
        self.pause.set(paused);
        info!(paused, "redemption pause updated");
        Ok(())
    }

    // -- queries -----------------------------------------------------------

    /// Every outstanding request of `account`, by handle.
    pub fn pending_redeems(&self, account: Address) -> &[RedemptionRequest] {
        self.requests
            .get(&account)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The request at `index`.
    pub fn redeem_info(&self, account: Address, index: usize) -> ProtocolResult<RedemptionRequest> {
        self.pending_redeems(account)
            .get(index)
            .copied()
            .ok_or(ProtocolError::RedemptionNotFound { account, index })
    }

    /// Number of outstanding requests of `account`.
    pub fn redeem_length(&self, account: Address) -> usize {
        self.pending_redeems(account).len()
    }

    /// Shares `account` currently has queued.
    pub fn redeeming(&self, account: Address) -> Amount {
        self.redeeming.get(&account).copied().unwrap_or(0)
    }

    // -- entry points ------------------------------------------------------

    /// Queues `shares` of the caller's vault shares for redemption.
    ///
    /// The caller must have approved the queue on the vault share.
    pub fn redeem(
        &mut self,
        caller: Address,
        shares: Amount,
        mut ctx: RedemptionContext<'_>,
    ) -> ProtocolResult<()> {
        self.pause.ensure_not_paused()?;
        if shares < self.min_redeem {
            return Err(ProtocolError::MinimumNotMet {
                requested: shares,
                minimum: self.min_redeem,
            });
        }
        let assets = ctx.vault_share.preview_redeem(ctx.share_ledger, shares)?;
        let base_rate = ctx.rates.rate_of(ctx.vault.underlying())?;
        let redeeming = checked_add(self.redeeming(caller), shares)?;

        ctx.vault_share
            .transfer_from(self.address, caller, self.address, shares)?;

        self.requests.entry(caller).or_default().push(RedemptionRequest {
            request_time: self.clock.now(),
            shares,
            assets,
            base_rate,
        });
        self.redeeming.insert(caller, redeeming);
        self.events.emit(RedemptionEvent::Redeemed {
            redeemer: caller,
            shares,
            assets,
        });
        Ok(())
    }

    /// Settles the caller's request at `index` and returns the net payout.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::EnforcedPause`], [`ProtocolError::RedemptionNotFound`],
    /// [`ProtocolError::InWaitingPeriod`] and
    /// [`ProtocolError::InsufficientFundsInVault`], in that order. Nothing
    /// changes on failure.
    pub fn finalize_redeem(
        &mut self,
        caller: Address,
        index: usize,
        mut ctx: RedemptionContext<'_>,
    ) -> ProtocolResult<Amount> {
        self.pause.ensure_not_paused()?;
        let request = self.redeem_info(caller, index)?;
        self.ensure_waited(&request)?;

        let assets = ctx
            .vault_share
            .convert_to_assets(ctx.share_ledger, request.shares)?;
        let current_rate = ctx.rates.rate_of(ctx.vault.underlying())?;
        let payout = adjust_for_rate(assets, request.base_rate, current_rate)?;
        let fee = apply_bps(payout, self.redemption_fee_bps)?;
        let net_amount = payout - fee;

        let available = ctx.vault.underlying_balance(ctx.assets);
        if available < net_amount {
            warn!(%caller, index, required = net_amount, available, "redemption cannot be funded");
            return Err(ProtocolError::InsufficientFundsInVault {
                required: net_amount,
                available,
            });
        }

        let checkpoint = (
            ctx.share_ledger.clone(),
            ctx.vault_share.clone(),
            ctx.assets.clone(),
        );
        if let Err(e) = self.settle(caller, request.shares, net_amount, &mut ctx) {
            let (share_ledger, vault_share, assets) = checkpoint;
            *ctx.share_ledger = share_ledger;
            *ctx.vault_share = vault_share;
            *ctx.assets = assets;
            return Err(e);
        }

        let remaining = self.redeeming(caller).saturating_sub(request.shares);
        if remaining == 0 {
            self.redeeming.remove(&caller);
        } else {
            self.redeeming.insert(caller, remaining);
        }
        if let Some(queue) = self.requests.get_mut(&caller) {
            queue.swap_remove(index);
            if queue.is_empty() {
                self.requests.remove(&caller);
            }
        }

        self.events.emit(RedemptionEvent::RedeemFinalized {
            redeemer: caller,
            net_amount,
            fee,
        });
        Ok(net_amount)
    }

    fn ensure_waited(&self, request: &RedemptionRequest) -> ProtocolResult<()> {
        let elapsed = (self.clock.now() - request.request_time).num_seconds();
        let required = i64::try_from(self.waiting_period_secs).unwrap_or(i64::MAX);
        if elapsed < required {
            return Err(ProtocolError::InWaitingPeriod {
                remaining_secs: required - elapsed,
            });
        }
        Ok(())
    }

    fn settle(
        &self,
        redeemer: Address,
        shares: Amount,
        net_amount: Amount,
        ctx: &mut RedemptionContext<'_>,
    ) -> ProtocolResult<()> {
        let units = ctx.vault_share.redeem(
            ctx.share_ledger,
            self.address,
            shares,
            self.address,
            self.address,
        )?;
        ctx.share_ledger
            .burn_from(self.address, self.address, net_amount)?;
        // Fee and rate remainder go back to the remaining holders.
        let remainder = units.saturating_sub(net_amount);
        if remainder > 0 {
            ctx.share_ledger
                .transfer(self.address, ctx.vault_share.address(), remainder)?;
        }
        ctx.vault
            .pay_redemption(self.address, redeemer, net_amount, ctx.assets)
    }
}

/// Scales `assets` for drift in the underlying's rate since the request.
///
/// A higher rate means each unit of underlying is worth more, so fewer
/// units are paid. A lower rate passes the loss on.
fn adjust_for_rate(assets: Amount, base_rate: Amount, current_rate: Amount) -> ProtocolResult<Amount> {
    if current_rate > base_rate {
        mul_div(assets, base_rate, current_rate)
    } else if current_rate < base_rate {
        mul_div(assets, current_rate, base_rate)
    } else {
        Ok(assets)
    }
}
