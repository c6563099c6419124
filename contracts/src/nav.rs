//! # NAV Reconciliation
//!
//! Measures what the vault is worth and pushes the difference into the
//! accounting ledger.
//!
//! ```text
//! implied  = vault NAV + Σ strategy NAV
//! recorded = Share-Ledger balance of the vault share
//! ```
//!
//! If the two are further apart than the deviation bound the call is
//! refused. The bound is a circuit breaker against a stale or manipulated
//! NAV source; inside it, the source is trusted.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use canopy_protocol::accounting::AccountingLedger;
use canopy_protocol::access::Ownable;
use canopy_protocol::config::{ensure_fee, WAD};
use canopy_protocol::custody::{AssetBook, CustodyVault, RateProviderRegistry};
use canopy_protocol::ledger::{ShareLedger, VaultShare};
use canopy_protocol::math::{apply_bps, checked_add, deviation_bps, mul_div, to_wad};
use canopy_protocol::{Address, Amount, Bps, Direction, ProtocolError, ProtocolResult};

use crate::error::{ContractError, ContractResult};

// ---------------------------------------------------------------------------
// NAV sources
// ---------------------------------------------------------------------------

/// A strategy to value, and the tokens it holds directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyContext {
    /// Strategy address.
    pub strategy: Address,
    /// Tokens whose balances count towards the strategy's NAV.
    pub tokens: Vec<Address>,
}

/// Anything that can value the vault and its strategies, in underlying
/// units with 18 decimals.
pub trait NavSource {
    /// Value held by the custody vault.
    fn vault_nav(&self) -> ProtocolResult<Amount>;

    /// Value deployed in one strategy.
    fn strategy_nav(&self, context: &StrategyContext) -> ProtocolResult<Amount>;
}

/// Lending-market positions, already in underlying units.
pub trait LendingPositions {
    /// Collateral supplied by `account`.
    fn collateral_of(&self, account: Address) -> Amount;

    /// Debt owed by `account`.
    fn debt_of(&self, account: Address) -> Amount;
}

/// No lending positions anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLending;

impl LendingPositions for NoLending {
    fn collateral_of(&self, _account: Address) -> Amount {
        0
    }

    fn debt_of(&self, _account: Address) -> Amount {
        0
    }
}

/// Values balances from the asset book through the rate registry.
pub struct NavHelper<'a> {
    /// Custody vault whose allowable assets are counted.
    pub vault: &'a CustodyVault,
    /// External balances.
    pub assets: &'a AssetBook,
    /// Rates, quoted in the registry's base asset.
    pub rates: &'a RateProviderRegistry,
    /// Lending positions per strategy.
    pub lending: &'a dyn LendingPositions,
}

impl fmt::Debug for NavHelper<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavHelper")
            .field("vault", &self.vault.address())
            .field("underlying", &self.vault.underlying())
            .finish()
    }
}

impl NavHelper<'_> {
    /// `holder`'s balance of `token`, normalized to 18 decimals and
    /// converted into the underlying.
    pub fn value_of(&self, token: Address, holder: Address) -> ProtocolResult<Amount> {
        let balance = self.assets.balance_of(token, holder);
        if balance == 0 {
            return Ok(0);
        }
        let normalized = to_wad(balance, self.assets.decimals(token)?)?;
        let underlying = self.vault.underlying();
        if token == underlying {
            return Ok(normalized);
        }
        let in_base = mul_div(normalized, self.rates.rate_of(token)?, WAD)?;
        mul_div(in_base, WAD, self.rates.rate_of(underlying)?)
    }
}

impl NavSource for NavHelper<'_> {
    fn vault_nav(&self) -> ProtocolResult<Amount> {
        self.vault
            .allowable_assets()
            .into_iter()
            .try_fold(0, |total, token| {
                checked_add(total, self.value_of(token, self.vault.address())?)
            })
    }

    fn strategy_nav(&self, context: &StrategyContext) -> ProtocolResult<Amount> {
        let lending = self
            .lending
            .collateral_of(context.strategy)
            .saturating_sub(self.lending.debt_of(context.strategy));
        context.tokens.iter().try_fold(lending, |total, token| {
            checked_add(total, self.value_of(*token, context.strategy)?)
        })
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingReport {
    /// Share-Ledger balance of the vault share before the mark.
    pub recorded: Amount,
    /// Measured NAV.
    pub implied: Amount,
    /// Relative gap in bps.
    pub deviation_bps: Amount,
    /// Mark applied, if the NAV moved.
    pub direction: Option<Direction>,
    /// Units marked.
    pub amount: Amount,
    /// Units routed to the treasury.
    pub fee: Amount,
}

/// Reconciles recorded NAV with measured NAV. Must be the accounting
/// ledger's executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavReconciler {
    address: Address,
    ownable: Ownable,
    executor: Address,
    deviation_bps: Bps,
}

impl NavReconciler {
    /// Creates a reconciler with the given deviation bound.
    pub fn new(owner: Address, executor: Address, deviation_bps: Bps) -> ContractResult<Self> {
        ensure_fee(deviation_bps)?;
        Ok(Self {
            address: Address::from_label(&format!("NavReconciler_{owner}")),
            ownable: Ownable::new(owner),
            executor,
            deviation_bps,
        })
    }

    /// The address the accounting ledger must name as executor.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current deviation bound.
    pub fn deviation_bps(&self) -> Bps {
        self.deviation_bps
    }

    /// Current executor.
    pub fn executor(&self) -> Address {
        self.executor
    }

    /// Sets the deviation bound. Owner only.
    pub fn set_deviation(&mut self, caller: Address, deviation_bps: Bps) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        ensure_fee(deviation_bps)?;
        info!(old = self.deviation_bps, new = deviation_bps, "deviation bound updated");
        self.deviation_bps = deviation_bps;
        Ok(())
    }

    /// Replaces the executor. Owner only.
    pub fn update_executor(&mut self, caller: Address, executor: Address) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        self.executor = executor;
        Ok(())
    }

    /// Measures NAV across the vault and `contexts` and marks the
    /// difference. Owner or executor only.
    pub fn do_accounting(
        &self,
        caller: Address,
        contexts: &[StrategyContext],
        source: &dyn NavSource,
        accounting: &mut AccountingLedger,
        share_ledger: &mut ShareLedger,
        vault_share: &mut VaultShare,
    ) -> ContractResult<AccountingReport> {
        if !self.ownable.is_owner(caller) && caller != self.executor {
            return Err(ProtocolError::Unauthorized(caller).into());
        }

        let recorded = share_ledger.balance_of(vault_share.address());
        let implied = contexts.iter().try_fold(source.vault_nav()?, |total, ctx| {
            checked_add(total, source.strategy_nav(ctx)?)
        })?;

        let deviation = deviation_bps(implied, recorded)?;
        let deviation = match deviation {
            Some(bps) if bps <= Amount::from(self.deviation_bps) => bps,
            _ => {
                warn!(recorded, implied, ?deviation, bound = self.deviation_bps, "NAV deviation exceeded");
                return Err(ContractError::DeviationExceeded {
                    deviation,
                    bound: self.deviation_bps,
                });
            }
        };

        let (direction, amount, fee) = if implied > recorded {
            let delta = implied - recorded;
            let fee = apply_bps(delta, accounting.fee_bps())?;
            (Some(Direction::Mint), delta - fee, fee)
        } else if implied < recorded {
            (Some(Direction::Burn), recorded - implied, 0)
        } else {
            (None, 0, 0)
        };

        if let Some(direction) = direction {
            accounting.mark(self.address, direction, amount, fee, share_ledger, vault_share)?;
        }
        info!(recorded, implied, deviation, ?direction, amount, fee, "accounting reconciled");
        Ok(AccountingReport {
            recorded,
            implied,
            deviation_bps: deviation,
            direction,
            amount,
            fee,
        })
    }
}
