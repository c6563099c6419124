//! # Protocol Configuration & Constants
//!
//! Every magic number in Canopy lives here. Fees, bounds and periods are
//! owner-mutable at runtime, but they all start from the defaults below,
//! and [`ProtocolParams`] is the one document an operator edits to change
//! them at bootstrap.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Amount, Bps};

// ---------------------------------------------------------------------------
// Fixed Point
// ---------------------------------------------------------------------------

/// One whole unit in 18-decimal fixed point. Rates use the same scale:
/// a rate of `WAD` means parity with the base asset.
pub const WAD: Amount = 1_000_000_000_000_000_000;

/// Basis-point denominator. 10_000 bps = 100%.
pub const BPS_DENOMINATOR: Amount = 10_000;

/// Upper bound for any fee or deviation expressed in bps.
pub const MAX_FEE_BPS: Bps = 10_000;

/// Assets with more decimals than this cannot be normalized to 18-decimal
/// NAV without losing precision, so the custody vault refuses them.
pub const MAX_ASSET_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

/// Seconds in a day. Used to build the periods below.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default delay between a redemption request and its settlement.
/// A week gives the operator time to unwind strategy positions.
pub const DEFAULT_WAITING_PERIOD_SECS: u64 = 7 * SECONDS_PER_DAY;

/// Default minimum redemption: one whole share.
pub const DEFAULT_MIN_REDEEM: Amount = WAD;

/// Default redemption fee. Zero until governance decides otherwise.
pub const DEFAULT_REDEMPTION_FEE_BPS: Bps = 0;

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// Default protocol fee skimmed from measured profit (20%).
pub const DEFAULT_PROTOCOL_FEE_BPS: Bps = 2_000;

/// Default NAV deviation bound (2%). A reconciliation that moves the
/// recorded NAV by more than this is refused until someone looks at it.
pub const DEFAULT_DEVIATION_BPS: Bps = 200;

// ---------------------------------------------------------------------------
// Deposits
// ---------------------------------------------------------------------------

/// Default deposit cap, in underlying units.
pub const DEFAULT_DEPOSIT_CAP: Amount = 15_000 * WAD;

// ---------------------------------------------------------------------------
// ProtocolParams
// ---------------------------------------------------------------------------

/// Bootstrap parameters for a deployment.
///
/// Missing fields fall back to the constants above, so an operator only
/// writes down what differs from the defaults:
///
/// ```
/// use canopy_protocol::config::ProtocolParams;
///
/// let params = ProtocolParams::from_json(r#"{ "redemption_fee_bps": 5 }"#).unwrap();
/// assert_eq!(params.redemption_fee_bps, 5);
/// assert_eq!(params.deviation_bps, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Maximum total assets the vault share may hold after a deposit.
    pub deposit_cap: Amount,
    /// Share of measured profit minted to the treasury.
    pub protocol_fee_bps: Bps,
    /// NAV reconciliation circuit-breaker bound.
    pub deviation_bps: Bps,
    /// Smallest redemption request accepted.
    pub min_redeem: Amount,
    /// Delay before a redemption request can settle.
    pub waiting_period_secs: u64,
    /// Fee withheld from redemption payouts.
    pub redemption_fee_bps: Bps,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            deposit_cap: DEFAULT_DEPOSIT_CAP,
            protocol_fee_bps: DEFAULT_PROTOCOL_FEE_BPS,
            deviation_bps: DEFAULT_DEVIATION_BPS,
            min_redeem: DEFAULT_MIN_REDEEM,
            waiting_period_secs: DEFAULT_WAITING_PERIOD_SECS,
            redemption_fee_bps: DEFAULT_REDEMPTION_FEE_BPS,
        }
    }
}

impl ProtocolParams {
    /// Parses and validates a JSON parameter document.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| ProtocolError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Rejects fees and bounds above 100%.
    pub fn validate(&self) -> ProtocolResult<()> {
        ensure_fee(self.protocol_fee_bps)?;
        ensure_fee(self.redemption_fee_bps)?;
        ensure_fee(self.deviation_bps)?;
        Ok(())
    }
}

/// Fails with [`ProtocolError::InvalidFee`] above [`MAX_FEE_BPS`].
pub fn ensure_fee(bps: Bps) -> ProtocolResult<()> {
    if bps > MAX_FEE_BPS {
        return Err(ProtocolError::InvalidFee(bps));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let params = ProtocolParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.waiting_period_secs, 7 * 86_400);
        assert_eq!(params.deviation_bps, 200);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let params = ProtocolParams::from_json(r#"{ "min_redeem": 1 }"#).unwrap();
        assert_eq!(params.min_redeem, 1);
        assert_eq!(params.protocol_fee_bps, DEFAULT_PROTOCOL_FEE_BPS);
    }

    #[test]
    fn fee_above_hundred_percent_rejected() {
        let result = ProtocolParams::from_json(r#"{ "protocol_fee_bps": 10001 }"#);
        assert_eq!(result, Err(ProtocolError::InvalidFee(10_001)));
    }

    #[test]
    fn garbage_document_rejected() {
        assert!(matches!(
            ProtocolParams::from_json("not json"),
            Err(ProtocolError::InvalidConfig(_))
        ));
    }
}
