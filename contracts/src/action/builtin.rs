//! Built-in actions that move capital between the custody vault and a
//! strategy. Calldata for both is a bincode-encoded [`TransferCall`].

use serde::{Deserialize, Serialize};

use canopy_protocol::{Address, Amount};

use crate::action::{Action, ExecutionContext};
use crate::error::{ContractError, ContractResult};

/// Asset and amount to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCall {
    /// Token to move.
    pub asset: Address,
    /// Amount in the token's smallest unit.
    pub amount: Amount,
}

impl TransferCall {
    /// Encodes the call as action calldata.
    pub fn encode(&self) -> ContractResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ContractError::InvalidCalldata(e.to_string()))
    }

    /// Decodes action calldata.
    pub fn decode(calldata: &[u8]) -> ContractResult<Self> {
        bincode::deserialize(calldata).map_err(|e| ContractError::InvalidCalldata(e.to_string()))
    }
}

/// Pulls an asset out of the custody vault into the strategy. The vault
/// checks that the strategy is active and whitelisted for the asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultPull;

impl Action for VaultPull {
    fn name(&self) -> &'static str {
        "VaultPull"
    }

    fn execute(
        &self,
        ctx: &mut ExecutionContext<'_>,
        calldata: &[u8],
        _hints: &[u8],
    ) -> ContractResult<()> {
        let call = TransferCall::decode(calldata)?;
        ctx.vault
            .withdraw(ctx.strategy, call.asset, call.amount, ctx.registry, ctx.assets)?;
        Ok(())
    }
}

/// Returns an asset from the strategy to the custody vault.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultPush;

impl Action for VaultPush {
    fn name(&self) -> &'static str {
        "VaultPush"
    }

    fn execute(
        &self,
        ctx: &mut ExecutionContext<'_>,
        calldata: &[u8],
        _hints: &[u8],
    ) -> ContractResult<()> {
        let call = TransferCall::decode(calldata)?;
        ctx.assets
            .transfer(call.asset, ctx.strategy, ctx.vault.address(), call.amount)?;
        tracing::info!(strategy = %ctx.strategy, asset = %call.asset, amount = call.amount, "capital returned to vault");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_roundtrip() {
        let call = TransferCall {
            asset: Address::from_label("wsteth"),
            amount: 42,
        };
        let bytes = call.encode().unwrap();
        assert_eq!(TransferCall::decode(&bytes).unwrap(), call);
    }

    #[test]
    fn garbage_calldata_rejected() {
        assert!(matches!(
            TransferCall::decode(&[0x00, 0x00]),
            Err(ContractError::InvalidCalldata(_))
        ));
    }
}
