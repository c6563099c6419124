//! # Strategies
//!
//! A strategy is an address that holds deployed capital. It never decides
//! anything itself: the [`executor::StrategyExecutor`] drives it one action
//! at a time, and each hop re-checks its own caller:
//!
//! ```text
//! executor member ──► StrategyExecutor ──► Strategy::call_execute ──► Strategy::execute ──► Action
//!   (executor set)      (whitelists)         (bound executor)          (self only)
//! ```
//!
//! The rescuer is the only other path that can move strategy-held funds.

pub mod executor;
pub mod storage;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use canopy_protocol::access::Ownable;
use canopy_protocol::custody::{AssetBook, CustodyVault, StrategyRegistry};
use canopy_protocol::{Address, Amount, ProtocolError};

use crate::action::{ActionBook, ExecutionContext};
use crate::error::{ContractError, ContractResult};

pub use executor::{ExecutionEnv, ExecutionEvent, StrategyExecutor};
pub use storage::{StorageEvent, StrategyRecord, StrategyStorage};

/// Sequential strategy identifier assigned by [`StrategyStorage`].
pub type StrategyId = u64;

/// A capital-holding strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    address: Address,
    ownable: Ownable,
    executor: Address,
    rescuer: Address,
}

impl Strategy {
    /// Creates a strategy bound to `executor`. The owner starts as rescuer.
    pub fn new(owner: Address, label: &str, executor: Address) -> Self {
        Self {
            address: Address::from_label(&format!("Strategy_{label}")),
            ownable: Ownable::new(owner),
            executor,
            rescuer: owner,
        }
    }

    /// The strategy's address. Its balances live under this address in
    /// the [`AssetBook`].
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    /// The only address allowed to call [`call_execute`](Self::call_execute).
    pub fn executor(&self) -> Address {
        self.executor
    }

    /// Current rescuer.
    pub fn rescuer(&self) -> Address {
        self.rescuer
    }

    /// Rebinds the executor. Owner only.
    pub fn set_strategy_executor(&mut self, caller: Address, executor: Address) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        if executor.is_zero() {
            return Err(ProtocolError::InvalidAddress(executor).into());
        }
        info!(strategy = %self.address, old = %self.executor, new = %executor, "strategy executor updated");
        self.executor = executor;
        Ok(())
    }

    /// Replaces the rescuer. Owner only.
    pub fn update_rescuer(&mut self, caller: Address, rescuer: Address) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        if rescuer.is_zero() {
            return Err(ProtocolError::InvalidAddress(rescuer).into());
        }
        self.rescuer = rescuer;
        Ok(())
    }

    /// Moves `amount` of `token` out of the strategy. Rescuer only.
    pub fn rescue_asset(
        &self,
        caller: Address,
        token: Address,
        to: Address,
        amount: Amount,
        assets: &mut AssetBook,
    ) -> ContractResult<()> {
        if caller != self.rescuer {
            return Err(ProtocolError::Unauthorized(caller).into());
        }
        if to.is_zero() {
            return Err(ProtocolError::InvalidAddress(to).into());
        }
        assets.transfer(token, self.address, to, amount)?;
        warn!(strategy = %self.address, %token, %to, amount, "strategy asset rescued");
        Ok(())
    }

    /// Runs the action deployed at `target` on behalf of this strategy.
    ///
    /// Only the bound executor may call this. A zero or unknown target and
    /// any failure inside the action surface as [`ContractError::Failed`].
    #[allow(clippy::too_many_arguments)]
    pub fn call_execute(
        &self,
        caller: Address,
        target: Address,
        calldata: &[u8],
        hints: &[u8],
        actions: &ActionBook,
        assets: &mut AssetBook,
        vault: &CustodyVault,
        registry: &dyn StrategyRegistry,
    ) -> ContractResult<()> {
        if caller != self.executor {
            return Err(ProtocolError::Unauthorized(caller).into());
        }
        if target.is_zero() {
            return Err(ContractError::Failed("call to zero address".into()));
        }
        let mut ctx = ExecutionContext {
            strategy: self.address,
            assets,
            vault,
            registry,
        };
        self.execute(self.address, target, calldata, hints, actions, &mut ctx)
    }

    /// Dispatches into the action at `target`. Callable by the strategy
    /// itself only, so nothing can drive it outside
    /// [`call_execute`](Self::call_execute).
    pub fn execute(
        &self,
        caller: Address,
        target: Address,
        calldata: &[u8],
        hints: &[u8],
        actions: &ActionBook,
        ctx: &mut ExecutionContext<'_>,
    ) -> ContractResult<()> {
        if caller != self.address {
            return Err(ProtocolError::Unauthorized(caller).into());
        }
        let action = actions
            .resolve(target)
            .ok_or_else(|| ContractError::Failed(format!("no action deployed at {target}")))?;
        action
            .execute(ctx, calldata, hints)
            .map_err(|e| ContractError::Failed(format!("{} reverted: {e}", action.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{TransferCall, VaultPush};
    use std::sync::Arc;

    struct NoStrategies;

    impl StrategyRegistry for NoStrategies {
        fn registry_address(&self) -> Address {
            Address::from_label("nobody")
        }
        fn is_active_strategy(&self, _: Address) -> bool {
            false
        }
        fn is_asset_whitelisted(&self, _: Address, _: Address) -> bool {
            false
        }
    }

    struct Fixture {
        owner: Address,
        executor: Address,
        weth: Address,
        strategy: Strategy,
        actions: ActionBook,
        push: Address,
        assets: AssetBook,
        vault: CustodyVault,
    }

    fn fixture() -> Fixture {
        let owner = Address::from_label("owner");
        let executor = Address::from_label("executor");
        let weth = Address::from_label("weth");
        let strategy = Strategy::new(owner, "lido", executor);
        let mut actions = ActionBook::new();
        let push = actions.deploy(Arc::new(VaultPush));
        let mut assets = AssetBook::new();
        assets.register_token(weth, "WETH", 18).unwrap();
        assets.mint(weth, strategy.address(), 10).unwrap();
        Fixture {
            owner,
            executor,
            weth,
            strategy,
            actions,
            push,
            assets,
            vault: CustodyVault::new(owner, weth),
        }
    }

    fn push_call(weth: Address, amount: Amount) -> Vec<u8> {
        TransferCall { asset: weth, amount }.encode().unwrap()
    }

    #[test]
    fn executor_drives_actions() {
        let mut f = fixture();
        let data = push_call(f.weth, 4);
        f.strategy
            .call_execute(f.executor, f.push, &data, &[], &f.actions, &mut f.assets, &f.vault, &NoStrategies)
            .unwrap();
        assert_eq!(f.assets.balance_of(f.weth, f.strategy.address()), 6);
        assert_eq!(f.assets.balance_of(f.weth, f.vault.address()), 4);
    }

    #[test]
    fn only_bound_executor_may_call() {
        let mut f = fixture();
        let data = push_call(f.weth, 1);
        let result = f.strategy.call_execute(
            f.owner, f.push, &data, &[], &f.actions, &mut f.assets, &f.vault, &NoStrategies,
        );
        assert_eq!(
            result,
            Err(ContractError::Protocol(ProtocolError::Unauthorized(f.owner)))
        );
    }

    #[test]
    fn zero_or_unknown_target_fails() {
        let mut f = fixture();
        let data = push_call(f.weth, 1);
        for target in [Address::ZERO, Address::from_label("nothing here")] {
            let result = f.strategy.call_execute(
                f.executor, target, &data, &[], &f.actions, &mut f.assets, &f.vault, &NoStrategies,
            );
            assert!(matches!(result, Err(ContractError::Failed(_))));
        }
    }

    #[test]
    fn reverting_action_surfaces_as_failed() {
        let mut f = fixture();
        let data = push_call(f.weth, 11);
        let result = f.strategy.call_execute(
            f.executor, f.push, &data, &[], &f.actions, &mut f.assets, &f.vault, &NoStrategies,
        );
        assert!(matches!(result, Err(ContractError::Failed(msg)) if msg.contains("VaultPush")));
    }

    #[test]
    fn execute_is_self_only() {
        let mut f = fixture();
        let data = push_call(f.weth, 1);
        let mut ctx = ExecutionContext {
            strategy: f.strategy.address(),
            assets: &mut f.assets,
            vault: &f.vault,
            registry: &NoStrategies,
        };
        let result = f
            .strategy
            .execute(f.executor, f.push, &data, &[], &f.actions, &mut ctx);
        assert_eq!(
            result,
            Err(ContractError::Protocol(ProtocolError::Unauthorized(f.executor)))
        );
    }

    #[test]
    fn rescuer_moves_funds_out() {
        let mut f = fixture();
        let safe = Address::from_label("safe");
        assert!(f
            .strategy
            .rescue_asset(f.executor, f.weth, safe, 1, &mut f.assets)
            .is_err());
        f.strategy
            .rescue_asset(f.owner, f.weth, safe, 10, &mut f.assets)
            .unwrap();
        assert_eq!(f.assets.balance_of(f.weth, safe), 10);
    }

    #[test]
    fn owner_rotates_executor_and_rescuer() {
        let mut f = fixture();
        let next = Address::from_label("next executor");
        assert!(f.strategy.set_strategy_executor(f.executor, next).is_err());
        f.strategy.set_strategy_executor(f.owner, next).unwrap();
        assert_eq!(f.strategy.executor(), next);
        f.strategy.update_rescuer(f.owner, next).unwrap();
        assert_eq!(f.strategy.rescuer(), next);
    }
}
