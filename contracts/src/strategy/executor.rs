//! # Strategy Executor
//!
//! Runs batches of actions on a stored strategy. Every id in a batch is
//! checked against the strategy's whitelist and resolved through the
//! action registry before anything runs; the batch then executes in order,
//! each action seeing the balances left by the previous one. If any action
//! fails, the asset book is restored and the whole batch has no effect.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use canopy_protocol::access::{CapabilitySet, Ownable};
use canopy_protocol::custody::{AssetBook, CustodyVault};
use canopy_protocol::events::EventLog;
use canopy_protocol::{Address, ProtocolError};

use crate::action::{ActionBook, ActionId, ActionRegistry};
use crate::error::{ContractError, ContractResult};
use crate::strategy::storage::StrategyStorage;
use crate::strategy::{Strategy, StrategyId};

/// Emitted once per successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Ids executed, in order.
    pub action_ids: Vec<ActionId>,
    /// Strategy the batch ran on.
    pub strategy_id: StrategyId,
}

/// Everything a batch reads or moves.
pub struct ExecutionEnv<'a> {
    /// Whitelists and activity flags.
    pub storage: &'a StrategyStorage,
    /// Id to implementation address.
    pub registry: &'a ActionRegistry,
    /// Deployed implementations.
    pub actions: &'a ActionBook,
    /// The strategy stored under the batch's id.
    pub strategy: &'a Strategy,
    /// External balances.
    pub assets: &'a mut AssetBook,
    /// Custody vault, for pulls and pushes.
    pub vault: &'a CustodyVault,
}

/// Batched action execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyExecutor {
    address: Address,
    ownable: Ownable,
    executors: CapabilitySet,
    events: EventLog<ExecutionEvent>,
}

impl StrategyExecutor {
    /// Creates an executor with an empty executor set.
    pub fn new(owner: Address) -> Self {
        Self {
            address: Address::from_label(&format!("StrategyExecutor_{owner}")),
            ownable: Ownable::new(owner),
            executors: CapabilitySet::new(),
            events: EventLog::new(),
        }
    }

    /// Address strategies must be bound to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns `true` if `account` may submit batches.
    pub fn is_executor(&self, account: Address) -> bool {
        self.executors.contains(account)
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog<ExecutionEvent> {
        &self.events
    }

    /// Adds or removes `account` from the executor set. Owner only.
    pub fn update_executor(
        &mut self,
        caller: Address,
        account: Address,
        enabled: bool,
    ) -> ContractResult<()> {
        self.ownable.ensure_owner(caller)?;
        if enabled {
            self.executors.grant(account);
        } else {
            self.executors.revoke(account);
        }
        info!(%account, enabled, "strategy executor membership updated");
        Ok(())
    }

    /// Executes `action_ids[i]` with `calldatas[i]` on strategy
    /// `strategy_id`. `hints` may be shorter than the batch; missing
    /// entries are empty.
    pub fn execute_on_strategy(
        &mut self,
        caller: Address,
        strategy_id: StrategyId,
        action_ids: &[ActionId],
        calldatas: &[Vec<u8>],
        hints: &[Vec<u8>],
        mut env: ExecutionEnv<'_>,
    ) -> ContractResult<()> {
        if !self.executors.contains(caller) {
            return Err(ProtocolError::Unauthorized(caller).into());
        }
        let record = env
            .storage
            .strategy(strategy_id)
            .ok()
            .filter(|r| r.active)
            .ok_or(ContractError::StrategyNotActive(strategy_id))?;
        if record.address != env.strategy.address() {
            return Err(ContractError::Failed(format!(
                "strategy {strategy_id} is stored at {}, got {}",
                record.address,
                env.strategy.address()
            )));
        }
        if action_ids.len() != calldatas.len() {
            return Err(ContractError::ArrayLengthMismatch {
                ids: action_ids.len(),
                calldatas: calldatas.len(),
            });
        }

        let mut targets = Vec::with_capacity(action_ids.len());
        for id in action_ids {
            if !record.actions.contains(id) {
                return Err(ContractError::ActionNotWhitelisted(*id));
            }
            let target = env
                .registry
                .get_addr(*id)
                .map_err(|_| ContractError::ActionIdNotFound(*id))?;
            targets.push(target);
        }

        let checkpoint = env.assets.clone();
        for (i, target) in targets.into_iter().enumerate() {
            let hint = hints.get(i).map(Vec::as_slice).unwrap_or_default();
            let result = env.strategy.call_execute(
                self.address,
                target,
                &calldatas[i],
                hint,
                env.actions,
                env.assets,
                env.vault,
                env.storage,
            );
            if let Err(e) = result {
                warn!(strategy_id, action = %action_ids[i], error = %e, "batch reverted");
                *env.assets = checkpoint;
                return Err(e);
            }
            debug!(strategy_id, action = %action_ids[i], "action executed");
        }

        info!(strategy_id, actions = action_ids.len(), "batch executed");
        self.events.emit(ExecutionEvent {
            action_ids: action_ids.to_vec(),
            strategy_id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, TransferCall, VaultPull, VaultPush};
    use canopy_protocol::Amount;
    use std::sync::Arc;

    struct World {
        owner: Address,
        bot: Address,
        weth: Address,
        executor: StrategyExecutor,
        storage: StrategyStorage,
        registry: ActionRegistry,
        actions: ActionBook,
        strategy: Strategy,
        assets: AssetBook,
        vault: CustodyVault,
    }

    impl World {
        fn new() -> Self {
            let owner = Address::from_label("owner");
            let bot = Address::from_label("bot");
            let weth = Address::from_label("weth");

            let mut executor = StrategyExecutor::new(owner);
            executor.update_executor(owner, bot, true).unwrap();

            let mut actions = ActionBook::new();
            let mut registry = ActionRegistry::new(owner);
            for action in [
                Arc::new(VaultPull) as Arc<dyn Action>,
                Arc::new(VaultPush) as Arc<dyn Action>,
            ] {
                let id = action.id();
                let address = actions.deploy(action);
                registry.add_new_contract(owner, id, address).unwrap();
            }

            let strategy = Strategy::new(owner, "alpha", executor.address());
            let mut storage = StrategyStorage::new(owner);
            storage
                .store_strategy(
                    owner,
                    strategy.address(),
                    &[VaultPull.id(), VaultPush.id()],
                    &[weth],
                )
                .unwrap();

            let mut vault = CustodyVault::new(owner, weth);
            vault.set_strategy_storage(owner, storage.address()).unwrap();
            let mut assets = AssetBook::new();
            assets.register_token(weth, "WETH", 18).unwrap();
            assets.mint(weth, vault.address(), 100).unwrap();

            Self {
                owner,
                bot,
                weth,
                executor,
                storage,
                registry,
                actions,
                strategy,
                assets,
                vault,
            }
        }

        fn call(&self, amount: Amount) -> Vec<u8> {
            TransferCall {
                asset: self.weth,
                amount,
            }
            .encode()
            .unwrap()
        }

        fn run(
            &mut self,
            caller: Address,
            ids: &[ActionId],
            calldatas: &[Vec<u8>],
        ) -> ContractResult<()> {
            let env = ExecutionEnv {
                storage: &self.storage,
                registry: &self.registry,
                actions: &self.actions,
                strategy: &self.strategy,
                assets: &mut self.assets,
                vault: &self.vault,
            };
            self.executor
                .execute_on_strategy(caller, 0, ids, calldatas, &[], env)
        }

        fn strategy_balance(&self) -> Amount {
            self.assets.balance_of(self.weth, self.strategy.address())
        }
    }

    #[test]
    fn batch_runs_in_order() {
        let mut w = World::new();
        let (pull, push) = (w.call(40), w.call(15));
        w.run(w.bot, &[VaultPull.id(), VaultPush.id()], &[pull, push])
            .unwrap();
        assert_eq!(w.strategy_balance(), 25);
        assert_eq!(w.assets.balance_of(w.weth, w.vault.address()), 75);
        assert_eq!(
            w.executor.events().last(),
            Some(&ExecutionEvent {
                action_ids: vec![VaultPull.id(), VaultPush.id()],
                strategy_id: 0,
            })
        );
    }

    #[test]
    fn failing_action_reverts_whole_batch() {
        let mut w = World::new();
        let (pull, push) = (w.call(40), w.call(41));
        let result = w.run(w.bot, &[VaultPull.id(), VaultPush.id()], &[pull, push]);
        assert!(matches!(result, Err(ContractError::Failed(_))));
        assert_eq!(w.strategy_balance(), 0);
        assert_eq!(w.assets.balance_of(w.weth, w.vault.address()), 100);
        assert!(w.executor.events().is_empty());
    }

    #[test]
    fn non_member_is_unauthorized() {
        let mut w = World::new();
        let pull = w.call(1);
        assert_eq!(
            w.run(w.owner, &[VaultPull.id()], &[pull]),
            Err(ContractError::Protocol(ProtocolError::Unauthorized(w.owner)))
        );
    }

    #[test]
    fn paused_strategy_is_not_active() {
        let mut w = World::new();
        w.storage.pause_strategy(w.owner, 0).unwrap();
        let pull = w.call(1);
        assert_eq!(
            w.run(w.bot, &[VaultPull.id()], &[pull]),
            Err(ContractError::StrategyNotActive(0))
        );
    }

    #[test]
    fn lengths_must_match() {
        let mut w = World::new();
        assert_eq!(
            w.run(w.bot, &[VaultPull.id()], &[]),
            Err(ContractError::ArrayLengthMismatch { ids: 1, calldatas: 0 })
        );
    }

    #[test]
    fn whitelist_checked_before_registry() {
        let mut w = World::new();
        let unknown = ActionId::from_bytes([0x11, 0x11, 0x11, 0x11]);
        assert_eq!(
            w.run(w.bot, &[unknown], &[vec![]]),
            Err(ContractError::ActionNotWhitelisted(unknown))
        );

        w.storage.whitelist_actions(w.owner, 0, &[unknown]).unwrap();
        assert_eq!(
            w.run(w.bot, &[unknown], &[vec![]]),
            Err(ContractError::ActionIdNotFound(unknown))
        );
    }

    #[test]
    fn removed_member_loses_access() {
        let mut w = World::new();
        w.executor.update_executor(w.owner, w.bot, false).unwrap();
        assert!(!w.executor.is_executor(w.bot));
        assert!(w.run(w.bot, &[], &[]).is_err());
    }
}
