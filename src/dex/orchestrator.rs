//! Swap planning and execution
//!
//! `SwapPlanner` resolves contracts and builds the message body without
//! touching the wallet. `SwapOrchestrator` runs a plan through the wallet and,
//! on the native path, watches the router for a bounded time afterwards.
//!
//! Exactly one leg of a swap must be the native asset:
//! - token -> native: jetton transfer to the sender's jetton wallet, carrying
//!   a swap request for the token vault
//! - native -> token: swap request sent straight to the native vault with the
//!   swap amount attached

use serde::Serialize;
use std::sync::Arc;

use crate::config::DexConfig;
use crate::node::{InternalMessage, NodeClient, Transaction, Wallet};
use crate::tlb::{Address, Cell, CodecError, Coins};

use super::asset::AssetIdentifier;
use super::error::SwapError;
use super::jetton::JettonMaster;
use super::messages::{SwapMessageFactory, SwapParams, SwapStep};
use super::monitor::{MonitorState, TransactionMonitor};
use super::pool::{Pool, PoolResolver, VaultResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    NativeToToken,
    TokenToNative,
}

impl SwapDirection {
    /// Fails unless exactly one side is the native asset
    pub fn determine(
        token_in: AssetIdentifier,
        token_out: AssetIdentifier,
    ) -> Result<Self, SwapError> {
        match (token_in.is_native(), token_out.is_native()) {
            (true, false) => Ok(SwapDirection::NativeToToken),
            (false, true) => Ok(SwapDirection::TokenToNative),
            _ => Err(SwapError::InvalidSwapStrategy {
                token_in,
                token_out,
            }),
        }
    }
}

/// Unsigned outgoing message for one swap
#[derive(Debug, Clone)]
pub struct SwapPlan {
    pub direction: SwapDirection,
    pub pool: Pool,
    /// Vault that receives the swap input
    pub vault: Address,
    /// Where the wallet sends the message: the native vault or the sender's jetton wallet
    pub destination: Address,
    pub value: Coins,
    pub body: Cell,
    pub query_id: u64,
}

impl SwapPlan {
    pub fn message(&self) -> InternalMessage {
        InternalMessage::new(self.destination, self.value, self.body.clone())
    }
}

/// Outcome of a submitted swap
#[derive(Debug, Clone, Serialize)]
pub struct SwapReceipt {
    pub direction: SwapDirection,
    pub query_id: u64,
    pub destination: Address,
    pub value: Coins,
    /// Wallet transaction that carried the message (native path only)
    pub transaction: Option<Transaction>,
    /// Router transactions seen while watching, not correlated with this swap
    pub observed: Vec<Transaction>,
    /// `Idle` when no watch was started for this swap
    pub monitor: MonitorState,
}

/// Resolves contracts and builds swap messages
#[derive(Clone)]
pub struct SwapPlanner {
    node: Arc<dyn NodeClient>,
    config: DexConfig,
    pools: PoolResolver,
    vaults: VaultResolver,
}

impl SwapPlanner {
    pub fn new(node: Arc<dyn NodeClient>, config: DexConfig) -> Self {
        let pools = PoolResolver::new(node.clone(), config.router, config.policy.pool_type);
        let vaults = VaultResolver::new(node.clone(), config.router);
        Self {
            node,
            config,
            pools,
            vaults,
        }
    }

    pub fn config(&self) -> &DexConfig {
        &self.config
    }

    pub fn pools(&self) -> &PoolResolver {
        &self.pools
    }

    pub fn vaults(&self) -> &VaultResolver {
        &self.vaults
    }

    /// Build the message `sender` must submit to swap `amount` of `token_in`
    pub async fn plan(
        &self,
        sender: &Address,
        token_in: AssetIdentifier,
        token_out: AssetIdentifier,
        amount: Coins,
    ) -> Result<SwapPlan, SwapError> {
        let direction = SwapDirection::determine(token_in, token_out)?;
        tracing::info!(
            "Planning {:?} swap of {} {} -> {} for {}",
            direction,
            amount,
            token_in,
            token_out,
            sender
        );

        match direction {
            SwapDirection::TokenToNative => self.plan_token_to_native(sender, token_in, amount).await,
            SwapDirection::NativeToToken => self.plan_native_to_token(sender, token_out, amount).await,
        }
    }

    async fn plan_token_to_native(
        &self,
        sender: &Address,
        token_in: AssetIdentifier,
        amount: Coins,
    ) -> Result<SwapPlan, SwapError> {
        let pool = self.pools.resolve(token_in, AssetIdentifier::Native).await?;

        let master = token_in
            .master_address()
            .ok_or(SwapError::InvalidSwapStrategy {
                token_in,
                token_out: AssetIdentifier::Native,
            })?;
        let jetton_wallet = JettonMaster::new(self.node.clone(), master)
            .wallet_address(sender)
            .await?;

        let inner = SwapMessageFactory::jetton_swap_request(
            SwapStep::single(pool.address, self.config.policy.min_output),
            self.swap_params(sender),
        )?;

        let vault = self.vaults.resolve(token_in).await?;
        let query_id = SwapMessageFactory::random_query_id();
        let body = SwapMessageFactory::jetton_transfer_with_swap(
            query_id,
            amount,
            vault,
            *sender,
            self.config.fee.forward_amount,
            inner,
        )?;

        Ok(SwapPlan {
            direction: SwapDirection::TokenToNative,
            pool,
            vault,
            destination: jetton_wallet,
            value: self.config.fee.tx_amount,
            body,
            query_id,
        })
    }

    async fn plan_native_to_token(
        &self,
        sender: &Address,
        token_out: AssetIdentifier,
        amount: Coins,
    ) -> Result<SwapPlan, SwapError> {
        let pool = self.pools.resolve(AssetIdentifier::Native, token_out).await?;
        let vault = self.vaults.resolve(AssetIdentifier::Native).await?;

        let query_id = SwapMessageFactory::random_query_id();
        let body = SwapMessageFactory::native_swap_request(
            query_id,
            amount,
            SwapStep::single(pool.address, self.config.policy.min_output),
            self.swap_params(sender),
        )?;
        let value = amount
            .checked_add(self.config.fee.tx_amount)
            .ok_or(CodecError::AmountOverflow)?;

        Ok(SwapPlan {
            direction: SwapDirection::NativeToToken,
            pool,
            vault,
            destination: vault,
            value,
            body,
            query_id,
        })
    }

    fn swap_params(&self, recipient: &Address) -> SwapParams {
        SwapParams::new(
            SwapParams::deadline_after(self.config.policy.deadline_offset),
            *recipient,
        )
    }
}

/// Plans, submits and watches one swap at a time
pub struct SwapOrchestrator {
    planner: SwapPlanner,
    wallet: Arc<dyn Wallet>,
}

impl SwapOrchestrator {
    pub fn new(node: Arc<dyn NodeClient>, wallet: Arc<dyn Wallet>, config: DexConfig) -> Self {
        Self {
            planner: SwapPlanner::new(node, config),
            wallet,
        }
    }

    pub fn planner(&self) -> &SwapPlanner {
        &self.planner
    }

    pub async fn swap(
        &self,
        token_in: AssetIdentifier,
        token_out: AssetIdentifier,
        amount: Coins,
    ) -> Result<SwapReceipt, SwapError> {
        let sender = self.wallet.address();
        let plan = self.planner.plan(&sender, token_in, token_out, amount).await?;

        match plan.direction {
            SwapDirection::TokenToNative => {
                self.wallet.send(plan.message(), true).await?;
                tracing::info!(
                    "Jetton swap {} submitted to {} with {} TON",
                    plan.query_id,
                    plan.destination,
                    plan.value.to_ton_string()
                );
                Ok(SwapReceipt {
                    direction: plan.direction,
                    query_id: plan.query_id,
                    destination: plan.destination,
                    value: plan.value,
                    transaction: None,
                    observed: Vec::new(),
                    monitor: MonitorState::Idle,
                })
            }
            SwapDirection::NativeToToken => {
                let config = self.planner.config();
                let monitor = TransactionMonitor::new(
                    self.planner.node.clone(),
                    config.router,
                    config.policy.monitor_timeout,
                );
                // read before sending so the swap's own router transactions are above it
                let from_lt = monitor.checkpoint().await?;

                let transaction = self.wallet.send_and_await_transaction(plan.message()).await?;
                tracing::info!(
                    "Native swap {} included in transaction {} (lt {})",
                    plan.query_id,
                    transaction.hash,
                    transaction.lt
                );

                let (observed, state) = monitor.watch_from(from_lt).drain().await;
                tracing::info!(
                    "Router watch ended {:?} after {} transactions",
                    state,
                    observed.len()
                );

                Ok(SwapReceipt {
                    direction: plan.direction,
                    query_id: plan.query_id,
                    destination: plan.destination,
                    value: plan.value,
                    transaction: Some(transaction),
                    observed,
                    monitor: state,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::messages::DexMessage;
    use crate::dex::pool::tests::{
        address_cell, jetton_vault, native_vault, pool_address, router, scripted_node, token,
    };
    use crate::node::mock::{test_transaction, MockNode, MockWallet};
    use crate::node::{StackEntry, WalletError};
    use std::time::Duration;

    fn sender() -> Address {
        Address::new(0, [0x0e; 32])
    }

    fn sender_jetton_wallet() -> Address {
        Address::new(0, [0x0f; 32])
    }

    fn config() -> DexConfig {
        let mut config = DexConfig::new(router());
        config.policy.monitor_timeout = Duration::from_millis(50);
        config
    }

    /// Scripted router plus the token's master and vault
    fn token_node() -> MockNode {
        let node = scripted_node();
        let master = token().master_address().unwrap();
        node.respond(
            master,
            "get_wallet_address",
            vec![StackEntry::Slice(address_cell(&sender_jetton_wallet()))],
        );
        node.respond(
            router(),
            "get_vault_address",
            vec![StackEntry::Slice(address_cell(&jetton_vault()))],
        );
        node
    }

    #[test]
    fn test_direction() {
        let other = AssetIdentifier::FungibleToken {
            workchain: 0,
            address: [0x06; 32],
        };
        assert_eq!(
            SwapDirection::determine(AssetIdentifier::Native, token()).unwrap(),
            SwapDirection::NativeToToken
        );
        assert_eq!(
            SwapDirection::determine(token(), AssetIdentifier::Native).unwrap(),
            SwapDirection::TokenToNative
        );
        for (a, b) in [
            (AssetIdentifier::Native, AssetIdentifier::Native),
            (token(), other),
            (token(), token()),
        ] {
            let err = SwapDirection::determine(a, b).unwrap_err();
            assert!(err.is_configuration());
        }
    }

    #[tokio::test]
    async fn test_invalid_strategy_makes_no_network_calls() {
        let node = Arc::new(MockNode::new());
        let wallet = Arc::new(MockWallet::new(sender()));
        let orchestrator = SwapOrchestrator::new(node.clone(), wallet.clone(), config());
        let other = AssetIdentifier::FungibleToken {
            workchain: 0,
            address: [0x06; 32],
        };

        for (a, b) in [(token(), other), (AssetIdentifier::Native, AssetIdentifier::Native)] {
            let err = orchestrator
                .swap(a, b, Coins::from_nano(1_000))
                .await
                .unwrap_err();
            assert!(matches!(err, SwapError::InvalidSwapStrategy { .. }));
        }
        assert!(node.calls().is_empty());
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn test_native_to_token_swap() {
        let node = Arc::new(scripted_node().with_account_lt(500));
        let active = node.subscription_active.clone();
        let wallet = Arc::new(MockWallet::new(sender()));
        let orchestrator = SwapOrchestrator::new(node.clone(), wallet.clone(), config());

        let amount = Coins::from_ton("0.5").unwrap();
        let receipt = orchestrator
            .swap(AssetIdentifier::Native, token(), amount)
            .await
            .unwrap();

        assert_eq!(receipt.direction, SwapDirection::NativeToToken);
        assert_eq!(receipt.destination, native_vault());
        assert_eq!(receipt.transaction, Some(test_transaction(1)));
        assert_eq!(receipt.monitor, MonitorState::TimedOut);
        assert!(!active.load(std::sync::atomic::Ordering::SeqCst));

        let sent = wallet.sent();
        assert_eq!(sent.len(), 1);
        let (message, wait) = &sent[0];
        assert!(*wait);
        assert_eq!(message.destination, native_vault());
        assert_eq!(message.value, Coins::from_ton("0.8").unwrap());
        assert_eq!(message.body.parse().preload_uint(32).unwrap(), 0xea06185d);

        match DexMessage::decode(&message.body).unwrap() {
            DexMessage::NativeSwap(request) => {
                assert_eq!(request.query_id, receipt.query_id);
                assert_eq!(request.amount, amount);
                assert_eq!(request.step.pool, pool_address());
                assert_eq!(request.step.limit, Coins::ZERO);
                assert_eq!(request.params.recipient, sender());
            }
            other => panic!("unexpected message {:?}", other),
        }

        assert_eq!(
            node.calls(),
            vec![
                "get_pool_address",
                "get_assets",
                "get_reserves",
                "get_vault_address",
                "get_account",
                "subscribe",
            ]
        );
        // vault looked up for the native asset
        assert_eq!(
            node.args_of("get_vault_address")[0],
            vec![StackEntry::Slice(AssetIdentifier::Native.encode().unwrap())]
        );
    }

    #[tokio::test]
    async fn test_token_to_native_swap() {
        let node = Arc::new(token_node());
        let wallet = Arc::new(MockWallet::new(sender()));
        let orchestrator = SwapOrchestrator::new(node.clone(), wallet.clone(), config());

        let amount = Coins::from_nano(2_000_000);
        let receipt = orchestrator
            .swap(token(), AssetIdentifier::Native, amount)
            .await
            .unwrap();
        assert_eq!(receipt.direction, SwapDirection::TokenToNative);
        assert_eq!(receipt.monitor, MonitorState::Idle);
        assert!(receipt.transaction.is_none());

        let sent = wallet.sent();
        assert_eq!(sent.len(), 1);
        let (message, wait) = &sent[0];
        assert!(*wait);
        assert_eq!(message.destination, sender_jetton_wallet());
        assert_eq!(message.value, Coins::from_ton("0.3").unwrap());

        let transfer = match DexMessage::decode(&message.body).unwrap() {
            DexMessage::JettonTransfer(transfer) => transfer,
            other => panic!("unexpected message {:?}", other),
        };
        assert_eq!(transfer.query_id, receipt.query_id);
        assert_eq!(transfer.amount, amount);
        assert_eq!(transfer.destination, jetton_vault());
        assert_eq!(transfer.response_destination, Some(sender()));
        assert_eq!(transfer.forward_amount, Coins::from_ton("0.25").unwrap());

        match DexMessage::decode(&transfer.forward_payload).unwrap() {
            DexMessage::JettonSwap(inner) => {
                assert_eq!(inner.step.pool, pool_address());
                assert_eq!(inner.step.limit, Coins::ZERO);
                assert_eq!(inner.params.recipient, sender());
                let expected = SwapMessageFactory::jetton_swap_request(
                    inner.step.clone(),
                    inner.params.clone(),
                )
                .unwrap();
                assert_eq!(transfer.forward_payload, expected);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        assert!(!node.calls().contains(&"subscribe".to_string()));
        assert_eq!(
            node.args_of("get_vault_address")[0],
            vec![StackEntry::Slice(token().encode().unwrap())]
        );
    }

    #[tokio::test]
    async fn test_min_output_policy_sets_limit() {
        let node = Arc::new(scripted_node());
        let mut config = config();
        config.policy.min_output = Coins::from_nano(777);
        let planner = SwapPlanner::new(node, config);

        let plan = planner
            .plan(&sender(), AssetIdentifier::Native, token(), Coins::from_nano(10))
            .await
            .unwrap();
        match DexMessage::decode(&plan.body).unwrap() {
            DexMessage::NativeSwap(request) => {
                assert_eq!(request.step.limit, Coins::from_nano(777))
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(plan.pool.address, pool_address());
        assert_eq!(plan.vault, native_vault());
    }

    #[tokio::test]
    async fn test_submission_error_propagates() {
        let node = Arc::new(token_node());
        let wallet = Arc::new(MockWallet::rejecting(sender(), "seqno mismatch"));
        let orchestrator = SwapOrchestrator::new(node, wallet, config());

        let err = orchestrator
            .swap(token(), AssetIdentifier::Native, Coins::from_nano(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Submission(WalletError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_pool_failure_stops_before_submission() {
        let node = scripted_node();
        node.fail(router(), "get_pool_address", 11);
        let wallet = Arc::new(MockWallet::new(sender()));
        let orchestrator = SwapOrchestrator::new(Arc::new(node), wallet.clone(), config());

        let err = orchestrator
            .swap(AssetIdentifier::Native, token(), Coins::from_nano(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::PoolResolutionFailed { .. }));
        assert!(wallet.sent().is_empty());
    }
}
