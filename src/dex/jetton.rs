//! Jetton master / wallet get-methods

use std::sync::Arc;

use crate::node::{NodeClient, StackEntry};
use crate::tlb::{Address, CellBuilder, Coins};

use super::error::{stack_int, stack_slice, ResolutionError, SwapError};

const GET_WALLET_ADDRESS: &str = "get_wallet_address";
const GET_WALLET_DATA: &str = "get_wallet_data";

/// Jetton master contract
pub struct JettonMaster {
    node: Arc<dyn NodeClient>,
    address: Address,
}

impl JettonMaster {
    pub fn new(node: Arc<dyn NodeClient>, address: Address) -> Self {
        Self { node, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Jetton wallet holding `owner`'s balance of this jetton
    pub async fn wallet_address(&self, owner: &Address) -> Result<Address, SwapError> {
        self.wallet_address_inner(owner)
            .await
            .map_err(|source| SwapError::JettonWalletResolutionFailed {
                master: self.address,
                source,
            })
    }

    async fn wallet_address_inner(&self, owner: &Address) -> Result<Address, ResolutionError> {
        let block = self.node.masterchain_info().await?;
        let owner_slice = CellBuilder::new().store_address(Some(owner))?.build()?.parse();
        let stack = self
            .node
            .run_get_method(
                &block,
                &self.address,
                GET_WALLET_ADDRESS,
                vec![StackEntry::slice(&owner_slice)?],
            )
            .await?;
        Ok(stack_slice(&stack, 0, GET_WALLET_ADDRESS)?.load_address()?)
    }

    /// Wallet of `owner` for this jetton
    pub async fn wallet_of(&self, owner: &Address) -> Result<JettonWallet, SwapError> {
        let address = self.wallet_address(owner).await?;
        Ok(JettonWallet::new(self.node.clone(), address))
    }
}

/// Per-holder jetton wallet contract
pub struct JettonWallet {
    node: Arc<dyn NodeClient>,
    address: Address,
}

impl JettonWallet {
    pub fn new(node: Arc<dyn NodeClient>, address: Address) -> Self {
        Self { node, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Current balance in the jetton's smallest unit
    pub async fn balance(&self) -> Result<Coins, ResolutionError> {
        let block = self.node.masterchain_info().await?;
        let stack = self
            .node
            .run_get_method(&block, &self.address, GET_WALLET_DATA, Vec::new())
            .await?;
        let balance = stack_int(&stack, 0, GET_WALLET_DATA)?;
        u128::try_from(balance)
            .map(Coins::from_nano)
            .map_err(|_| ResolutionError::unexpected(GET_WALLET_DATA, format!("balance {}", balance)))
    }
}
