//! Scripted collaborators for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{
    AccountState, BlockRef, InternalMessage, NodeClient, NodeError, StackEntry, Transaction,
    Wallet, WalletError,
};
use crate::tlb::{Address, Coins};

pub(crate) const TEST_BLOCK: BlockRef = BlockRef {
    workchain: -1,
    shard: i64::MIN,
    seqno: 1_000,
};

/// Node that answers get-methods from a table and records every call
#[derive(Default)]
pub(crate) struct MockNode {
    responses: Mutex<HashMap<(Address, String), Result<Vec<StackEntry>, i64>>>,
    calls: Mutex<Vec<String>>,
    args: Mutex<Vec<(String, Vec<StackEntry>)>>,
    account_lt: u64,
    feed: Vec<Transaction>,
    pub(crate) subscription_active: Arc<AtomicBool>,
}

impl MockNode {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_account_lt(mut self, lt: u64) -> Self {
        self.account_lt = lt;
        self
    }

    /// Transactions delivered on subscribe; the feed then stays open
    pub(crate) fn with_feed(mut self, feed: Vec<Transaction>) -> Self {
        self.feed = feed;
        self
    }

    pub(crate) fn respond(&self, address: Address, method: &str, stack: Vec<StackEntry>) {
        self.responses
            .lock()
            .unwrap()
            .insert((address, method.to_string()), Ok(stack));
    }

    pub(crate) fn fail(&self, address: Address, method: &str, exit_code: i64) {
        self.responses
            .lock()
            .unwrap()
            .insert((address, method.to_string()), Err(exit_code));
    }

    /// Method names in call order (`get_account` and `subscribe` included)
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn args_of(&self, method: &str) -> Vec<Vec<StackEntry>> {
        self.args
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn masterchain_info(&self) -> Result<BlockRef, NodeError> {
        Ok(TEST_BLOCK)
    }

    async fn run_get_method(
        &self,
        _block: &BlockRef,
        address: &Address,
        method: &str,
        args: Vec<StackEntry>,
    ) -> Result<Vec<StackEntry>, NodeError> {
        self.calls.lock().unwrap().push(method.to_string());
        self.args.lock().unwrap().push((method.to_string(), args));
        match self
            .responses
            .lock()
            .unwrap()
            .get(&(*address, method.to_string()))
        {
            Some(Ok(stack)) => Ok(stack.clone()),
            Some(Err(exit_code)) => Err(NodeError::GetMethodFailed {
                method: method.to_string(),
                exit_code: *exit_code,
            }),
            None => Err(NodeError::GetMethodFailed {
                method: method.to_string(),
                exit_code: 11,
            }),
        }
    }

    async fn get_account(
        &self,
        _block: &BlockRef,
        _address: &Address,
    ) -> Result<AccountState, NodeError> {
        self.calls.lock().unwrap().push("get_account".to_string());
        Ok(AccountState {
            balance: Coins::ZERO,
            last_transaction_lt: self.account_lt,
            last_transaction_hash: None,
        })
    }

    async fn subscribe_transactions(
        &self,
        _address: &Address,
        from_lt: u64,
        sink: mpsc::Sender<Transaction>,
    ) -> Result<(), NodeError> {
        self.calls.lock().unwrap().push("subscribe".to_string());
        self.subscription_active.store(true, Ordering::SeqCst);
        let _guard = ActiveGuard(self.subscription_active.clone());

        for tx in self.feed.iter().filter(|tx| tx.lt > from_lt) {
            if sink.send(tx.clone()).await.is_err() {
                return Ok(());
            }
        }
        sink.closed().await;
        Ok(())
    }
}

/// Wallet that records submitted messages instead of signing them
pub(crate) struct MockWallet {
    address: Address,
    sent: Mutex<Vec<(InternalMessage, bool)>>,
    reject: Option<String>,
}

impl MockWallet {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            sent: Mutex::new(Vec::new()),
            reject: None,
        }
    }

    pub(crate) fn rejecting(address: Address, reason: &str) -> Self {
        Self {
            reject: Some(reason.to_string()),
            ..Self::new(address)
        }
    }

    /// Submitted messages with their wait-for-inclusion flag
    pub(crate) fn sent(&self) -> Vec<(InternalMessage, bool)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn send(
        &self,
        message: InternalMessage,
        wait_for_inclusion: bool,
    ) -> Result<(), WalletError> {
        if let Some(reason) = &self.reject {
            return Err(WalletError::Rejected(reason.clone()));
        }
        self.sent.lock().unwrap().push((message, wait_for_inclusion));
        Ok(())
    }

    async fn send_and_await_transaction(
        &self,
        message: InternalMessage,
    ) -> Result<Transaction, WalletError> {
        self.send(message, true).await?;
        Ok(test_transaction(1))
    }
}

pub(crate) fn test_transaction(lt: u64) -> Transaction {
    Transaction {
        lt,
        hash: format!("hash-{}", lt),
        utime: 1_700_000_000,
        in_message: None,
        out_messages: Vec::new(),
    }
}
