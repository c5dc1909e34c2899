//! Bounded transaction watch on an account
//!
//! `Idle -> Watching -> {TimedOut, Cancelled}`. The subscription runs in a
//! task owned by a `TransactionWatch`; the task ends on timeout, on explicit
//! cancel, or when the watch is dropped, and the node subscription future is
//! dropped with it. Neither ending is an error.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::node::{NodeClient, NodeError, Transaction};
use crate::tlb::Address;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Watching,
    TimedOut,
    Cancelled,
}

/// Watches one account for new transactions
pub struct TransactionMonitor {
    node: Arc<dyn NodeClient>,
    address: Address,
    timeout: Duration,
}

impl TransactionMonitor {
    pub fn new(node: Arc<dyn NodeClient>, address: Address, timeout: Duration) -> Self {
        Self {
            node,
            address,
            timeout,
        }
    }

    /// Logical time of the account's latest transaction
    pub async fn checkpoint(&self) -> Result<u64, NodeError> {
        let block = self.node.masterchain_info().await?;
        let account = self.node.get_account(&block, &self.address).await?;
        Ok(account.last_transaction_lt)
    }

    /// Read the checkpoint now and start watching from it
    pub async fn start(&self) -> Result<TransactionWatch, NodeError> {
        let from_lt = self.checkpoint().await?;
        Ok(self.watch_from(from_lt))
    }

    /// Start watching for transactions above `from_lt`
    pub fn watch_from(&self, from_lt: u64) -> TransactionWatch {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let node = self.node.clone();
        let address = self.address;
        let timeout = self.timeout;

        tracing::debug!(
            "Watching {} from lt {} for {:?}",
            address,
            from_lt,
            timeout
        );

        let task = tokio::spawn(async move {
            let subscription = node.subscribe_transactions(&address, from_lt, tx);
            let state = tokio::select! {
                result = subscription => {
                    if let Err(e) = result {
                        tracing::warn!("Transaction subscription for {} ended: {}", address, e);
                    }
                    MonitorState::Cancelled
                }
                _ = tokio::time::sleep(timeout) => MonitorState::TimedOut,
                // explicit cancel or the watch handle being dropped
                _ = cancel_rx => MonitorState::Cancelled,
            };
            tracing::debug!("Watch on {} finished: {:?}", address, state);
            state
        });

        TransactionWatch {
            rx,
            cancel: Some(cancel_tx),
            task: Some(task),
            state: MonitorState::Watching,
        }
    }
}

/// Handle to a running watch. Dropping it cancels the subscription.
pub struct TransactionWatch {
    rx: mpsc::Receiver<Transaction>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<MonitorState>>,
    state: MonitorState,
}

impl TransactionWatch {
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Next observed transaction; `None` once the watch has ended
    pub async fn next(&mut self) -> Option<Transaction> {
        match self.rx.recv().await {
            Some(tx) => Some(tx),
            None => {
                self.finish().await;
                None
            }
        }
    }

    /// Stop watching and wait for the subscription to be torn down
    pub async fn cancel(mut self) -> MonitorState {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.rx.close();
        self.finish().await
    }

    /// Collect everything observed until the watch ends
    pub async fn drain(mut self) -> (Vec<Transaction>, MonitorState) {
        let mut observed = Vec::new();
        while let Some(tx) = self.next().await {
            tracing::debug!("Observed transaction lt={} hash={}", tx.lt, tx.hash);
            observed.push(tx);
        }
        let state = self.finish().await;
        (observed, state)
    }

    async fn finish(&mut self) -> MonitorState {
        if let Some(task) = self.task.take() {
            self.state = task.await.unwrap_or(MonitorState::Cancelled);
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mock::{test_transaction, MockNode};
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn router() -> Address {
        Address::new(0, [0x01; 32])
    }

    #[tokio::test]
    async fn test_times_out_cleanly_without_transactions() {
        let node = Arc::new(MockNode::new().with_account_lt(100));
        let active = node.subscription_active.clone();
        let monitor = TransactionMonitor::new(node.clone(), router(), Duration::from_millis(50));

        let started = Instant::now();
        let watch = monitor.start().await.unwrap();
        assert_eq!(watch.state(), MonitorState::Watching);

        let (observed, state) = watch.drain().await;
        assert!(observed.is_empty());
        assert_eq!(state, MonitorState::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!active.load(Ordering::SeqCst));
        assert_eq!(node.calls(), vec!["get_account", "subscribe"]);
    }

    #[tokio::test]
    async fn test_delivers_transactions_above_checkpoint() {
        let node = Arc::new(
            MockNode::new()
                .with_account_lt(10)
                .with_feed(vec![test_transaction(5), test_transaction(11), test_transaction(12)]),
        );
        let monitor = TransactionMonitor::new(node, router(), Duration::from_millis(50));

        let (observed, state) = monitor.start().await.unwrap().drain().await;
        let lts: Vec<u64> = observed.iter().map(|tx| tx.lt).collect();
        assert_eq!(lts, vec![11, 12]);
        assert_eq!(state, MonitorState::TimedOut);
    }

    #[tokio::test]
    async fn test_cancel_releases_subscription() {
        let node = Arc::new(MockNode::new().with_feed(vec![test_transaction(1)]));
        let active = node.subscription_active.clone();
        let monitor = TransactionMonitor::new(node, router(), Duration::from_secs(60));

        let mut watch = monitor.watch_from(0);
        assert_eq!(watch.next().await.unwrap().lt, 1);

        let started = Instant::now();
        assert_eq!(watch.cancel().await, MonitorState::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!active.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_watch_stops_task() {
        let node = Arc::new(MockNode::new());
        let active = node.subscription_active.clone();
        let monitor = TransactionMonitor::new(node, router(), Duration::from_secs(60));

        let watch = monitor.watch_from(0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(active.load(Ordering::SeqCst));
        drop(watch);

        for _ in 0..100 {
            if !active.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!active.load(Ordering::SeqCst));
    }
}
