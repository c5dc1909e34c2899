//! Node RPC and wallet collaborators
//!
//! The swap engine talks to the network only through the `NodeClient` and
//! `Wallet` traits:
//! - `NodeClient`: read-only contract calls, account state, transaction feed
//! - `Wallet`: signs and submits internal messages on behalf of the sender
//!
//! `ToncenterClient` implements `NodeClient` over the toncenter HTTP API.
//! Wallet implementations (key management, signing) live outside this crate.

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::tlb::{Address, Cell, CellSlice, CodecError, Coins};

#[cfg(test)]
pub(crate) mod mock;
pub mod toncenter;

pub use toncenter::ToncenterClient;

/// Errors raised by the node RPC collaborator
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Get-method {method} exited with code {exit_code}")]
    GetMethodFailed { method: String, exit_code: i64 },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised by the wallet collaborator
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Masterchain block that contract calls are pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRef {
    pub workchain: i32,
    pub shard: i64,
    pub seqno: u32,
}

/// Subset of account state the swap flow needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountState {
    pub balance: Coins,
    /// Logical time of the latest transaction, the subscription checkpoint
    pub last_transaction_lt: u64,
    pub last_transaction_hash: Option<String>,
}

/// Value on the TVM stack, as passed to and returned from get-methods
#[derive(Debug, Clone, PartialEq)]
pub enum StackEntry {
    Int(BigInt),
    Cell(Cell),
    Slice(Cell),
    Null,
    Tuple(Vec<StackEntry>),
}

impl StackEntry {
    pub fn slice(slice: &CellSlice) -> Result<Self, CodecError> {
        Ok(StackEntry::Slice(slice.to_cell()?))
    }

    pub fn int(value: impl Into<BigInt>) -> Self {
        StackEntry::Int(value.into())
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            StackEntry::Int(value) => Some(value),
            _ => None,
        }
    }

    /// Cells and slices both open as a slice
    pub fn as_slice(&self) -> Option<CellSlice> {
        match self {
            StackEntry::Cell(cell) | StackEntry::Slice(cell) => Some(cell.parse()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StackEntry::Int(_) => "int",
            StackEntry::Cell(_) => "cell",
            StackEntry::Slice(_) => "slice",
            StackEntry::Null => "null",
            StackEntry::Tuple(_) => "tuple",
        }
    }
}

/// Summary of a message attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub value: Coins,
}

/// Observed on-chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub lt: u64,
    pub hash: String,
    pub utime: u64,
    pub in_message: Option<MessageSummary>,
    pub out_messages: Vec<MessageSummary>,
}

/// Outgoing internal message submitted through a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMessage {
    pub destination: Address,
    pub value: Coins,
    pub body: Cell,
    pub bounce: bool,
}

impl InternalMessage {
    /// Bounceable message, the default for contract calls
    pub fn new(destination: Address, value: Coins, body: Cell) -> Self {
        Self {
            destination,
            value,
            body,
            bounce: true,
        }
    }
}

#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Latest masterchain block
    async fn masterchain_info(&self) -> Result<BlockRef, NodeError>;

    /// Run a read-only contract get-method at `block`
    async fn run_get_method(
        &self,
        block: &BlockRef,
        address: &Address,
        method: &str,
        args: Vec<StackEntry>,
    ) -> Result<Vec<StackEntry>, NodeError>;

    async fn get_account(&self, block: &BlockRef, address: &Address)
        -> Result<AccountState, NodeError>;

    /// Forward transactions of `address` newer than `from_lt` into `sink`,
    /// oldest first, until the receiving side is dropped.
    ///
    /// Returns `Ok(())` once the sink closes. Cancellation happens by
    /// dropping the returned future.
    async fn subscribe_transactions(
        &self,
        address: &Address,
        from_lt: u64,
        sink: mpsc::Sender<Transaction>,
    ) -> Result<(), NodeError>;
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Address of the sending wallet contract
    fn address(&self) -> Address;

    /// Sign and submit. With `wait_for_inclusion` the call returns once the
    /// outgoing message is seated in a block.
    async fn send(&self, message: InternalMessage, wait_for_inclusion: bool)
        -> Result<(), WalletError>;

    /// Sign, submit and return the wallet transaction that carried it
    async fn send_and_await_transaction(
        &self,
        message: InternalMessage,
    ) -> Result<Transaction, WalletError>;
}
