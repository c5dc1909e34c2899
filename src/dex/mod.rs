//! DeDust swap engine
//!
//! - `asset`: asset identifiers and their slice encoding
//! - `messages`: swap and jetton transfer bodies
//! - `pool`: pool and vault lookups through the router
//! - `jetton`: jetton master / wallet get-methods
//! - `orchestrator`: direction, planning and submission
//! - `monitor`: bounded watch on the router's transactions

pub mod asset;
pub mod error;
pub mod jetton;
pub mod messages;
pub mod monitor;
pub mod orchestrator;
pub mod pool;

pub use asset::AssetIdentifier;
pub use error::{ResolutionError, SwapError};
pub use jetton::{JettonMaster, JettonWallet};
pub use messages::{
    DexMessage, JettonSwapRequest, JettonTransfer, NativeSwapRequest, SwapMessageFactory,
    SwapParams, SwapStep,
};
pub use monitor::{MonitorState, TransactionMonitor, TransactionWatch};
pub use orchestrator::{SwapDirection, SwapOrchestrator, SwapPlan, SwapPlanner, SwapReceipt};
pub use pool::{ParsePoolTypeError, Pool, PoolResolver, PoolType, VaultResolver};
