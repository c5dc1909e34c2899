//! Swap error taxonomy

use crate::node::{NodeError, StackEntry, WalletError};
use crate::tlb::{Address, CodecError};

use super::asset::AssetIdentifier;

/// Why a contract lookup failed
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Unexpected stack from {method}: {detail}")]
    UnexpectedStack { method: String, detail: String },
}

impl ResolutionError {
    pub(crate) fn unexpected(method: &str, detail: impl Into<String>) -> Self {
        Self::UnexpectedStack {
            method: method.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// Neither or both legs are the native asset
    #[error("Invalid swap strategy: {token_in} -> {token_out}")]
    InvalidSwapStrategy {
        token_in: AssetIdentifier,
        token_out: AssetIdentifier,
    },

    #[error("Pool resolution failed for {asset_a}/{asset_b}: {source}")]
    PoolResolutionFailed {
        asset_a: AssetIdentifier,
        asset_b: AssetIdentifier,
        #[source]
        source: ResolutionError,
    },

    #[error("Vault resolution failed for {asset}: {source}")]
    VaultResolutionFailed {
        asset: AssetIdentifier,
        #[source]
        source: ResolutionError,
    },

    #[error("Jetton wallet resolution failed for master {master}: {source}")]
    JettonWalletResolutionFailed {
        master: Address,
        #[source]
        source: ResolutionError,
    },

    #[error("Encoding error: {0}")]
    Encoding(#[from] CodecError),

    #[error("Submission failed: {0}")]
    Submission(#[from] WalletError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),
}

impl SwapError {
    /// Caller-fixable configuration problem, never worth retrying
    pub fn is_configuration(&self) -> bool {
        matches!(self, SwapError::InvalidSwapStrategy { .. })
    }
}

/// Entry `index` of a get-method result as a slice
pub(crate) fn stack_slice(
    stack: &[StackEntry],
    index: usize,
    method: &str,
) -> Result<crate::tlb::CellSlice, ResolutionError> {
    let entry = stack.get(index).ok_or_else(|| {
        ResolutionError::unexpected(method, format!("{} entries, wanted index {}", stack.len(), index))
    })?;
    entry.as_slice().ok_or_else(|| {
        ResolutionError::unexpected(method, format!("entry {} is {}, wanted slice", index, entry.kind()))
    })
}

/// Entry `index` of a get-method result as an integer
pub(crate) fn stack_int<'a>(
    stack: &'a [StackEntry],
    index: usize,
    method: &str,
) -> Result<&'a num_bigint::BigInt, ResolutionError> {
    let entry = stack.get(index).ok_or_else(|| {
        ResolutionError::unexpected(method, format!("{} entries, wanted index {}", stack.len(), index))
    })?;
    entry.as_int().ok_or_else(|| {
        ResolutionError::unexpected(method, format!("entry {} is {}, wanted int", index, entry.kind()))
    })
}
