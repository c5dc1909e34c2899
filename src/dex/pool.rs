//! Pool and vault resolution against the router contract
//!
//! All calls for one resolution are pinned to the same masterchain block so
//! the pool address, asset order and reserves come from a single snapshot.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::node::{BlockRef, NodeClient, StackEntry};
use crate::tlb::Address;

use super::asset::AssetIdentifier;
use super::error::{stack_int, stack_slice, ResolutionError, SwapError};

const GET_POOL_ADDRESS: &str = "get_pool_address";
const GET_VAULT_ADDRESS: &str = "get_vault_address";
const GET_ASSETS: &str = "get_assets";
const GET_RESERVES: &str = "get_reserves";

/// Curve selector passed to `get_pool_address`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    #[default]
    Volatile,
    Stable,
}

impl PoolType {
    pub fn as_int(&self) -> u8 {
        match self {
            PoolType::Volatile => 0,
            PoolType::Stable => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown pool type: {0}")]
pub struct ParsePoolTypeError(String);

impl FromStr for PoolType {
    type Err = ParsePoolTypeError;

    /// Name or the integer selector `get_pool_address` takes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volatile" | "0" => Ok(PoolType::Volatile),
            "stable" | "1" => Ok(PoolType::Stable),
            _ => Err(ParsePoolTypeError(s.to_string())),
        }
    }
}

/// Point-in-time view of a pool. Reserves may be stale by execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub address: Address,
    pub is_stable: bool,
    /// Asset order as reported by the pool, not by the caller
    pub token0: AssetIdentifier,
    pub token1: AssetIdentifier,
    pub reserve0: BigUint,
    pub reserve1: BigUint,
    pub lp_fee: BigUint,
}

/// Looks up pools through the router's `get_pool_address`
#[derive(Clone)]
pub struct PoolResolver {
    node: Arc<dyn NodeClient>,
    router: Address,
    pool_type: PoolType,
}

impl PoolResolver {
    pub fn new(node: Arc<dyn NodeClient>, router: Address, pool_type: PoolType) -> Self {
        Self {
            node,
            router,
            pool_type,
        }
    }

    pub async fn resolve(
        &self,
        asset_a: AssetIdentifier,
        asset_b: AssetIdentifier,
    ) -> Result<Pool, SwapError> {
        self.resolve_inner(asset_a, asset_b)
            .await
            .map_err(|source| SwapError::PoolResolutionFailed {
                asset_a,
                asset_b,
                source,
            })
    }

    async fn resolve_inner(
        &self,
        asset_a: AssetIdentifier,
        asset_b: AssetIdentifier,
    ) -> Result<Pool, ResolutionError> {
        let block = self.node.masterchain_info().await?;

        let args = vec![
            StackEntry::int(self.pool_type.as_int()),
            StackEntry::slice(&asset_a.to_slice()?)?,
            StackEntry::slice(&asset_b.to_slice()?)?,
        ];
        tracing::debug!("{} {}/{} on router {}", GET_POOL_ADDRESS, asset_a, asset_b, self.router);
        let stack = self
            .node
            .run_get_method(&block, &self.router, GET_POOL_ADDRESS, args)
            .await?;
        let address = stack_slice(&stack, 0, GET_POOL_ADDRESS)?.load_address()?;

        let (token0, token1) = self.assets(&block, &address).await?;
        let (reserve0, reserve1) = self.reserves(&block, &address).await?;

        tracing::debug!(
            "Resolved pool {}: {} / {}, reserves {} / {}",
            address,
            token0,
            token1,
            reserve0,
            reserve1
        );

        Ok(Pool {
            address,
            is_stable: self.pool_type == PoolType::Stable,
            token0,
            token1,
            reserve0,
            reserve1,
            lp_fee: BigUint::default(),
        })
    }

    async fn assets(
        &self,
        block: &BlockRef,
        pool: &Address,
    ) -> Result<(AssetIdentifier, AssetIdentifier), ResolutionError> {
        let stack = self
            .node
            .run_get_method(block, pool, GET_ASSETS, Vec::new())
            .await?;
        let token0 = AssetIdentifier::decode(&mut stack_slice(&stack, 0, GET_ASSETS)?)?;
        let token1 = AssetIdentifier::decode(&mut stack_slice(&stack, 1, GET_ASSETS)?)?;
        Ok((token0, token1))
    }

    async fn reserves(
        &self,
        block: &BlockRef,
        pool: &Address,
    ) -> Result<(BigUint, BigUint), ResolutionError> {
        let stack = self
            .node
            .run_get_method(block, pool, GET_RESERVES, Vec::new())
            .await?;
        let unsigned = |index: usize| -> Result<BigUint, ResolutionError> {
            stack_int(&stack, index, GET_RESERVES)?
                .to_biguint()
                .ok_or_else(|| ResolutionError::unexpected(GET_RESERVES, "negative reserve"))
        };
        Ok((unsigned(0)?, unsigned(1)?))
    }
}

/// Looks up per-asset vaults through the router's `get_vault_address`
#[derive(Clone)]
pub struct VaultResolver {
    node: Arc<dyn NodeClient>,
    router: Address,
}

impl VaultResolver {
    pub fn new(node: Arc<dyn NodeClient>, router: Address) -> Self {
        Self { node, router }
    }

    pub async fn resolve(&self, asset: AssetIdentifier) -> Result<Address, SwapError> {
        self.resolve_inner(asset)
            .await
            .map_err(|source| SwapError::VaultResolutionFailed { asset, source })
    }

    async fn resolve_inner(&self, asset: AssetIdentifier) -> Result<Address, ResolutionError> {
        let block = self.node.masterchain_info().await?;
        let args = vec![StackEntry::slice(&asset.to_slice()?)?];
        tracing::debug!("{} {} on router {}", GET_VAULT_ADDRESS, asset, self.router);
        let stack = self
            .node
            .run_get_method(&block, &self.router, GET_VAULT_ADDRESS, args)
            .await?;
        Ok(stack_slice(&stack, 0, GET_VAULT_ADDRESS)?.load_address()?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node::mock::MockNode;
    use crate::tlb::{Cell, CellBuilder};

    pub(crate) fn router() -> Address {
        Address::new(0, [0x01; 32])
    }

    pub(crate) fn pool_address() -> Address {
        Address::new(0, [0x02; 32])
    }

    pub(crate) fn native_vault() -> Address {
        Address::new(0, [0x03; 32])
    }

    pub(crate) fn jetton_vault() -> Address {
        Address::new(0, [0x04; 32])
    }

    pub(crate) fn token() -> AssetIdentifier {
        AssetIdentifier::FungibleToken {
            workchain: 0,
            address: [0x05; 32],
        }
    }

    pub(crate) fn address_cell(address: &Address) -> Cell {
        CellBuilder::new()
            .store_address(Some(address))
            .unwrap()
            .build()
            .unwrap()
    }

    /// Router and pool answering for the native/token pair
    pub(crate) fn scripted_node() -> MockNode {
        let node = MockNode::new();
        node.respond(
            router(),
            GET_POOL_ADDRESS,
            vec![StackEntry::Slice(address_cell(&pool_address()))],
        );
        node.respond(
            pool_address(),
            GET_ASSETS,
            vec![
                StackEntry::Slice(AssetIdentifier::Native.encode().unwrap()),
                StackEntry::Slice(token().encode().unwrap()),
            ],
        );
        node.respond(
            pool_address(),
            GET_RESERVES,
            vec![StackEntry::int(1_000_000_000_000u64), StackEntry::int(2_500_000u64)],
        );
        node.respond(
            router(),
            GET_VAULT_ADDRESS,
            vec![StackEntry::Slice(address_cell(&native_vault()))],
        );
        node
    }

    #[test]
    fn test_pool_type_parse() {
        assert_eq!("volatile".parse::<PoolType>().unwrap(), PoolType::Volatile);
        assert_eq!(" Stable ".parse::<PoolType>().unwrap(), PoolType::Stable);
        assert_eq!("1".parse::<PoolType>().unwrap(), PoolType::Stable);
        assert_eq!("0".parse::<PoolType>().unwrap().as_int(), 0);

        let err = "curve".parse::<PoolType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown pool type: curve");
    }

    #[tokio::test]
    async fn test_resolve_pool() {
        let node = Arc::new(scripted_node());
        let resolver = PoolResolver::new(node.clone(), router(), PoolType::Volatile);

        // caller order is token-first, pool reports native-first
        let pool = resolver.resolve(token(), AssetIdentifier::Native).await.unwrap();
        assert_eq!(pool.address, pool_address());
        assert!(!pool.is_stable);
        assert_eq!(pool.token0, AssetIdentifier::Native);
        assert_eq!(pool.token1, token());
        assert_eq!(pool.reserve0, BigUint::from(1_000_000_000_000u64));
        assert_eq!(pool.reserve1, BigUint::from(2_500_000u64));

        assert_eq!(node.calls(), vec![GET_POOL_ADDRESS, GET_ASSETS, GET_RESERVES]);
        let args = node.args_of(GET_POOL_ADDRESS);
        assert_eq!(args[0][0], StackEntry::int(0));
        assert_eq!(args[0][1], StackEntry::Slice(token().encode().unwrap()));
        assert_eq!(args[0][2], StackEntry::Slice(AssetIdentifier::Native.encode().unwrap()));
    }

    #[tokio::test]
    async fn test_stable_pool_type_is_passed_through() {
        let node = Arc::new(scripted_node());
        let resolver = PoolResolver::new(node.clone(), router(), PoolType::Stable);
        let pool = resolver.resolve(AssetIdentifier::Native, token()).await.unwrap();
        assert!(pool.is_stable);
        assert_eq!(node.args_of(GET_POOL_ADDRESS)[0][0], StackEntry::int(1));
    }

    #[tokio::test]
    async fn test_negative_reserve_rejected() {
        let node = scripted_node();
        node.respond(
            pool_address(),
            GET_RESERVES,
            vec![StackEntry::int(-5), StackEntry::int(10)],
        );
        let resolver = PoolResolver::new(Arc::new(node), router(), PoolType::Volatile);
        let err = resolver
            .resolve(AssetIdentifier::Native, token())
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::PoolResolutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_unexpected_shape_rejected() {
        let node = scripted_node();
        node.respond(router(), GET_POOL_ADDRESS, vec![StackEntry::int(7)]);
        let resolver = PoolResolver::new(Arc::new(node), router(), PoolType::Volatile);
        let err = resolver
            .resolve(AssetIdentifier::Native, token())
            .await
            .unwrap_err();
        match err {
            SwapError::PoolResolutionFailed {
                source: ResolutionError::UnexpectedStack { method, .. },
                ..
            } => assert_eq!(method, GET_POOL_ADDRESS),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_contract_error_is_pool_resolution_failure() {
        let node = scripted_node();
        node.fail(pool_address(), GET_ASSETS, 11);
        let resolver = PoolResolver::new(Arc::new(node), router(), PoolType::Volatile);
        let err = resolver
            .resolve(AssetIdentifier::Native, token())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SwapError::PoolResolutionFailed {
                source: ResolutionError::Node(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resolve_vault() {
        let node = Arc::new(scripted_node());
        let resolver = VaultResolver::new(node.clone(), router());
        let vault = resolver.resolve(AssetIdentifier::Native).await.unwrap();
        assert_eq!(vault, native_vault());
        assert_eq!(
            node.args_of(GET_VAULT_ADDRESS)[0],
            vec![StackEntry::Slice(AssetIdentifier::Native.encode().unwrap())]
        );
    }

    #[tokio::test]
    async fn test_vault_failure() {
        let node = MockNode::new();
        let resolver = VaultResolver::new(Arc::new(node), router());
        let err = resolver.resolve(token()).await.unwrap_err();
        assert!(matches!(err, SwapError::VaultResolutionFailed { .. }));
    }
}
