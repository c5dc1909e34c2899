//! Pool and vault lookup endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::dex::{AssetIdentifier, Pool};
use crate::tlb::Address;
use crate::types::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct PoolQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct VaultQuery {
    pub asset: String,
}

/// Pool snapshot; reserves are decimal strings
#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub address: Address,
    pub raw_address: String,
    pub pool_type: &'static str,
    pub token0: AssetIdentifier,
    pub token1: AssetIdentifier,
    pub reserve0: String,
    pub reserve1: String,
    pub lp_fee: String,
}

impl From<Pool> for PoolResponse {
    fn from(pool: Pool) -> Self {
        Self {
            address: pool.address,
            raw_address: pool.address.to_raw(),
            pool_type: if pool.is_stable { "stable" } else { "volatile" },
            token0: pool.token0,
            token1: pool.token1,
            reserve0: pool.reserve0.to_string(),
            reserve1: pool.reserve1.to_string(),
            lp_fee: pool.lp_fee.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VaultResponse {
    pub asset: AssetIdentifier,
    pub vault: Address,
}

pub(crate) fn parse_asset(field: &str, value: &str) -> ApiResult<AssetIdentifier> {
    value
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {}: {} ({})", field, value, e)))
}

/// GET /api/pool?from=&to= - Resolve the pool for an asset pair
pub async fn get_pool(
    State(state): State<AppState>,
    Query(query): Query<PoolQuery>,
) -> ApiResult<Json<PoolResponse>> {
    let from = parse_asset("from", &query.from)?;
    let to = parse_asset("to", &query.to)?;
    if from == to {
        return Err(ApiError::BadRequest("Pool needs two different assets".into()));
    }

    let pool = state.planner.pools().resolve(from, to).await?;
    Ok(Json(pool.into()))
}

/// GET /api/vault?asset= - Resolve the router vault for an asset
pub async fn get_vault(
    State(state): State<AppState>,
    Query(query): Query<VaultQuery>,
) -> ApiResult<Json<VaultResponse>> {
    let asset = parse_asset("asset", &query.asset)?;
    let vault = state.planner.vaults().resolve(asset).await?;
    Ok(Json(VaultResponse { asset, vault }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DexConfig;
    use crate::dex::pool::tests::{native_vault, pool_address, router, scripted_node, token};
    use crate::dex::SwapPlanner;
    use std::sync::Arc;

    fn state() -> AppState {
        let planner = SwapPlanner::new(Arc::new(scripted_node()), DexConfig::new(router()));
        AppState::new(planner)
    }

    #[tokio::test]
    async fn test_get_pool() {
        let query = PoolQuery {
            from: "native".into(),
            to: token().to_string(),
        };
        let Json(pool) = get_pool(State(state()), Query(query)).await.unwrap();
        assert_eq!(pool.address, pool_address());
        assert_eq!(pool.pool_type, "volatile");
        assert_eq!(pool.token0, AssetIdentifier::Native);
        assert_eq!(pool.reserve0, "1000000000000");
        assert_eq!(pool.reserve1, "2500000");
    }

    #[tokio::test]
    async fn test_get_pool_rejects_bad_asset() {
        let query = PoolQuery {
            from: "native".into(),
            to: "not-an-address".into(),
        };
        let err = get_pool(State(state()), Query(query)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_get_vault() {
        let query = VaultQuery {
            asset: "ton".into(),
        };
        let Json(vault) = get_vault(State(state()), Query(query)).await.unwrap();
        assert_eq!(vault.asset, AssetIdentifier::Native);
        assert_eq!(vault.vault, native_vault());
    }
}
