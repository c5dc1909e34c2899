//! Swap planning endpoint
//!
//! Returns the unsigned message a wallet must send to perform the swap.
//! Signing and submission stay with the caller.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::pool::parse_asset;
use crate::api::AppState;
use crate::dex::{AssetIdentifier, SwapDirection};
use crate::tlb::{boc, Address, Coins};
use crate::types::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct SwapPlanRequest {
    /// Wallet that will sign the message and receive the output
    pub sender: String,
    pub from_token: String,
    pub to_token: String,
    /// Amount in the input asset's smallest unit
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct SwapPlanResponse {
    pub direction: SwapDirection,
    pub from_token: AssetIdentifier,
    pub to_token: AssetIdentifier,
    pub amount: Coins,
    pub pool: Address,
    pub vault: Address,
    /// Destination of the wallet's internal message
    pub destination: Address,
    /// Nano TON attached to the message
    pub value: Coins,
    pub value_ton: String,
    pub query_id: String,
    /// Message body as base64 bag-of-cells
    pub body: String,
}

/// POST /api/swap/plan - Build the unsigned swap message for a wallet
pub async fn plan_swap(
    State(state): State<AppState>,
    Json(req): Json<SwapPlanRequest>,
) -> ApiResult<Json<SwapPlanResponse>> {
    let sender: Address = req
        .sender
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid sender: {} ({})", req.sender, e)))?;
    let from = parse_asset("from_token", &req.from_token)?;
    let to = parse_asset("to_token", &req.to_token)?;
    let amount: Coins = req
        .amount
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid amount".into()))?;
    if amount == Coins::ZERO {
        return Err(ApiError::BadRequest("Amount must be positive".into()));
    }

    let plan = state.planner.plan(&sender, from, to, amount).await?;
    let body = boc::to_base64(&plan.body)?;

    tracing::info!(
        "Planned {:?} swap {} -> {} for {}: {} TON to {}",
        plan.direction,
        from,
        to,
        sender,
        plan.value.to_ton_string(),
        plan.destination
    );

    Ok(Json(SwapPlanResponse {
        direction: plan.direction,
        from_token: from,
        to_token: to,
        amount,
        pool: plan.pool.address,
        vault: plan.vault,
        destination: plan.destination,
        value: plan.value,
        value_ton: plan.value.to_ton_string(),
        query_id: plan.query_id.to_string(),
        body,
    }))
}
