//! API endpoints for the swap service

use axum::{
    routing::{get, post},
    Router,
};

mod pool;
mod swap;

use crate::dex::SwapPlanner;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub planner: SwapPlanner,
}

impl AppState {
    pub fn new(planner: SwapPlanner) -> Self {
        Self { planner }
    }
}

/// Create the API router with all endpoints
pub fn router(planner: SwapPlanner) -> Router {
    let app_state = AppState::new(planner);

    Router::new()
        // Router lookups
        .route("/pool", get(pool::get_pool))
        .route("/vault", get(pool::get_vault))
        // Unsigned swap messages
        .route("/swap/plan", post(swap::plan_swap))
        .with_state(app_state)
}
