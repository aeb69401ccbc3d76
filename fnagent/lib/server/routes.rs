//! Route definitions for the agent's HTTP server.

use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, state::AgentState};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates a router with the agent endpoints configured.
///
/// ## Arguments
/// * `state` - The shared agent state
pub fn create_router(state: AgentState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/load", post(handlers::load_handler))
        .route("/invoke", post(handlers::invoke_handler))
        .with_state(state)
}
