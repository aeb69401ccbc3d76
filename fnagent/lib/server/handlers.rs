//! HTTP request handlers for the agent endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::state::AgentState;
use crate::{
    api::{AgentResult, HealthResponse, InvokeRequest, LoadRequest, LoadResponse},
    executor::LoadedFunction,
};

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// Handler for the GET /health endpoint.
///
/// Probe target; reports ready as soon as the server is up.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        ready: true,
    })
}

/// Handler for the POST /load endpoint.
///
/// Installs code, handler name and environment variables for subsequent
/// invocations, replacing whatever was loaded before.
pub async fn load_handler(
    State(state): State<AgentState>,
    Json(req): Json<LoadRequest>,
) -> impl IntoResponse {
    if req.code.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoadResponse {
                success: false,
                message: "missing 'code' field".to_string(),
            }),
        );
    }

    state
        .set_loaded(LoadedFunction {
            code: req.code,
            handler: req.handler,
            env_vars: req.env_vars,
        })
        .await;

    tracing::info!("function loaded");

    (
        StatusCode::OK,
        Json(LoadResponse {
            success: true,
            message: "function loaded".to_string(),
        }),
    )
}

/// Handler for the POST /invoke endpoint.
///
/// Executes the loaded function once. Inline code in the request is loaded
/// first (one-shot path). Execution failures come back as a structured
/// [`AgentResult`], not as an HTTP error.
pub async fn invoke_handler(
    State(state): State<AgentState>,
    Json(req): Json<InvokeRequest>,
) -> impl IntoResponse {
    if let Some(code) = req.code {
        state
            .set_loaded(LoadedFunction {
                code,
                handler: req.handler.unwrap_or_else(|| "handler".to_string()),
                env_vars: req.env_vars.unwrap_or_default(),
            })
            .await;
    }

    let Some(function) = state.loaded().await else {
        return Json(AgentResult::failed(
            "no function code loaded",
            String::new(),
            0,
        ));
    };

    tracing::info!(
        handler = %function.handler,
        timeout_seconds = req.timeout_seconds,
        "invoking handler"
    );

    let result = state
        .executor()
        .execute(&function, &req.event, req.timeout_seconds)
        .await;

    Json(result)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
