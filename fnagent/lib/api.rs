//! Wire contract between the agent and the control plane.
//!
//! The invocation gateway in the control plane serializes these same types,
//! so both sides of the `/invoke` call share one definition.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Request body for the `/load` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Source code of the function.
    pub code: String,

    /// Name of the handler entry point within the code.
    #[serde(default = "default_handler")]
    pub handler: String,

    /// Environment variables exported to the handler's process.
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

/// Response body for the `/load` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadResponse {
    /// Whether the function was loaded.
    pub success: bool,

    /// Human-readable status message.
    pub message: String,
}

/// Request body for the `/invoke` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Event payload handed to the handler.
    #[serde(default)]
    pub event: Value,

    /// Hard execution budget in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Source code for one-shot execution. When present it is loaded before
    /// the handler runs, replacing any previously loaded function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Handler name accompanying one-shot code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    /// Environment variables accompanying one-shot code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<HashMap<String, String>>,
}

/// Outcome of a single handler execution.
///
/// Every invocation produces exactly one of these, whether the handler
/// succeeded, raised, or overran its budget. The gateway also synthesizes
/// them for transport-level failures, so the shape is deliberately flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the handler ran to completion and returned a value.
    pub success: bool,

    /// The handler's return value, when successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error description, when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Captured stdout/stderr text.
    #[serde(default)]
    pub logs: String,

    /// Wall-clock execution time in milliseconds. Equals the timeout budget
    /// in milliseconds when the handler was cut off.
    #[serde(default)]
    pub execution_time_ms: u64,

    /// Delta in peak resident memory over the call, in MiB.
    #[serde(default)]
    pub memory_used_mb: u64,
}

/// Response body for the `/health` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process is serving.
    pub status: String,

    /// Whether the agent is ready to accept invocations.
    pub ready: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AgentResult {
    /// Creates a successful result.
    pub fn ok(result: Value, logs: String, execution_time_ms: u64, memory_used_mb: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            logs,
            execution_time_ms,
            memory_used_mb,
        }
    }

    /// Creates a failed result.
    pub fn failed(error: impl Into<String>, logs: String, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            logs,
            execution_time_ms,
            memory_used_mb: 0,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_handler() -> String {
    "handler".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}
