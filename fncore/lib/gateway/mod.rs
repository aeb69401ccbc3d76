//! Invocation gateway: forwards one invocation to a deployed function's
//! agent and classifies every failure mode into a structured result.
//!
//! Resolution depends on where the control plane runs. Inside the cluster
//! the endpoint's service DNS name is used directly; outside (development),
//! a temporary `kubectl port-forward` tunnel is opened on a random local
//! port and torn down when the call finishes, whatever the outcome.

use std::{collections::HashMap, time::Duration};

use fnagent::api::{AgentResult, InvokeRequest};
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::config::FncoreConfig;

mod tunnel;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use tunnel::*;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Reserved event key carrying decrypted secrets. Stripped from the event
/// body and forwarded as the agent's `env_vars` field.
pub const SECRETS_KEY: &str = "__secrets__";

/// Local port range for development tunnels.
const TUNNEL_PORT_RANGE: std::ops::Range<u16> = 30000..32000;

/// Slack added on top of the handler budget for transport overhead.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Longest response-body snippet surfaced in diagnostics.
const BODY_SNIPPET_LIMIT: usize = 500;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Forwards invocations to deployed functions.
pub struct InvocationGateway {
    http: reqwest::Client,
    namespace: String,
    agent_port: u16,
    kubectl_path: String,
    in_cluster: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl InvocationGateway {
    /// Creates a gateway. `in_cluster` decides between service DNS and
    /// development tunnels.
    pub fn new(config: &FncoreConfig, in_cluster: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            namespace: config.get_namespace().clone(),
            agent_port: *config.get_agent_port(),
            kubectl_path: config.get_kubectl_path().clone(),
            in_cluster,
        }
    }

    /// Invokes a function through its endpoint. Never fails: every transport
    /// and protocol problem is folded into an [`AgentResult`] so invocation
    /// outcomes always have one shape.
    pub async fn invoke(
        &self,
        endpoint_name: &str,
        event: Value,
        timeout_seconds: u64,
        code: &str,
        handler: &str,
    ) -> AgentResult {
        if self.in_cluster {
            let url = format!(
                "http://{}.{}.svc.cluster.local:{}/invoke",
                endpoint_name, self.namespace, self.agent_port
            );
            tracing::info!("invoking function at {}", url);
            return self
                .call_agent(&url, event, timeout_seconds, code, handler)
                .await;
        }

        // Development path: tunnel to the service for the duration of the
        // call. Random port to avoid collisions between concurrent invokes.
        let local_port = rand::rng().random_range(TUNNEL_PORT_RANGE);
        let tunnel = match PortForwardTunnel::open(
            &self.kubectl_path,
            endpoint_name,
            &self.namespace,
            local_port,
            self.agent_port,
        )
        .await
        {
            Ok(tunnel) => tunnel,
            Err(e) => {
                tracing::error!("failed to establish tunnel to {}: {}", endpoint_name, e);
                return AgentResult::failed(
                    format!("could not establish tunnel to {}: {}", endpoint_name, e),
                    String::new(),
                    0,
                );
            }
        };

        let url = format!("http://localhost:{}/invoke", tunnel.local_port());
        tracing::info!("invoking function at {}", url);
        let result = self
            .call_agent(&url, event, timeout_seconds, code, handler)
            .await;

        tunnel.close().await;
        result
    }

    /// Performs the agent call and maps every failure mode to a structured
    /// result: request timeout, connection failure, non-2xx status, non-JSON
    /// content type, empty body, and parse failure.
    pub(crate) async fn call_agent(
        &self,
        url: &str,
        event: Value,
        timeout_seconds: u64,
        code: &str,
        handler: &str,
    ) -> AgentResult {
        let (event, secrets) = strip_secrets(event);
        if !secrets.is_empty() {
            tracing::info!("passing {} secrets as environment variables", secrets.len());
        }

        let payload = InvokeRequest {
            event,
            timeout_seconds,
            code: Some(code.to_string()),
            handler: Some(handler.to_string()),
            env_vars: (!secrets.is_empty()).then_some(secrets),
        };

        let response = match self
            .http
            .post(url)
            .json(&payload)
            .timeout(Duration::from_secs(timeout_seconds) + REQUEST_TIMEOUT_SLACK)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::error!("invocation timed out after {}s", timeout_seconds);
                return AgentResult {
                    success: false,
                    result: None,
                    error: Some(format!(
                        "Function execution exceeded {} seconds",
                        timeout_seconds
                    )),
                    logs: String::new(),
                    execution_time_ms: timeout_seconds * 1000,
                    memory_used_mb: 0,
                };
            }
            Err(e) if e.is_connect() => {
                tracing::error!("failed to connect to function endpoint: {}", e);
                return AgentResult::failed(
                    format!("failed to connect to function endpoint: {}", e),
                    String::new(),
                    0,
                );
            }
            Err(e) => {
                tracing::error!("invocation request failed: {}", e);
                return AgentResult::failed(
                    format!("request to function endpoint failed: {}", e),
                    String::new(),
                    0,
                );
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        tracing::info!(
            "function response status: {}, content-type: {}",
            status,
            content_type
        );

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return AgentResult::failed(
                    format!("failed to read function response body: {}", e),
                    String::new(),
                    0,
                )
            }
        };

        if !status.is_success() {
            tracing::error!(
                "function returned HTTP {}: {}",
                status.as_u16(),
                snippet(&body, 200)
            );
            return AgentResult::failed(
                format!("function returned HTTP error {}", status.as_u16()),
                snippet(&body, BODY_SNIPPET_LIMIT),
                0,
            );
        }

        if !content_type.contains("application/json") {
            tracing::error!(
                "function returned non-JSON response: content-type={}, body={}",
                content_type,
                snippet(&body, 200)
            );
            return AgentResult::failed(
                format!(
                    "function returned non-JSON response (content-type: {})",
                    content_type
                ),
                snippet(&body, BODY_SNIPPET_LIMIT),
                0,
            );
        }

        if body.trim().is_empty() {
            tracing::error!("function returned empty response");
            return AgentResult::failed("function returned empty response", String::new(), 0);
        }

        match serde_json::from_str::<AgentResult>(&body) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    "failed to parse function response: {}, body={}",
                    e,
                    snippet(&body, 200)
                );
                AgentResult::failed(
                    format!("failed to parse function response as JSON: {}", e),
                    snippet(&body, BODY_SNIPPET_LIMIT),
                    0,
                )
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Removes the reserved secrets key from an event and returns the remaining
/// event plus the extracted key/value pairs.
pub(crate) fn strip_secrets(event: Value) -> (Value, HashMap<String, String>) {
    let Value::Object(mut map) = event else {
        return (event, HashMap::new());
    };

    let secrets = match map.remove(SECRETS_KEY) {
        Some(Value::Object(secrets)) => secrets
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect(),
        _ => HashMap::new(),
    };

    (Value::Object(map), secrets)
}

fn snippet(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
