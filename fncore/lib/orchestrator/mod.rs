//! Deployment orchestration against the Kubernetes API.
//!
//! Each deployed function owns four cluster objects: a ConfigMap holding its
//! code, a Deployment running the execution agent, a ClusterIP Service in
//! front of it, and a HorizontalPodAutoscaler. This module creates them,
//! waits for readiness, reports status, scales, and tears everything down
//! tolerantly.

use chrono::{DateTime, Utc};
use kube::{Client, Config};
use uuid::Uuid;

use crate::{runtime::RuntimeRegistry, FncoreError, FncoreResult};

mod delete;
mod deploy;
mod status;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use deploy::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Everything the orchestrator needs to deploy one function.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// The stable identifier of the function.
    pub function_id: Uuid,

    /// The runtime identifier; must be present in the registry.
    pub runtime: String,

    /// The source code, published as the workload's code bundle.
    pub code: String,

    /// Formatted dependency specs, in install order.
    pub dependencies: Vec<String>,

    /// Memory request in MB.
    pub memory_mb: i64,

    /// Execution timeout in seconds (recorded on the workload for operators).
    pub timeout_seconds: i64,

    /// vCPU request; fractions allowed.
    pub vcpus: f64,
}

/// What a successful deploy hands back to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDescriptor {
    /// Name of the created workload.
    pub workload_name: String,

    /// Name of the created endpoint.
    pub endpoint_name: String,

    /// Cluster IP assigned to the endpoint.
    pub ip: Option<String>,

    /// Name of the first ready pod.
    pub pod_name: Option<String>,

    /// Coarse workload status, `running` once ready.
    pub status: String,
}

/// Per-pod status inside a workload.
#[derive(Debug, Clone, PartialEq)]
pub struct PodStatus {
    /// The pod name.
    pub name: String,

    /// The pod phase (`Running`, `Pending`, ...).
    pub phase: String,

    /// Whether every container in the pod reports ready.
    pub ready: bool,

    /// Total container restarts.
    pub restarts: i32,
}

/// Administrative status view of one workload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadStatus {
    /// Name of the workload.
    pub workload_name: String,

    /// `running` with at least one ready replica, `pending` otherwise,
    /// `not_found` when the workload does not exist.
    pub status: String,

    /// Replicas currently ready.
    pub ready_replicas: i32,

    /// Replicas desired.
    pub desired_replicas: i32,

    /// Pod-level detail.
    pub pods: Vec<PodStatus>,
}

/// One row of the administrative workload listing.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSummary {
    /// Function identifier recorded on the workload's labels.
    pub function_id: String,

    /// Name of the workload.
    pub workload_name: String,

    /// Replicas desired.
    pub replicas: i32,

    /// Replicas currently ready.
    pub ready_replicas: i32,

    /// When the workload was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// Orchestrates function workloads in one cluster namespace.
pub struct KubernetesOrchestrator {
    pub(super) client: Client,
    pub(super) namespace: String,
    pub(super) registry: RuntimeRegistry,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KubernetesOrchestrator {
    /// Creates an orchestrator over an established cluster client.
    pub fn new(client: Client, namespace: String, registry: RuntimeRegistry) -> Self {
        Self {
            client,
            namespace,
            registry,
        }
    }

    /// The namespace this orchestrator deploys into.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds a cluster client, preferring in-cluster configuration and falling
/// back to the local kubeconfig for development. The second element reports
/// whether the in-cluster path was taken; the gateway uses it to decide
/// between service DNS and a tunnel.
pub async fn cluster_client() -> FncoreResult<(Client, bool)> {
    match Config::incluster() {
        Ok(config) => {
            let client = Client::try_from(config)?;
            tracing::info!("loaded in-cluster kubernetes config");
            Ok((client, true))
        }
        Err(_) => {
            let config = Config::infer()
                .await
                .map_err(|e| FncoreError::ClusterConfig(e.to_string()))?;
            let client = Client::try_from(config)?;
            tracing::info!("loaded local kubernetes config");
            Ok((client, false))
        }
    }
}

/// Workload name for a function: `func-` plus the first eight characters of
/// its identifier.
pub fn workload_name_for(function_id: &Uuid) -> String {
    format!("func-{}", &function_id.to_string()[..8])
}

/// Endpoint name fronting a workload.
pub fn endpoint_name_for(workload_name: &str) -> String {
    format!("{}-svc", workload_name)
}

/// Autoscaler name bound to a workload.
pub fn autoscaler_name_for(workload_name: &str) -> String {
    format!("{}-hpa", workload_name)
}

/// Whether a cluster error is a plain 404.
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
