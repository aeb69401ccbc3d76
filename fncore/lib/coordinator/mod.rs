//! Async task coordination: deploy, undeploy and invoke work runs as
//! background jobs pulled off a queue.
//!
//! Deploy and undeploy retry with fixed backoff and park the function in
//! `error` on exhaustion. Invocations are guarded by admission control (a
//! per-function concurrency cap) and a circuit breaker (recent failure-rate
//! cap); both reject before any invocation record exists and are never
//! retried — an invocation's failure is terminal and recorded.
//!
//! The orchestrator and gateway sit behind small traits so job logic is
//! exercisable without a cluster.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use fnagent::api::AgentResult;
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{
    config::FncoreConfig,
    gateway::InvocationGateway,
    orchestrator::{DeployRequest, DeploymentDescriptor, KubernetesOrchestrator},
    FncoreResult,
};

mod jobs;
mod queue;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use queue::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The cluster-facing side of deploy/undeploy jobs.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Provisions the cluster objects for one function and waits for
    /// readiness.
    async fn deploy(&self, req: &DeployRequest) -> FncoreResult<DeploymentDescriptor>;

    /// Tears down the cluster objects of one workload; idempotent.
    async fn delete(&self, workload_name: &str) -> FncoreResult<()>;
}

/// The invocation-forwarding side of invoke jobs.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Forwards one invocation and classifies every failure into the result.
    async fn invoke(
        &self,
        endpoint_name: &str,
        event: Value,
        timeout_seconds: u64,
        code: &str,
        handler: &str,
    ) -> AgentResult;
}

/// Supplies already-decrypted secret pairs at invocation time. Secret
/// storage itself belongs to the outer layer; the core only consumes.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Decrypted key/value pairs for one function.
    async fn resolve(&self, function_uuid: &Uuid) -> HashMap<String, String>;
}

/// A resolver for deployments without secrets.
pub struct NoSecrets;

/// Tunables of the coordinator, defaulted from configuration.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CoordinatorOptions {
    /// Namespace recorded on successfully deployed functions.
    #[builder(default = crate::config::DEFAULT_NAMESPACE.to_string())]
    pub namespace: String,

    /// Admission control cap.
    #[builder(default = crate::config::DEFAULT_MAX_CONCURRENT_INVOCATIONS)]
    pub max_concurrent_invocations: i64,

    /// Circuit-breaker sample size.
    #[builder(default = crate::config::DEFAULT_BREAKER_SAMPLE)]
    pub breaker_sample: i64,

    /// Circuit-breaker trip threshold.
    #[builder(default = crate::config::DEFAULT_BREAKER_THRESHOLD)]
    pub breaker_threshold: i64,

    /// Circuit-breaker window in seconds.
    #[builder(default = crate::config::DEFAULT_BREAKER_WINDOW_SECONDS)]
    pub breaker_window_seconds: i64,

    /// Attempts per deploy/undeploy job.
    #[builder(default = crate::config::DEFAULT_JOB_RETRIES)]
    pub job_retries: u32,

    /// Backoff between deploy attempts.
    #[builder(default = Duration::from_secs(crate::config::DEFAULT_DEPLOY_BACKOFF_SECONDS))]
    pub deploy_backoff: Duration,

    /// Backoff between undeploy attempts.
    #[builder(default = Duration::from_secs(crate::config::DEFAULT_UNDEPLOY_BACKOFF_SECONDS))]
    pub undeploy_backoff: Duration,
}

/// Executes background jobs against the store, the cluster backend and the
/// invocation gateway.
pub struct TaskCoordinator {
    pub(super) pool: Pool<Sqlite>,
    pub(super) backend: Arc<dyn ClusterBackend>,
    pub(super) invoker: Arc<dyn Invoker>,
    pub(super) secrets: Arc<dyn SecretResolver>,
    pub(super) options: CoordinatorOptions,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TaskCoordinator {
    /// Creates a coordinator tuned from configuration.
    pub fn new(
        pool: Pool<Sqlite>,
        backend: Arc<dyn ClusterBackend>,
        invoker: Arc<dyn Invoker>,
        secrets: Arc<dyn SecretResolver>,
        config: &FncoreConfig,
    ) -> Self {
        let options = CoordinatorOptions::builder()
            .namespace(config.get_namespace().clone())
            .max_concurrent_invocations(*config.get_max_concurrent_invocations())
            .breaker_sample(*config.get_breaker_sample())
            .breaker_threshold(*config.get_breaker_threshold())
            .breaker_window_seconds(*config.get_breaker_window_seconds())
            .job_retries(*config.get_job_retries())
            .deploy_backoff(Duration::from_secs(*config.get_deploy_backoff_seconds()))
            .undeploy_backoff(Duration::from_secs(*config.get_undeploy_backoff_seconds()))
            .build();

        Self::with_options(pool, backend, invoker, secrets, options)
    }

    /// Creates a coordinator with explicit options.
    pub fn with_options(
        pool: Pool<Sqlite>,
        backend: Arc<dyn ClusterBackend>,
        invoker: Arc<dyn Invoker>,
        secrets: Arc<dyn SecretResolver>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            pool,
            backend,
            invoker,
            secrets,
            options,
        }
    }

    /// Runs one job to completion.
    pub async fn handle(&self, job: Job) -> FncoreResult<()> {
        match job {
            Job::Deploy { function_uuid } => self.run_deploy(function_uuid).await,
            Job::Undeploy { function_uuid } => self.run_undeploy(function_uuid).await,
            Job::Invoke {
                function_uuid,
                event,
                request_id,
            } => self
                .run_invocation(function_uuid, event, request_id, "invocation")
                .await
                .map(|_| ()),
            Job::Test {
                function_uuid,
                event,
            } => self
                .run_invocation(function_uuid, event, None, "test invocation")
                .await
                .map(|_| ()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ClusterBackend for KubernetesOrchestrator {
    async fn deploy(&self, req: &DeployRequest) -> FncoreResult<DeploymentDescriptor> {
        KubernetesOrchestrator::deploy(self, req).await
    }

    async fn delete(&self, workload_name: &str) -> FncoreResult<()> {
        KubernetesOrchestrator::delete(self, workload_name).await
    }
}

#[async_trait]
impl Invoker for InvocationGateway {
    async fn invoke(
        &self,
        endpoint_name: &str,
        event: Value,
        timeout_seconds: u64,
        code: &str,
        handler: &str,
    ) -> AgentResult {
        InvocationGateway::invoke(self, endpoint_name, event, timeout_seconds, code, handler).await
    }
}

#[async_trait]
impl SecretResolver for NoSecrets {
    async fn resolve(&self, _function_uuid: &Uuid) -> HashMap<String, String> {
        HashMap::new()
    }
}
