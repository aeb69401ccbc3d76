//! Job bodies: deploy, undeploy, and invocation handling.

use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::TaskCoordinator;
use crate::{
    gateway::SECRETS_KEY,
    models::{Function, FunctionStatus, InvocationStatus},
    orchestrator::DeployRequest,
    runtime::RuntimeFamily,
    store::{depsets, functions, invocations, triggers},
    FncoreError, FncoreResult,
};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TaskCoordinator {
    /// Deploys one function, retrying with fixed backoff. The status moves
    /// to `deploying` before any work and ends `active` or, after retry
    /// exhaustion, `error`.
    pub async fn run_deploy(&self, function_uuid: Uuid) -> FncoreResult<()> {
        let function = self.fetch(&function_uuid).await?;

        if !functions::begin_deploy(&self.pool, &function_uuid).await? {
            return Err(FncoreError::StatusConflict {
                uuid: function_uuid,
                to: "deploying".to_string(),
            });
        }

        tracing::info!(function = %function_uuid, "starting deployment");

        let dependencies = self.formatted_dependencies(&function_uuid).await?;
        let req = DeployRequest {
            function_id: function_uuid,
            runtime: function.runtime.clone(),
            code: function.code.clone(),
            dependencies,
            memory_mb: function.memory_mb,
            timeout_seconds: function.timeout_seconds,
            vcpus: function.vcpus,
        };

        let mut last_err = None;
        for attempt in 1..=self.options.job_retries {
            match self.backend.deploy(&req).await {
                Ok(descriptor) => {
                    functions::complete_deploy(
                        &self.pool,
                        &function_uuid,
                        &descriptor.workload_name,
                        &descriptor.endpoint_name,
                        &self.options.namespace,
                    )
                    .await?;
                    tracing::info!(
                        function = %function_uuid,
                        workload = %descriptor.workload_name,
                        "deployment succeeded"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        function = %function_uuid,
                        attempt,
                        retries = self.options.job_retries,
                        "deploy attempt failed: {}",
                        e
                    );
                    last_err = Some(e);
                    if attempt < self.options.job_retries {
                        tokio::time::sleep(self.options.deploy_backoff).await;
                    }
                }
            }
        }

        functions::fail_deploy(&self.pool, &function_uuid).await?;
        self.disable_triggers(&function_uuid).await;

        Err(last_err
            .unwrap_or_else(|| FncoreError::custom(anyhow::anyhow!("deploy failed without error"))))
    }

    /// Undeploys one function, retrying teardown with fixed backoff. Ends
    /// back in `draft` with binding fields cleared, or `error` on
    /// exhaustion. Either way the function leaves `active`, so its
    /// scheduled triggers are disabled.
    pub async fn run_undeploy(&self, function_uuid: Uuid) -> FncoreResult<()> {
        let function = self.fetch(&function_uuid).await?;

        if !functions::begin_undeploy(&self.pool, &function_uuid).await? {
            return Err(FncoreError::StatusConflict {
                uuid: function_uuid,
                to: "undeploying".to_string(),
            });
        }

        tracing::info!(function = %function_uuid, "starting undeployment");

        if let Some(workload_name) = &function.workload_name {
            let mut last_err = None;
            let mut deleted = false;
            for attempt in 1..=self.options.job_retries {
                match self.backend.delete(workload_name).await {
                    Ok(()) => {
                        deleted = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            function = %function_uuid,
                            attempt,
                            retries = self.options.job_retries,
                            "undeploy attempt failed: {}",
                            e
                        );
                        last_err = Some(e);
                        if attempt < self.options.job_retries {
                            tokio::time::sleep(self.options.undeploy_backoff).await;
                        }
                    }
                }
            }

            if !deleted {
                functions::fail_undeploy(&self.pool, &function_uuid).await?;
                self.disable_triggers(&function_uuid).await;
                return Err(last_err.unwrap_or_else(|| {
                    FncoreError::custom(anyhow::anyhow!("undeploy failed without error"))
                }));
            }
        }

        functions::complete_undeploy(&self.pool, &function_uuid).await?;
        self.disable_triggers(&function_uuid).await;

        tracing::info!(function = %function_uuid, "undeployment succeeded");
        Ok(())
    }

    /// Runs one invocation end to end: guards, record creation, the remote
    /// call, and persistence of the outcome. Returns the invocation row id.
    ///
    /// Guard rejections return before any record exists and are not
    /// retried. A failure after the record exists is terminal and recorded.
    pub async fn run_invocation(
        &self,
        function_uuid: Uuid,
        event: Value,
        request_id: Option<String>,
        label: &str,
    ) -> FncoreResult<i64> {
        let function = self.fetch(&function_uuid).await?;

        let endpoint_name = match (&function.status, &function.endpoint_name) {
            (FunctionStatus::Active, Some(endpoint)) => endpoint.clone(),
            _ => return Err(FncoreError::NotDeployed(function_uuid)),
        };

        self.check_circuit_breaker(&function_uuid).await?;
        self.check_admission(&function_uuid).await?;

        let request_id = request_id.unwrap_or_else(generate_request_id);
        let input_json = serde_json::to_string(&event).ok();

        let invocation = invocations::create_invocation(
            &self.pool,
            &function_uuid,
            &request_id,
            input_json.as_deref(),
        )
        .await?;

        tracing::info!(
            function = %function_uuid,
            invocation = invocation.id,
            request_id = %request_id,
            "starting {}",
            label
        );

        invocations::mark_running(&self.pool, invocation.id).await?;

        let event = self.inject_secrets(&function, event).await;

        let start = Instant::now();
        let result = self
            .invoker
            .invoke(
                &endpoint_name,
                event,
                function.timeout_seconds.max(0) as u64,
                &function.code,
                &function.handler,
            )
            .await;

        let duration_ms = if result.execution_time_ms > 0 {
            result.execution_time_ms as i64
        } else {
            start.elapsed().as_millis() as i64
        };

        let status = if result.success {
            InvocationStatus::Success
        } else if result
            .error
            .as_deref()
            .is_some_and(is_timeout_error)
        {
            InvocationStatus::Timeout
        } else {
            InvocationStatus::Error
        };

        invocations::complete_invocation(
            &self.pool,
            invocation.id,
            invocations::InvocationOutcome {
                status,
                output_json: result
                    .result
                    .as_ref()
                    .and_then(|v| serde_json::to_string(v).ok()),
                error_message: result.error.unwrap_or_default(),
                logs: result.logs,
                duration_ms: Some(duration_ms),
                memory_used_mb: Some(result.memory_used_mb as i64),
            },
        )
        .await?;

        functions::bump_invocation_stats(&self.pool, &function_uuid).await?;

        tracing::info!(
            function = %function_uuid,
            invocation = invocation.id,
            status = %status,
            "{} completed",
            label
        );

        Ok(invocation.id)
    }

    //----------------------------------------------------------------------------------------------
    // Helpers
    //----------------------------------------------------------------------------------------------

    async fn fetch(&self, function_uuid: &Uuid) -> FncoreResult<Function> {
        functions::get_function(&self.pool, function_uuid)
            .await?
            .ok_or(FncoreError::FunctionNotFound(*function_uuid))
    }

    /// Admission control: cap invocations in flight per function.
    async fn check_admission(&self, function_uuid: &Uuid) -> FncoreResult<()> {
        let in_flight = invocations::count_in_flight(&self.pool, function_uuid).await?;
        if in_flight >= self.options.max_concurrent_invocations {
            tracing::warn!(
                function = %function_uuid,
                in_flight,
                "rejecting invocation, concurrency cap reached"
            );
            return Err(FncoreError::TooManyConcurrentInvocations { count: in_flight });
        }
        Ok(())
    }

    /// Circuit breaker: with a full sample of recent invocations inside the
    /// window, too many `error` outcomes reject new attempts outright.
    /// Timeouts are user-code outcomes and do not count toward the trip.
    async fn check_circuit_breaker(&self, function_uuid: &Uuid) -> FncoreResult<()> {
        let recent = invocations::recent_statuses(
            &self.pool,
            function_uuid,
            self.options.breaker_window_seconds,
            self.options.breaker_sample,
        )
        .await?;

        if (recent.len() as i64) < self.options.breaker_sample {
            return Ok(());
        }

        let failures = recent
            .iter()
            .filter(|s| **s == InvocationStatus::Error)
            .count() as i64;

        if failures >= self.options.breaker_threshold {
            tracing::warn!(
                function = %function_uuid,
                failures,
                sample = recent.len(),
                "circuit breaker open, rejecting invocation"
            );
            return Err(FncoreError::CircuitBreakerOpen {
                failures,
                sample: recent.len() as i64,
            });
        }

        Ok(())
    }

    /// Adds resolved secrets to an object event under the reserved key; the
    /// gateway strips them back out into the agent's `env_vars`.
    async fn inject_secrets(&self, function: &Function, event: Value) -> Value {
        let secrets = self.secrets.resolve(&function.uuid).await;
        if secrets.is_empty() {
            return event;
        }

        match event {
            Value::Object(mut map) => {
                map.insert(
                    SECRETS_KEY.to_string(),
                    Value::Object(
                        secrets
                            .into_iter()
                            .map(|(k, v)| (k, Value::String(v)))
                            .collect(),
                    ),
                );
                Value::Object(map)
            }
            other => other,
        }
    }

    /// Formats a function's depset packages for its runtime families.
    async fn formatted_dependencies(&self, function_uuid: &Uuid) -> FncoreResult<Vec<String>> {
        let packages = depsets::packages_for_function(&self.pool, function_uuid).await?;

        Ok(packages
            .into_iter()
            .map(|p| {
                let family =
                    RuntimeFamily::parse(&p.runtime_family).unwrap_or(RuntimeFamily::Python);
                family.format_package(&p.package_name, p.version_spec.as_deref())
            })
            .collect())
    }

    /// Cascade: a function that left `active` must not keep firing on a
    /// schedule. One-directional; re-enabling is an explicit user action.
    async fn disable_triggers(&self, function_uuid: &Uuid) {
        match triggers::disable_scheduled_for_function(&self.pool, function_uuid).await {
            Ok(disabled) if !disabled.is_empty() => tracing::info!(
                function = %function_uuid,
                count = disabled.len(),
                "auto-disabled scheduled triggers"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(
                function = %function_uuid,
                "failed to disable scheduled triggers: {}",
                e
            ),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn generate_request_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("req-{}", &hex[..12])
}

/// The wire contract reports handler timeouts as this error text; it is the
/// only signal distinguishing `timeout` from `error` outcomes.
fn is_timeout_error(error: &str) -> bool {
    error.starts_with("Function execution exceeded")
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use fnagent::api::AgentResult;
    use serde_json::json;
    use sqlx::{Pool, Sqlite};

    use super::*;
    use crate::{
        coordinator::{ClusterBackend, CoordinatorOptions, Invoker, SecretResolver},
        models::TriggerKind,
        orchestrator::DeploymentDescriptor,
        store::functions::tests::{sample_function, test_pool},
        store::{functions::create_function, triggers::NewTrigger},
    };

    struct StubBackend {
        fail_times: AtomicUsize,
        deploy_calls: AtomicUsize,
        deleted: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn new(fail_times: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_times: AtomicUsize::new(fail_times),
                deploy_calls: AtomicUsize::new(0),
                deleted: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl ClusterBackend for StubBackend {
        async fn deploy(&self, req: &DeployRequest) -> FncoreResult<DeploymentDescriptor> {
            self.deploy_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(FncoreError::DeploymentTimeout {
                    workload: "func-stub".to_string(),
                    waited_seconds: 60,
                });
            }
            let workload = crate::orchestrator::workload_name_for(&req.function_id);
            Ok(DeploymentDescriptor {
                endpoint_name: format!("{}-svc", workload),
                workload_name: workload,
                ip: Some("10.0.0.1".to_string()),
                pod_name: Some("pod-1".to_string()),
                status: "running".to_string(),
            })
        }

        async fn delete(&self, workload_name: &str) -> FncoreResult<()> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(FncoreError::custom(anyhow::anyhow!("cluster unavailable")));
            }
            self.deleted.lock().unwrap().push(workload_name.to_string());
            Ok(())
        }
    }

    struct StubInvoker {
        result: AgentResult,
        seen_events: Mutex<Vec<Value>>,
    }

    impl StubInvoker {
        fn new(result: AgentResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen_events: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl Invoker for StubInvoker {
        async fn invoke(
            &self,
            _endpoint_name: &str,
            event: Value,
            _timeout_seconds: u64,
            _code: &str,
            _handler: &str,
        ) -> AgentResult {
            self.seen_events.lock().unwrap().push(event);
            self.result.clone()
        }
    }

    struct StaticSecrets(HashMap<String, String>);

    #[async_trait]
    impl SecretResolver for StaticSecrets {
        async fn resolve(&self, _function_uuid: &Uuid) -> HashMap<String, String> {
            self.0.clone()
        }
    }

    fn coordinator(
        pool: Pool<Sqlite>,
        backend: Arc<dyn ClusterBackend>,
        invoker: Arc<dyn Invoker>,
        secrets: HashMap<String, String>,
    ) -> TaskCoordinator {
        TaskCoordinator::with_options(
            pool,
            backend,
            invoker,
            Arc::new(StaticSecrets(secrets)),
            CoordinatorOptions::builder()
                .namespace("test-functions".to_string())
                .deploy_backoff(Duration::ZERO)
                .undeploy_backoff(Duration::ZERO)
                .build(),
        )
    }

    fn ok_invoker() -> Arc<StubInvoker> {
        StubInvoker::new(AgentResult::ok(
            json!({"answer": 42}),
            "[stdout]\nok\n".to_string(),
            15,
            2,
        ))
    }

    async fn activate(pool: &Pool<Sqlite>, uuid: &Uuid) {
        functions::begin_deploy(pool, uuid).await.unwrap();
        functions::complete_deploy(pool, uuid, "func-test", "func-test-svc", "test-functions")
            .await
            .unwrap();
    }

    async fn seed_completed(pool: &Pool<Sqlite>, uuid: &Uuid, status: &str, n: usize, offset: usize) {
        for i in 0..n {
            sqlx::query(
                "INSERT INTO invocations (request_id, function_uuid, status) VALUES (?, ?, ?)",
            )
            .bind(format!("req-seed{}", i + offset))
            .bind(uuid.to_string())
            .bind(status)
            .execute(pool)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_deploy_success_binds_function() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        let backend = StubBackend::new(0);
        let coordinator = coordinator(pool.clone(), backend.clone(), ok_invoker(), HashMap::new());

        coordinator.run_deploy(func.uuid).await.unwrap();

        let func = functions::get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(func.status, FunctionStatus::Active);
        assert_eq!(
            func.workload_name.as_deref(),
            Some(crate::orchestrator::workload_name_for(&func.uuid).as_str())
        );
        assert_eq!(func.namespace.as_deref(), Some("test-functions"));
        assert_eq!(backend.deploy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deploy_retries_then_succeeds() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        let backend = StubBackend::new(2);
        let coordinator = coordinator(pool.clone(), backend.clone(), ok_invoker(), HashMap::new());

        coordinator.run_deploy(func.uuid).await.unwrap();

        assert_eq!(backend.deploy_calls.load(Ordering::SeqCst), 3);
        let func = functions::get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(func.status, FunctionStatus::Active);
    }

    #[tokio::test]
    async fn test_deploy_exhaustion_parks_function_in_error() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        let backend = StubBackend::new(10);
        let coordinator = coordinator(pool.clone(), backend.clone(), ok_invoker(), HashMap::new());

        let err = coordinator.run_deploy(func.uuid).await.unwrap_err();
        assert!(matches!(err, FncoreError::DeploymentTimeout { .. }));
        assert_eq!(backend.deploy_calls.load(Ordering::SeqCst), 3);

        let func = functions::get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(func.status, FunctionStatus::Error);
        assert!(func.workload_name.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_deploy_is_rejected_at_the_boundary() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;

        let backend = StubBackend::new(0);
        let coordinator = coordinator(pool.clone(), backend.clone(), ok_invoker(), HashMap::new());

        let err = coordinator.run_deploy(func.uuid).await.unwrap_err();
        assert!(matches!(err, FncoreError::StatusConflict { .. }));
        // The backend is never touched when the status check loses.
        assert_eq!(backend.deploy_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undeploy_tears_down_and_disables_triggers() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;

        let trigger = crate::store::triggers::create_trigger(
            &pool,
            NewTrigger {
                function_uuid: func.uuid,
                name: "nightly".to_string(),
                kind: TriggerKind::Scheduled,
                schedule: Some("0 0 * * *".to_string()),
                enabled: true,
            },
        )
        .await
        .unwrap();

        let backend = StubBackend::new(0);
        let coordinator = coordinator(pool.clone(), backend.clone(), ok_invoker(), HashMap::new());

        coordinator.run_undeploy(func.uuid).await.unwrap();

        let func = functions::get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(func.status, FunctionStatus::Draft);
        assert!(func.workload_name.is_none());
        assert_eq!(*backend.deleted.lock().unwrap(), vec!["func-test"]);

        let trigger = crate::store::triggers::get_trigger(&pool, &trigger.uuid)
            .await
            .unwrap()
            .unwrap();
        assert!(!trigger.enabled);
    }

    #[tokio::test]
    async fn test_invoke_records_success_and_injects_secrets() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;

        let invoker = ok_invoker();
        let mut secrets = HashMap::new();
        secrets.insert("API_KEY".to_string(), "sk-123".to_string());
        let coordinator = coordinator(pool.clone(), StubBackend::new(0), invoker.clone(), secrets);

        let id = coordinator
            .run_invocation(func.uuid, json!({"n": 1}), None, "invocation")
            .await
            .unwrap();

        let invocation = invocations::get_invocation(&pool, id).await.unwrap().unwrap();
        assert_eq!(invocation.status, InvocationStatus::Success);
        assert_eq!(invocation.output_json.as_deref(), Some("{\"answer\":42}"));
        assert!(invocation.request_id.starts_with("req-"));
        assert_eq!(invocation.memory_used_mb, Some(2));

        // The gateway saw the secrets under the reserved key.
        let seen = invoker.seen_events.lock().unwrap();
        assert_eq!(seen[0]["__secrets__"]["API_KEY"], json!("sk-123"));
        assert_eq!(seen[0]["n"], json!(1));

        let func = functions::get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(func.invocation_count, 1);
        assert!(func.last_invoked_at.is_some());
    }

    #[tokio::test]
    async fn test_invoke_requires_active_function() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        let coordinator = coordinator(pool.clone(), StubBackend::new(0), ok_invoker(), HashMap::new());
        let err = coordinator
            .run_invocation(func.uuid, json!({}), None, "invocation")
            .await
            .unwrap_err();

        assert!(matches!(err, FncoreError::NotDeployed(_)));
        assert_eq!(
            invocations::count_in_flight(&pool, &func.uuid).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_admission_control_rejects_sixth_invocation() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;
        seed_completed(&pool, &func.uuid, "pending", 3, 0).await;
        seed_completed(&pool, &func.uuid, "running", 2, 100).await;

        let coordinator = coordinator(pool.clone(), StubBackend::new(0), ok_invoker(), HashMap::new());
        let err = coordinator
            .run_invocation(func.uuid, json!({}), None, "invocation")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FncoreError::TooManyConcurrentInvocations { count: 5 }
        ));
        // No new record was created by the rejected attempt.
        assert_eq!(
            invocations::count_in_flight(&pool, &func.uuid).await.unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_circuit_breaker_trips_at_eight_errors_of_ten() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;
        seed_completed(&pool, &func.uuid, "error", 8, 0).await;
        seed_completed(&pool, &func.uuid, "success", 2, 100).await;

        let coordinator = coordinator(pool.clone(), StubBackend::new(0), ok_invoker(), HashMap::new());
        let err = coordinator
            .run_invocation(func.uuid, json!({}), None, "invocation")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FncoreError::CircuitBreakerOpen { failures: 8, sample: 10 }
        ));

        let all = invocations::list_for_function(&pool, &func.uuid, 50).await.unwrap();
        assert_eq!(all.len(), 10, "rejection must not create a record");
    }

    #[tokio::test]
    async fn test_circuit_breaker_ignores_timeouts_and_partial_samples() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;

        // Timeouts are user-code outcomes: 8/10 timeouts do not trip.
        seed_completed(&pool, &func.uuid, "timeout", 8, 0).await;
        seed_completed(&pool, &func.uuid, "success", 2, 100).await;

        let coordinator = coordinator(pool.clone(), StubBackend::new(0), ok_invoker(), HashMap::new());
        coordinator
            .run_invocation(func.uuid, json!({}), None, "invocation")
            .await
            .unwrap();

        // Fewer than ten recent invocations never trip either, however bad.
        let (_dir2, pool2) = test_pool().await;
        let func2 = create_function(&pool2, sample_function()).await.unwrap();
        activate(&pool2, &func2.uuid).await;
        seed_completed(&pool2, &func2.uuid, "error", 8, 0).await;

        let coordinator =
            coordinator_for(pool2.clone());
        coordinator
            .run_invocation(func2.uuid, json!({}), None, "invocation")
            .await
            .unwrap();
    }

    fn coordinator_for(pool: Pool<Sqlite>) -> TaskCoordinator {
        coordinator(pool, StubBackend::new(0), ok_invoker(), HashMap::new())
    }

    #[tokio::test]
    async fn test_timeout_result_is_recorded_as_timeout() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;

        let invoker = StubInvoker::new(AgentResult::failed(
            "Function execution exceeded 30 seconds",
            String::new(),
            30_000,
        ));
        let coordinator = coordinator(pool.clone(), StubBackend::new(0), invoker, HashMap::new());

        let id = coordinator
            .run_invocation(func.uuid, json!({}), None, "invocation")
            .await
            .unwrap();

        let invocation = invocations::get_invocation(&pool, id).await.unwrap().unwrap();
        assert_eq!(invocation.status, InvocationStatus::Timeout);
        assert_eq!(invocation.duration_ms, Some(30_000));
    }

    #[tokio::test]
    async fn test_handler_failure_is_recorded_as_error() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();
        activate(&pool, &func.uuid).await;

        let invoker = StubInvoker::new(AgentResult::failed(
            "ValueError: boom",
            "[stderr]\nTraceback\n".to_string(),
            7,
        ));
        let coordinator = coordinator(pool.clone(), StubBackend::new(0), invoker, HashMap::new());

        let id = coordinator
            .run_invocation(func.uuid, json!({}), Some("req-custom000001".to_string()), "invocation")
            .await
            .unwrap();

        let invocation = invocations::get_invocation(&pool, id).await.unwrap().unwrap();
        assert_eq!(invocation.status, InvocationStatus::Error);
        assert_eq!(invocation.error_message, "ValueError: boom");
        assert_eq!(invocation.request_id, "req-custom000001");
        assert!(invocation.logs.contains("Traceback"));
    }
}
