//! Workload creation: code bundle, deployment, endpoint, autoscaler, and the
//! readiness wait.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        autoscaling::v2::{
            CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules,
            HorizontalPodAutoscaler, HorizontalPodAutoscalerBehavior, HorizontalPodAutoscalerSpec,
            MetricSpec, MetricTarget, ResourceMetricSource,
        },
        core::v1::{
            Capabilities, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort,
            EmptyDirVolumeSource, EnvVar, HTTPGetAction, PodSecurityContext, PodSpec,
            PodTemplateSpec, Probe, ResourceRequirements, SeccompProfile, SecurityContext, Service,
            ServicePort, ServiceSpec, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};
use kube::api::{Api, Patch, PatchParams, PostParams};

use super::{
    endpoint_name_for, workload_name_for, DeployRequest, DeploymentDescriptor,
    KubernetesOrchestrator,
};
use crate::{runtime::RuntimeFamily, FncoreError, FncoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Port the execution agent listens on inside every function container.
const CONTAINER_PORT: i32 = 8080;

/// Limits are this multiple of requests, for burst headroom.
const RESOURCE_BURST_FACTOR: f64 = 1.5;

/// Base readiness budget in seconds.
const READY_BASE_TIMEOUT_SECS: u64 = 60;

/// Extra readiness budget per dependency package, in seconds.
const READY_PER_DEPENDENCY_SECS: u64 = 10;

/// Hard cap on the readiness budget, in seconds.
const READY_MAX_TIMEOUT_SECS: u64 = 300;

/// Interval between readiness polls.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Key the code is published under in the bundle, and its mount point.
const CODE_KEY: &str = "function.src";
const CODE_MOUNT_PATH: &str = "/app/function.src";

/// Volume names inside the pod.
const CODE_VOLUME: &str = "function-code";
const PACKAGES_VOLUME: &str = "packages";

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KubernetesOrchestrator {
    /// Deploys one function: publishes its code bundle, creates the workload
    /// with an optional dependency-install init step, fronts it with an
    /// endpoint and an autoscaler, and waits for the first replica to become
    /// ready within the dependency-scaled budget.
    ///
    /// Fails with [`FncoreError::UnsupportedRuntime`] before touching the
    /// cluster, and with [`FncoreError::DeploymentTimeout`] when readiness is
    /// not reached in time.
    pub async fn deploy(&self, req: &DeployRequest) -> FncoreResult<DeploymentDescriptor> {
        let spec = self.registry.get(&req.runtime)?.clone();
        let workload_name = workload_name_for(&req.function_id);
        let endpoint_name = endpoint_name_for(&workload_name);

        tracing::info!(
            function_id = %req.function_id,
            runtime = %req.runtime,
            image = %spec.image,
            workload = %workload_name,
            "deploying function"
        );

        self.apply_code_bundle(&workload_name, &req.code).await?;

        let deployment = build_deployment(
            &workload_name,
            &req.function_id.to_string(),
            &spec.image,
            spec.family,
            req.memory_mb,
            req.vcpus,
            &req.dependencies,
        );
        create_or_patch(
            Api::namespaced(self.client.clone(), &self.namespace),
            &workload_name,
            &deployment,
        )
        .await?;

        let service = build_service(&endpoint_name, &workload_name);
        let service: Service = create_or_patch(
            Api::namespaced(self.client.clone(), &self.namespace),
            &endpoint_name,
            &service,
        )
        .await?;

        self.create_autoscaler(&workload_name).await;

        let budget = readiness_timeout(req.dependencies.len());
        tracing::info!(
            dependencies = req.dependencies.len(),
            budget_seconds = budget,
            "waiting for workload readiness"
        );
        self.wait_for_ready(&workload_name, budget).await?;

        let pod_name = self.first_pod_name(&workload_name).await?;

        Ok(DeploymentDescriptor {
            workload_name,
            endpoint_name,
            ip: service.spec.and_then(|s| s.cluster_ip),
            pod_name,
            status: "running".to_string(),
        })
    }

    /// Publishes the function code as a named bundle, patching on conflict.
    async fn apply_code_bundle(&self, name: &str, code: &str) -> FncoreResult<()> {
        let config_map = build_code_bundle(name, code);
        create_or_patch(
            Api::<ConfigMap>::namespaced(self.client.clone(), &self.namespace),
            name,
            &config_map,
        )
        .await?;
        tracing::info!("published code bundle {}", name);
        Ok(())
    }

    /// Creates the autoscaler for a workload. Autoscaling is best-effort: a
    /// failure here is logged and never fails the deploy.
    async fn create_autoscaler(&self, workload_name: &str) {
        let hpa = build_autoscaler(workload_name);
        let api: Api<HorizontalPodAutoscaler> =
            Api::namespaced(self.client.clone(), &self.namespace);

        match api.create(&PostParams::default(), &hpa).await {
            Ok(_) => tracing::info!(
                "created autoscaler for {} (min:1, max:5, cpu:70%, memory:80%)",
                workload_name
            ),
            Err(e) if is_conflict(&e) => {
                tracing::info!("autoscaler for {} already exists", workload_name)
            }
            Err(e) => tracing::warn!("failed to create autoscaler for {}: {}", workload_name, e),
        }
    }

    /// Polls until at least one replica is ready, or the budget elapses.
    async fn wait_for_ready(&self, workload_name: &str, budget_seconds: u64) -> FncoreResult<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let deadline = Instant::now() + Duration::from_secs(budget_seconds);

        while Instant::now() < deadline {
            match api.get(workload_name).await {
                Ok(deployment) => {
                    let ready = deployment
                        .status
                        .as_ref()
                        .and_then(|s| s.ready_replicas)
                        .unwrap_or(0);
                    if ready > 0 {
                        tracing::info!("workload {} is ready", workload_name);
                        return Ok(());
                    }
                }
                Err(e) => tracing::warn!("error checking workload readiness: {}", e),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        Err(FncoreError::DeploymentTimeout {
            workload: workload_name.to_string(),
            waited_seconds: budget_seconds,
        })
    }

    /// Name of the first pod carrying the workload's app label.
    async fn first_pod_name(&self, workload_name: &str) -> FncoreResult<Option<String>> {
        use k8s_openapi::api::core::v1::Pod;
        use kube::api::ListParams;

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = api
            .list(&ListParams::default().labels(&format!("app={}", workload_name)))
            .await?;

        Ok(pods.items.first().and_then(|p| p.metadata.name.clone()))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Readiness wait budget in seconds: more dependencies mean more install
/// time allowance, capped at five minutes.
pub fn readiness_timeout(dependency_count: usize) -> u64 {
    (READY_BASE_TIMEOUT_SECS + READY_PER_DEPENDENCY_SECS * dependency_count as u64)
        .min(READY_MAX_TIMEOUT_SECS)
}

/// Container resources: requests at the configured values, limits at exactly
/// 1.5x for burst headroom, plus bounded ephemeral storage.
pub fn resource_requirements(memory_mb: i64, vcpus: f64) -> ResourceRequirements {
    let millicores = (vcpus * 1000.0) as i64;
    let memory_limit = (memory_mb as f64 * RESOURCE_BURST_FACTOR) as i64;
    let cpu_limit = (millicores as f64 * RESOURCE_BURST_FACTOR) as i64;

    let mut requests = BTreeMap::new();
    requests.insert("memory".to_string(), Quantity(format!("{}Mi", memory_mb)));
    requests.insert("cpu".to_string(), Quantity(format!("{}m", millicores)));
    requests.insert("ephemeral-storage".to_string(), Quantity("1Gi".to_string()));

    let mut limits = BTreeMap::new();
    limits.insert("memory".to_string(), Quantity(format!("{}Mi", memory_limit)));
    limits.insert("cpu".to_string(), Quantity(format!("{}m", cpu_limit)));
    limits.insert("ephemeral-storage".to_string(), Quantity("2Gi".to_string()));

    ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

/// The ConfigMap carrying one function's code.
pub(crate) fn build_code_bundle(name: &str, code: &str) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert(CODE_KEY.to_string(), code.to_string());

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// The workload hosting one function's execution agent.
pub(crate) fn build_deployment(
    name: &str,
    function_id: &str,
    image: &str,
    family: RuntimeFamily,
    memory_mb: i64,
    vcpus: f64,
    dependencies: &[String],
) -> Deployment {
    let mut env = vec![EnvVar {
        name: "FUNCTION_ID".to_string(),
        value: Some(function_id.to_string()),
        ..Default::default()
    }];

    let mut volume_mounts = vec![VolumeMount {
        name: CODE_VOLUME.to_string(),
        mount_path: CODE_MOUNT_PATH.to_string(),
        sub_path: Some(CODE_KEY.to_string()),
        ..Default::default()
    }];

    let mut volumes = vec![Volume {
        name: CODE_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }];

    // The install step and the shared packages volume exist only when there
    // is something to install.
    let init_containers = family.install_command(dependencies).map(|command| {
        volumes.push(Volume {
            name: PACKAGES_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                size_limit: Some(Quantity("1Gi".to_string())),
                ..Default::default()
            }),
            ..Default::default()
        });

        volume_mounts.push(VolumeMount {
            name: PACKAGES_VOLUME.to_string(),
            mount_path: "/packages".to_string(),
            ..Default::default()
        });

        for (key, value) in family.package_env() {
            env.push(EnvVar {
                name: key,
                value: Some(value),
                ..Default::default()
            });
        }

        vec![build_install_container(image, command)]
    });

    let container = Container {
        name: "function".to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            container_port: CONTAINER_PORT,
            ..Default::default()
        }]),
        resources: Some(resource_requirements(memory_mb, vcpus)),
        env: Some(env),
        volume_mounts: Some(volume_mounts),
        liveness_probe: Some(http_probe("/health", 10, 30, 5, 3)),
        readiness_probe: Some(http_probe("/health", 5, 15, 3, 2)),
        security_context: Some(container_security_context()),
        ..Default::default()
    };

    let mut pod_labels = BTreeMap::new();
    pod_labels.insert("app".to_string(), name.to_string());
    pod_labels.insert("function-id".to_string(), function_id.to_string());
    pod_labels.insert("component".to_string(), "function".to_string());

    let mut selector = BTreeMap::new();
    selector.insert("app".to_string(), name.to_string());

    let mut workload_labels = BTreeMap::new();
    workload_labels.insert("function-id".to_string(), function_id.to_string());

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(workload_labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers,
                    containers: vec![container],
                    volumes: Some(volumes),
                    restart_policy: Some("Always".to_string()),
                    priority_class_name: Some("fncore-function-priority".to_string()),
                    termination_grace_period_seconds: Some(30),
                    security_context: Some(pod_security_context()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The ClusterIP endpoint load-balancing one workload.
pub(crate) fn build_service(name: &str, workload_name: &str) -> Service {
    let mut selector = BTreeMap::new();
    selector.insert("app".to_string(), workload_name.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: CONTAINER_PORT,
                target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The autoscaler bound to one workload: 1-5 replicas, 70%/80% CPU/memory
/// targets, immediate scale-up, five-minute scale-down stabilization.
pub(crate) fn build_autoscaler(workload_name: &str) -> HorizontalPodAutoscaler {
    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(super::autoscaler_name_for(workload_name)),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: workload_name.to_string(),
            },
            min_replicas: Some(1),
            max_replicas: 5,
            metrics: Some(vec![
                resource_metric("cpu", 70),
                resource_metric("memory", 80),
            ]),
            behavior: Some(HorizontalPodAutoscalerBehavior {
                scale_up: Some(HPAScalingRules {
                    stabilization_window_seconds: Some(0),
                    policies: Some(vec![HPAScalingPolicy {
                        type_: "Percent".to_string(),
                        value: 100,
                        period_seconds: 15,
                    }]),
                    ..Default::default()
                }),
                scale_down: Some(HPAScalingRules {
                    stabilization_window_seconds: Some(300),
                    policies: Some(vec![HPAScalingPolicy {
                        type_: "Pods".to_string(),
                        value: 1,
                        period_seconds: 60,
                    }]),
                    ..Default::default()
                }),
            }),
        }),
        ..Default::default()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn build_install_container(image: &str, command: Vec<String>) -> Container {
    let mut requests = BTreeMap::new();
    requests.insert("memory".to_string(), Quantity("256Mi".to_string()));
    requests.insert("cpu".to_string(), Quantity("200m".to_string()));

    let mut limits = BTreeMap::new();
    limits.insert("memory".to_string(), Quantity("512Mi".to_string()));
    limits.insert("cpu".to_string(), Quantity("500m".to_string()));

    Container {
        name: "install-dependencies".to_string(),
        image: Some(image.to_string()),
        command: Some(command),
        volume_mounts: Some(vec![VolumeMount {
            name: PACKAGES_VOLUME.to_string(),
            mount_path: "/packages".to_string(),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            limits: Some(limits),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..container_security_context()
        }),
        ..Default::default()
    }
}

fn http_probe(
    path: &str,
    initial_delay: i32,
    period: i32,
    timeout: i32,
    failure_threshold: i32,
) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(CONTAINER_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(timeout),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    }
}

fn container_security_context() -> SecurityContext {
    SecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(1000),
        run_as_group: Some(1000),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: Some(vec!["NET_BIND_SERVICE".to_string()]),
        }),
        ..Default::default()
    }
}

fn pod_security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(1000),
        run_as_group: Some(1000),
        fs_group: Some(1000),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn resource_metric(name: &str, average_utilization: i32) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: name.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(average_utilization),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Creates the object, falling back to a merge patch when it already exists.
async fn create_or_patch<K>(api: Api<K>, name: &str, object: &K) -> FncoreResult<K>
where
    K: kube::Resource + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.create(&PostParams::default(), object).await {
        Ok(created) => Ok(created),
        Err(e) if is_conflict(&e) => {
            let patched = api
                .patch(name, &PatchParams::default(), &Patch::Merge(object))
                .await?;
            tracing::info!("updated existing object {}", name);
            Ok(patched)
        }
        Err(e) => Err(e.into()),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(resources: &ResourceRequirements, which: &str, key: &str) -> String {
        let map = match which {
            "requests" => resources.requests.as_ref().unwrap(),
            _ => resources.limits.as_ref().unwrap(),
        };
        map.get(key).unwrap().0.clone()
    }

    #[test]
    fn test_readiness_timeout_formula() {
        assert_eq!(readiness_timeout(0), 60);
        assert_eq!(readiness_timeout(1), 70);
        assert_eq!(readiness_timeout(10), 160);
        assert_eq!(readiness_timeout(24), 300);
        // Capped, not 360.
        assert_eq!(readiness_timeout(30), 300);
        assert_eq!(readiness_timeout(1000), 300);
    }

    #[test]
    fn test_limits_are_exactly_one_and_a_half_times_requests() {
        let resources = resource_requirements(128, 1.0);
        assert_eq!(requested(&resources, "requests", "memory"), "128Mi");
        assert_eq!(requested(&resources, "limits", "memory"), "192Mi");
        assert_eq!(requested(&resources, "requests", "cpu"), "1000m");
        assert_eq!(requested(&resources, "limits", "cpu"), "1500m");

        let resources = resource_requirements(512, 0.25);
        assert_eq!(requested(&resources, "requests", "memory"), "512Mi");
        assert_eq!(requested(&resources, "limits", "memory"), "768Mi");
        assert_eq!(requested(&resources, "requests", "cpu"), "250m");
        assert_eq!(requested(&resources, "limits", "cpu"), "375m");
    }

    #[test]
    fn test_deployment_without_dependencies_has_no_install_step() {
        let deployment = build_deployment(
            "func-a1b2c3d4",
            "a1b2c3d4-0000-0000-0000-000000000000",
            "fncore-python:3.11",
            RuntimeFamily::Python,
            128,
            1.0,
            &[],
        );

        let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
        assert!(pod_spec.init_containers.is_none());
        assert_eq!(pod_spec.volumes.as_ref().unwrap().len(), 1);

        let container = &pod_spec.containers[0];
        assert_eq!(container.name, "function");
        let env = container.env.as_ref().unwrap();
        assert!(env.iter().any(|e| e.name == "FUNCTION_ID"));
        assert!(!env.iter().any(|e| e.name == "PYTHONPATH"));
    }

    #[test]
    fn test_deployment_with_dependencies_installs_into_shared_volume() {
        let deployment = build_deployment(
            "func-a1b2c3d4",
            "a1b2c3d4-0000-0000-0000-000000000000",
            "fncore-python:3.11",
            RuntimeFamily::Python,
            128,
            1.0,
            &["requests==2.31.0".to_string()],
        );

        let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
        let init = pod_spec.init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].name, "install-dependencies");
        let command = init[0].command.as_ref().unwrap();
        assert!(command[2].contains("pip install --target /packages requests==2.31.0"));

        // Shared packages volume is mounted in both containers.
        assert_eq!(pod_spec.volumes.as_ref().unwrap().len(), 2);
        let container = &pod_spec.containers[0];
        assert!(container
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .any(|m| m.name == "packages"));
        assert!(container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .any(|e| e.name == "PYTHONPATH"));
    }

    #[test]
    fn test_deployment_labels_and_probes() {
        let deployment = build_deployment(
            "func-a1b2c3d4",
            "a1b2c3d4-0000-0000-0000-000000000000",
            "fncore-nodejs:20",
            RuntimeFamily::NodeJs,
            256,
            2.0,
            &[],
        );

        let labels = deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .metadata
            .as_ref()
            .unwrap()
            .labels
            .as_ref()
            .unwrap();
        assert_eq!(labels.get("app").unwrap(), "func-a1b2c3d4");
        assert_eq!(labels.get("component").unwrap(), "function");

        let container = &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
        assert!(container.liveness_probe.is_some());
        assert!(container.readiness_probe.is_some());
        assert_eq!(
            container.security_context.as_ref().unwrap().run_as_non_root,
            Some(true)
        );
    }

    #[test]
    fn test_service_selects_workload() {
        let service = build_service("func-a1b2c3d4-svc", "func-a1b2c3d4");
        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(
            spec.selector.unwrap().get("app").unwrap(),
            "func-a1b2c3d4"
        );
        assert_eq!(spec.ports.unwrap()[0].port, 8080);
    }

    #[test]
    fn test_autoscaler_bounds_and_stabilization() {
        let hpa = build_autoscaler("func-a1b2c3d4");
        assert_eq!(
            hpa.metadata.name.as_deref(),
            Some("func-a1b2c3d4-hpa")
        );

        let spec = hpa.spec.unwrap();
        assert_eq!(spec.min_replicas, Some(1));
        assert_eq!(spec.max_replicas, 5);

        let metrics = spec.metrics.unwrap();
        let cpu = metrics
            .iter()
            .find(|m| m.resource.as_ref().unwrap().name == "cpu")
            .unwrap();
        assert_eq!(
            cpu.resource.as_ref().unwrap().target.average_utilization,
            Some(70)
        );
        let memory = metrics
            .iter()
            .find(|m| m.resource.as_ref().unwrap().name == "memory")
            .unwrap();
        assert_eq!(
            memory.resource.as_ref().unwrap().target.average_utilization,
            Some(80)
        );

        let behavior = spec.behavior.unwrap();
        let up = behavior.scale_up.unwrap();
        assert_eq!(up.stabilization_window_seconds, Some(0));
        assert_eq!(up.policies.as_ref().unwrap()[0].value, 100);
        let down = behavior.scale_down.unwrap();
        assert_eq!(down.stabilization_window_seconds, Some(300));
        assert_eq!(down.policies.as_ref().unwrap()[0].value, 1);
        assert_eq!(down.policies.as_ref().unwrap()[0].period_seconds, 60);
    }

    #[test]
    fn test_code_bundle_carries_source() {
        let bundle = build_code_bundle("func-a1b2c3d4", "def handler(e, c): pass");
        assert_eq!(
            bundle.data.unwrap().get("function.src").unwrap(),
            "def handler(e, c): pass"
        );
    }
}
