//! Administrative reads and writes: status, listing, scaling, namespace
//! bootstrap.

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Pod},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};

use super::{is_not_found, KubernetesOrchestrator, PodStatus, WorkloadStatus, WorkloadSummary};
use crate::FncoreResult;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KubernetesOrchestrator {
    /// Reports replica and pod-level status of one workload. A missing
    /// workload yields a `not_found` status, not an error.
    pub async fn get_status(&self, workload_name: &str) -> FncoreResult<WorkloadStatus> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);

        let deployment = match api.get(workload_name).await {
            Ok(deployment) => deployment,
            Err(e) if is_not_found(&e) => {
                return Ok(WorkloadStatus {
                    workload_name: workload_name.to_string(),
                    status: "not_found".to_string(),
                    ready_replicas: 0,
                    desired_replicas: 0,
                    pods: vec![],
                })
            }
            Err(e) => return Err(e.into()),
        };

        let ready_replicas = deployment
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        let desired_replicas = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(0);

        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = pod_api
            .list(&ListParams::default().labels(&format!("app={}", workload_name)))
            .await?;

        let pods = pods
            .items
            .into_iter()
            .map(|pod| {
                let statuses = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.container_statuses.clone())
                    .unwrap_or_default();
                PodStatus {
                    name: pod.metadata.name.clone().unwrap_or_default(),
                    phase: pod
                        .status
                        .as_ref()
                        .and_then(|s| s.phase.clone())
                        .unwrap_or_default(),
                    ready: !statuses.is_empty() && statuses.iter().all(|c| c.ready),
                    restarts: statuses.iter().map(|c| c.restart_count).sum(),
                }
            })
            .collect();

        Ok(WorkloadStatus {
            workload_name: workload_name.to_string(),
            status: if ready_replicas > 0 {
                "running".to_string()
            } else {
                "pending".to_string()
            },
            ready_replicas,
            desired_replicas,
            pods,
        })
    }

    /// Lists every function workload in the namespace.
    pub async fn list(&self) -> FncoreResult<Vec<WorkloadSummary>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let deployments = api.list(&ListParams::default()).await?;

        Ok(deployments
            .items
            .into_iter()
            .map(|deployment| WorkloadSummary {
                function_id: deployment
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get("function-id").cloned())
                    .unwrap_or_else(|| "unknown".to_string()),
                workload_name: deployment.metadata.name.clone().unwrap_or_default(),
                replicas: deployment
                    .spec
                    .as_ref()
                    .and_then(|s| s.replicas)
                    .unwrap_or(0),
                ready_replicas: deployment
                    .status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0),
                created_at: deployment.metadata.creation_timestamp.map(|t| t.0),
            })
            .collect())
    }

    /// Sets the desired replica count of a workload.
    pub async fn scale(&self, workload_name: &str, replicas: i32) -> FncoreResult<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = serde_json::json!({"spec": {"replicas": replicas}});
        api.patch(workload_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        tracing::info!("scaled workload {} to {} replicas", workload_name, replicas);
        Ok(())
    }

    /// Ensures the function namespace exists.
    pub async fn initialize(&self) -> FncoreResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        match api.get(&self.namespace).await {
            Ok(_) => {
                tracing::info!("namespace {} already exists", self.namespace);
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                let namespace = Namespace {
                    metadata: ObjectMeta {
                        name: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                api.create(&PostParams::default(), &namespace).await?;
                tracing::info!("created namespace {}", self.namespace);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
