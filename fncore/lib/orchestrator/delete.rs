//! Idempotent workload teardown.
//!
//! Deletion reverses creation order: autoscaler, endpoint, workload, then the
//! code bundle once the workload object is fully gone. "Not found" is never
//! an error at any step; anything else surfaces.

use std::time::{Duration, Instant};

use k8s_openapi::api::{
    apps::v1::Deployment,
    autoscaling::v2::HorizontalPodAutoscaler,
    core::v1::{ConfigMap, Service},
};
use kube::api::{Api, DeleteParams, PropagationPolicy};

use super::{autoscaler_name_for, endpoint_name_for, is_not_found, KubernetesOrchestrator};
use crate::FncoreResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long to wait for the workload object to disappear before removing the
/// code bundle.
const DELETE_WAIT_BUDGET: Duration = Duration::from_secs(30);

/// Interval between deletion polls.
const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period handed to the workload's pods.
const DELETE_GRACE_SECONDS: u32 = 5;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KubernetesOrchestrator {
    /// Tears down every object belonging to a workload. Safe to call for a
    /// workload that never existed or was already deleted.
    pub async fn delete(&self, workload_name: &str) -> FncoreResult<()> {
        let endpoint_name = endpoint_name_for(workload_name);
        let autoscaler_name = autoscaler_name_for(workload_name);

        let hpa_api: Api<HorizontalPodAutoscaler> =
            Api::namespaced(self.client.clone(), &self.namespace);
        match hpa_api
            .delete(&autoscaler_name, &DeleteParams::default())
            .await
        {
            Ok(_) => tracing::info!("deleted autoscaler {}", autoscaler_name),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let service_api: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        match service_api
            .delete(&endpoint_name, &DeleteParams::default())
            .await
        {
            Ok(_) => tracing::info!("deleted endpoint {}", endpoint_name),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        let deployment_api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let delete_params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            grace_period_seconds: Some(DELETE_GRACE_SECONDS),
            ..Default::default()
        };
        match deployment_api.delete(workload_name, &delete_params).await {
            Ok(_) => tracing::info!("deleted workload {}", workload_name),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        // The code bundle is referenced by the workload's pods; wait for the
        // workload object to vanish before pulling it out from under them.
        self.wait_for_workload_gone(workload_name).await;

        let bundle_api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        match bundle_api.delete(workload_name, &DeleteParams::default()).await {
            Ok(_) => tracing::info!("deleted code bundle {}", workload_name),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Polls until the workload object is gone or the wait budget elapses.
    /// Running past the budget is logged, not fatal.
    async fn wait_for_workload_gone(&self, workload_name: &str) {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let deadline = Instant::now() + DELETE_WAIT_BUDGET;

        while Instant::now() < deadline {
            match api.get(workload_name).await {
                Ok(_) => tokio::time::sleep(DELETE_POLL_INTERVAL).await,
                Err(e) if is_not_found(&e) => {
                    tracing::info!("workload {} fully deleted", workload_name);
                    return;
                }
                Err(e) => {
                    tracing::warn!("error polling workload deletion: {}", e);
                    tokio::time::sleep(DELETE_POLL_INTERVAL).await;
                }
            }
        }

        tracing::warn!(
            "workload {} still present after {:?}, continuing teardown",
            workload_name,
            DELETE_WAIT_BUDGET
        );
    }
}
