//! The task queue: jobs enqueued by the outer layer and the trigger
//! scheduler, drained by a worker that spawns one task per job so jobs for
//! different functions run concurrently.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::TaskCoordinator;
use crate::{FncoreError, FncoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A background job.
#[derive(Debug, Clone)]
pub enum Job {
    /// Deploy a function to the cluster.
    Deploy {
        /// The function to deploy.
        function_uuid: Uuid,
    },

    /// Tear a function down.
    Undeploy {
        /// The function to undeploy.
        function_uuid: Uuid,
    },

    /// Invoke a deployed function (triggers, API calls).
    Invoke {
        /// The function to invoke.
        function_uuid: Uuid,
        /// Event payload handed to the handler.
        event: Value,
        /// Caller-supplied request id; generated when absent.
        request_id: Option<String>,
    },

    /// Test-invoke a deployed function.
    Test {
        /// The function to invoke.
        function_uuid: Uuid,
        /// Event payload handed to the handler.
        event: Value,
    },
}

/// Cheap handle for enqueueing jobs from anywhere.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Job>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TaskQueue {
    /// Creates the queue and the receiving end for the worker.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues a job. Fails only when the worker is gone.
    pub fn enqueue(&self, job: Job) -> FncoreResult<()> {
        self.tx
            .send(job)
            .map_err(|e| FncoreError::custom(anyhow::anyhow!("task queue closed: {}", e)))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Drains the queue until it closes. Each job runs in its own task; one
/// function's slow deploy never blocks another function's invoke.
pub async fn run_worker(coordinator: Arc<TaskCoordinator>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.handle(job).await {
                tracing::warn!("background job failed: {}", e);
            }
        });
    }

    tracing::info!("task queue closed, worker exiting");
}
