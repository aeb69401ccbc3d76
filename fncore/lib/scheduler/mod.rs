//! Trigger scheduler sync: reconciles declarative scheduled-trigger records
//! into an in-process registry of periodic jobs.
//!
//! Reconciliation is explicit, not hook-driven: `sync_trigger` runs on every
//! trigger mutation, `sync_function` on every function status change, and
//! `reconcile_all` periodically to self-heal drift. A periodic job exists
//! for every scheduled trigger with a schedule, but runs only while the
//! owning function is `active`; whenever the function leaves `active`, its
//! enabled scheduled triggers are disabled — one-directional, re-enabling
//! is an explicit action.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    time::Duration,
};

use chrono::Utc;
use cron::Schedule;
use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use crate::{
    coordinator::{Job, TaskQueue},
    models::{Function, FunctionStatus, Trigger, TriggerKind},
    store::{functions, triggers},
    FncoreError, FncoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One registered periodic job. Disabled jobs stay in the registry but carry
/// no running task.
struct PeriodicJob {
    enabled: bool,
    handle: Option<JoinHandle<()>>,
}

/// Keeps the periodic-job registry in lock-step with trigger and function
/// records.
pub struct TriggerScheduler {
    pool: Pool<Sqlite>,
    queue: TaskQueue,
    jobs: Mutex<HashMap<Uuid, PeriodicJob>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TriggerScheduler {
    /// Creates a scheduler feeding invoke jobs into the task queue.
    pub fn new(pool: Pool<Sqlite>, queue: TaskQueue) -> Self {
        Self {
            pool,
            queue,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles one trigger after a create or update.
    ///
    /// A scheduled, enabled trigger with a schedule gets a periodic job
    /// keyed by its identity, enabled only if the owning function is
    /// `active`. Any other combination removes the job if present.
    pub async fn sync_trigger(&self, trigger: &Trigger) -> FncoreResult<()> {
        let is_runnable = trigger.kind == TriggerKind::Scheduled
            && trigger.enabled
            && trigger.schedule.is_some();

        if !is_runnable {
            self.remove_trigger(&trigger.uuid).await;
            return Ok(());
        }

        let schedule = parse_cron(trigger.schedule.as_deref().unwrap_or_default())?;

        let function = functions::get_function(&self.pool, &trigger.function_uuid)
            .await?
            .ok_or(FncoreError::FunctionNotFound(trigger.function_uuid))?;
        let enabled = function.status == FunctionStatus::Active;

        let mut jobs = self.jobs.lock().await;
        if let Some(old) = jobs.remove(&trigger.uuid) {
            if let Some(handle) = old.handle {
                handle.abort();
            }
        }

        let handle = enabled.then(|| self.spawn_periodic(trigger.clone(), schedule));
        jobs.insert(trigger.uuid, PeriodicJob { enabled, handle });

        tracing::info!(
            "registered periodic job 'trigger-{}' ({})",
            trigger.uuid,
            if enabled {
                "enabled"
            } else {
                "disabled (function not active)"
            }
        );

        Ok(())
    }

    /// Drops the periodic job of a deleted trigger.
    pub async fn remove_trigger(&self, trigger_uuid: &Uuid) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.remove(trigger_uuid) {
            if let Some(handle) = job.handle {
                handle.abort();
            }
            tracing::info!("removed periodic job 'trigger-{}'", trigger_uuid);
        }
    }

    /// Reconciles after a function status change: leaving `active` disables
    /// every enabled scheduled trigger the function owns, in the store and
    /// in the registry.
    pub async fn sync_function(&self, function: &Function) -> FncoreResult<()> {
        if function.status == FunctionStatus::Active {
            return Ok(());
        }

        let disabled =
            triggers::disable_scheduled_for_function(&self.pool, &function.uuid).await?;
        if disabled.is_empty() {
            return Ok(());
        }

        let mut jobs = self.jobs.lock().await;
        for trigger_uuid in &disabled {
            if let Some(job) = jobs.get_mut(trigger_uuid) {
                if let Some(handle) = job.handle.take() {
                    handle.abort();
                }
                job.enabled = false;
            }
            tracing::info!(
                "disabled trigger {} (function {} status: {})",
                trigger_uuid,
                function.uuid,
                function.status
            );
        }

        tracing::info!(
            "auto-disabled {} periodic jobs for function {}",
            disabled.len(),
            function.uuid
        );

        Ok(())
    }

    /// Full resync from the store: removes registry entries whose trigger
    /// vanished, then re-syncs every scheduled trigger. One bad trigger
    /// never blocks the rest.
    pub async fn reconcile_all(&self) -> FncoreResult<()> {
        let scheduled = triggers::list_scheduled(&self.pool).await?;
        let live: HashSet<Uuid> = scheduled.iter().map(|t| t.uuid).collect();

        {
            let mut jobs = self.jobs.lock().await;
            let stale: Vec<Uuid> = jobs.keys().filter(|u| !live.contains(u)).cloned().collect();
            for trigger_uuid in stale {
                if let Some(job) = jobs.remove(&trigger_uuid) {
                    if let Some(handle) = job.handle {
                        handle.abort();
                    }
                    tracing::info!(
                        "removed periodic job for deleted trigger {}",
                        trigger_uuid
                    );
                }
            }
        }

        for trigger in &scheduled {
            if let Err(e) = self.sync_trigger(trigger).await {
                tracing::error!("failed to sync trigger {}: {}", trigger.uuid, e);
            }
        }

        Ok(())
    }

    /// Aborts every running periodic job.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            if let Some(handle) = job.handle {
                handle.abort();
            }
        }
    }

    /// Number of registered periodic jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Whether a trigger's periodic job exists and is enabled.
    pub async fn job_enabled(&self, trigger_uuid: &Uuid) -> Option<bool> {
        self.jobs.lock().await.get(trigger_uuid).map(|j| j.enabled)
    }

    /// Spawns the periodic loop: sleep until the next cron occurrence,
    /// enqueue an invoke job, stamp the trigger, repeat.
    fn spawn_periodic(&self, trigger: Trigger, schedule: Schedule) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                tracing::info!(
                    trigger = %trigger.uuid,
                    function = %trigger.function_uuid,
                    "scheduled trigger firing"
                );

                let job = Job::Invoke {
                    function_uuid: trigger.function_uuid,
                    event: build_trigger_event(&trigger),
                    request_id: None,
                };
                if queue.enqueue(job).is_err() {
                    break;
                }

                if let Err(e) = triggers::set_last_triggered(&pool, &trigger.uuid).await {
                    tracing::warn!("failed to stamp trigger {}: {}", trigger.uuid, e);
                }
            }
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses a 5-field cron expression (minute hour day-of-month month
/// day-of-week).
pub fn parse_cron(expression: &str) -> FncoreResult<Schedule> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(FncoreError::InvalidCronExpression(format!(
            "{} (must have 5 fields)",
            expression
        )));
    }

    // The schedule parser wants a seconds field; pin it to zero.
    Schedule::from_str(&format!("0 {}", parts.join(" ")))
        .map_err(|e| FncoreError::InvalidCronExpression(format!("{}: {}", expression, e)))
}

/// The event payload a scheduled trigger hands to its function.
pub(crate) fn build_trigger_event(trigger: &Trigger) -> Value {
    json!({
        "trigger_type": "scheduled",
        "trigger_id": trigger.uuid.to_string(),
        "trigger_name": trigger.name,
        "cron_expression": trigger.schedule,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
