//! Database models for fncore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
// Types: Function
//--------------------------------------------------------------------------------------------------

/// Lifecycle status of a function.
///
/// Transitions move along `draft → deploying → active → undeploying → draft`;
/// `error` is reachable from `deploying` and `undeploying` when a background
/// job exhausts its retries, and `deploying` is re-enterable from `error` so
/// an operator can retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionStatus {
    /// Not deployed; the default state.
    Draft,

    /// A deploy job is in flight.
    Deploying,

    /// Deployed and invocable; cluster-binding fields are set.
    Active,

    /// An undeploy job is in flight.
    Undeploying,

    /// A deploy or undeploy job failed after retries.
    Error,
}

/// A serverless function registered with the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// The unique identifier for the row.
    pub id: i64,

    /// The stable external identifier for the function.
    pub uuid: Uuid,

    /// The name of the function.
    pub name: String,

    /// The runtime identifier (e.g. `python3.11`, `nodejs20`).
    pub runtime: String,

    /// The source code of the function.
    pub code: String,

    /// The handler entry point within the code.
    pub handler: String,

    /// Memory allocation in MB; the container request.
    pub memory_mb: i64,

    /// vCPU allocation; fractions are allowed (0.25, 0.5, 1, ...).
    pub vcpus: f64,

    /// Execution timeout in seconds.
    pub timeout_seconds: i64,

    /// Current lifecycle status.
    pub status: FunctionStatus,

    /// Name of the cluster workload; set only while `active`.
    pub workload_name: Option<String>,

    /// Name of the cluster endpoint; set only while `active`.
    pub endpoint_name: Option<String>,

    /// Namespace the function is deployed in; set only while `active`.
    pub namespace: Option<String>,

    /// Total number of recorded invocations.
    pub invocation_count: i64,

    /// When the function was last invoked.
    pub last_invoked_at: Option<DateTime<Utc>>,

    /// When the function last finished deploying.
    pub last_deployed_at: Option<DateTime<Utc>>,

    /// When the function was created.
    pub created_at: DateTime<Utc>,

    /// When the function was last modified.
    pub modified_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Types: Invocation
//--------------------------------------------------------------------------------------------------

/// Outcome status of a single invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    /// Record created, remote call not yet started.
    Pending,

    /// Remote call in flight.
    Running,

    /// Handler returned a value.
    Success,

    /// Handler or transport failed.
    Error,

    /// Handler exceeded its execution budget.
    Timeout,
}

/// One record per execution attempt; never deleted by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The unique identifier for the row.
    pub id: i64,

    /// The unique request identifier (`req-<12 hex>`).
    pub request_id: String,

    /// The owning function.
    pub function_uuid: Uuid,

    /// Current status of the attempt.
    pub status: InvocationStatus,

    /// Input event, JSON-encoded.
    pub input_json: Option<String>,

    /// Handler return value, JSON-encoded.
    pub output_json: Option<String>,

    /// Error text when the attempt failed.
    pub error_message: String,

    /// Captured stdout/stderr text.
    pub logs: String,

    /// Execution duration in milliseconds.
    pub duration_ms: Option<i64>,

    /// Peak memory delta in MiB.
    pub memory_used_mb: Option<i64>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the remote call started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the attempt finished.
    pub completed_at: Option<DateTime<Utc>>,
}

//--------------------------------------------------------------------------------------------------
// Types: Trigger
//--------------------------------------------------------------------------------------------------

/// Kind of a function trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Fires on a cron schedule.
    Scheduled,

    /// Bound to an HTTP route by the outer layer.
    Http,
}

/// A declarative trigger owned by a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// The unique identifier for the row.
    pub id: i64,

    /// The stable external identifier for the trigger.
    pub uuid: Uuid,

    /// The owning function.
    pub function_uuid: Uuid,

    /// The name of the trigger, unique per function.
    pub name: String,

    /// The kind of trigger.
    pub kind: TriggerKind,

    /// Cron expression for scheduled triggers (5 fields).
    pub schedule: Option<String>,

    /// Whether the trigger is active.
    pub enabled: bool,

    /// Last time the trigger fired.
    pub last_triggered_at: Option<DateTime<Utc>>,

    /// When the trigger was created.
    pub created_at: DateTime<Utc>,

    /// When the trigger was last modified.
    pub modified_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Types: Depset
//--------------------------------------------------------------------------------------------------

/// A reusable, ordered collection of runtime dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct Depset {
    /// The unique identifier for the row.
    pub id: i64,

    /// The name of the dependency set.
    pub name: String,

    /// The runtime family the packages target (e.g. `python`, `nodejs`).
    pub runtime_family: String,

    /// When the depset was created.
    pub created_at: DateTime<Utc>,
}

/// One package within a depset.
#[derive(Debug, Clone, PartialEq)]
pub struct DepsetPackage {
    /// The unique identifier for the row.
    pub id: i64,

    /// The depset this package belongs to.
    pub depset_id: i64,

    /// Package name (e.g. `requests`, `express`).
    pub package_name: String,

    /// Version number or specifier; empty means latest.
    pub version_spec: Option<String>,

    /// Installation order within the depset (lower installs first).
    pub install_order: i64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FunctionStatus {
    /// The status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionStatus::Draft => "draft",
            FunctionStatus::Deploying => "deploying",
            FunctionStatus::Active => "active",
            FunctionStatus::Undeploying => "undeploying",
            FunctionStatus::Error => "error",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(FunctionStatus::Draft),
            "deploying" => Some(FunctionStatus::Deploying),
            "active" => Some(FunctionStatus::Active),
            "undeploying" => Some(FunctionStatus::Undeploying),
            "error" => Some(FunctionStatus::Error),
            _ => None,
        }
    }

    /// Whether the lifecycle permits moving from `self` to `to`.
    pub fn can_transition(&self, to: FunctionStatus) -> bool {
        use FunctionStatus::*;
        matches!(
            (self, to),
            (Draft, Deploying)
                | (Error, Deploying)
                | (Deploying, Active)
                | (Deploying, Error)
                | (Active, Undeploying)
                | (Undeploying, Draft)
                | (Undeploying, Error)
        )
    }
}

impl InvocationStatus {
    /// The status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Pending => "pending",
            InvocationStatus::Running => "running",
            InvocationStatus::Success => "success",
            InvocationStatus::Error => "error",
            InvocationStatus::Timeout => "timeout",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InvocationStatus::Pending),
            "running" => Some(InvocationStatus::Running),
            "success" => Some(InvocationStatus::Success),
            "error" => Some(InvocationStatus::Error),
            "timeout" => Some(InvocationStatus::Timeout),
            _ => None,
        }
    }
}

impl TriggerKind {
    /// The kind as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Http => "http",
        }
    }

    /// Parses a stored kind string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(TriggerKind::Scheduled),
            "http" => Some(TriggerKind::Http),
            _ => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_follow_lifecycle() {
        use FunctionStatus::*;

        assert!(Draft.can_transition(Deploying));
        assert!(Deploying.can_transition(Active));
        assert!(Active.can_transition(Undeploying));
        assert!(Undeploying.can_transition(Draft));

        // Error is reachable from the two in-flight states, and deploy can
        // be retried from error.
        assert!(Deploying.can_transition(Error));
        assert!(Undeploying.can_transition(Error));
        assert!(Error.can_transition(Deploying));

        // No shortcuts.
        assert!(!Draft.can_transition(Active));
        assert!(!Draft.can_transition(Undeploying));
        assert!(!Active.can_transition(Draft));
        assert!(!Active.can_transition(Deploying));
        assert!(!Active.can_transition(Error));
        assert!(!Deploying.can_transition(Draft));
    }

    #[test]
    fn test_status_round_trips() {
        for status in [
            FunctionStatus::Draft,
            FunctionStatus::Deploying,
            FunctionStatus::Active,
            FunctionStatus::Undeploying,
            FunctionStatus::Error,
        ] {
            assert_eq!(FunctionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FunctionStatus::parse("bogus"), None);

        for status in [
            InvocationStatus::Pending,
            InvocationStatus::Running,
            InvocationStatus::Success,
            InvocationStatus::Error,
            InvocationStatus::Timeout,
        ] {
            assert_eq!(InvocationStatus::parse(status.as_str()), Some(status));
        }
    }
}
