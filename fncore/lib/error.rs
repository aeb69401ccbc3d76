use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an fncore-related operation.
pub type FncoreResult<T> = Result<T, FncoreError>;

/// An error that occurred during a control-plane operation.
#[derive(Debug, Error)]
pub enum FncoreError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred while serializing or deserializing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred while parsing a YAML configuration file.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An error that occurred during a database operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while running database migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error returned by the cluster API.
    #[error("cluster api error: {0}")]
    Cluster(#[from] kube::Error),

    /// An error that occurred while building the cluster client configuration.
    #[error("cluster config error: {0}")]
    ClusterConfig(String),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error that occurred when a runtime has no registered image.
    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// An error that occurred when a workload did not become ready in time.
    #[error("deployment {workload} not ready after {waited_seconds}s")]
    DeploymentTimeout {
        /// Name of the workload that never became ready.
        workload: String,
        /// The readiness budget that elapsed.
        waited_seconds: u64,
    },

    /// An error that occurred when a function record was not found.
    #[error("function not found: {0}")]
    FunctionNotFound(Uuid),

    /// An error that occurred when a lifecycle transition was rejected
    /// because the function was not in a legal source state.
    #[error("function {uuid} cannot move to {to} from its current status")]
    StatusConflict {
        /// The function whose transition was rejected.
        uuid: Uuid,
        /// The transition target.
        to: String,
    },

    /// An error that occurred when invoking a function that is not deployed.
    #[error("function {0} is not deployed")]
    NotDeployed(Uuid),

    /// An error that occurred when a function hit its concurrency cap.
    #[error("too many concurrent invocations ({count}); wait for previous invocations to complete")]
    TooManyConcurrentInvocations {
        /// Number of invocations currently in flight.
        count: i64,
    },

    /// An error that occurred when the circuit breaker rejected an invocation.
    #[error("function has a high recent failure rate ({failures}/{sample}); invocations are temporarily rejected")]
    CircuitBreakerOpen {
        /// Failures observed in the window.
        failures: i64,
        /// Size of the observed sample.
        sample: i64,
    },

    /// An error that occurred when a cron expression could not be parsed.
    #[error("invalid cron expression: {0}")]
    InvalidCronExpression(String),

    /// An error that occurred when a development tunnel could not be opened.
    #[error("tunnel error: {0}")]
    Tunnel(String),

    /// An error that occurred when the configuration was invalid.
    #[error("config validation error: {0}")]
    ConfigValidation(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FncoreError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> FncoreError {
        FncoreError::Custom(AnyError {
            error: error.into(),
        })
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
