//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The namespace function workloads are deployed into.
pub const DEFAULT_NAMESPACE: &str = "fncore-functions";

/// Prefix of the built-in runtime images.
pub const DEFAULT_IMAGE_PREFIX: &str = "fncore";

/// Default path of the control-plane SQLite database.
pub const DEFAULT_DB_FILENAME: &str = "fncore.db";

/// Executable used to open development tunnels.
pub const DEFAULT_KUBECTL_PATH: &str = "kubectl";

/// Port the execution agent listens on inside function pods.
pub const DEFAULT_AGENT_PORT: u16 = 8080;

/// Admission control: maximum invocations in flight per function.
pub const DEFAULT_MAX_CONCURRENT_INVOCATIONS: i64 = 5;

/// Circuit breaker: how many recent invocations are sampled.
pub const DEFAULT_BREAKER_SAMPLE: i64 = 10;

/// Circuit breaker: errors within the sample that trip the breaker.
pub const DEFAULT_BREAKER_THRESHOLD: i64 = 8;

/// Circuit breaker: age limit of sampled invocations, in seconds.
pub const DEFAULT_BREAKER_WINDOW_SECONDS: i64 = 300;

/// Attempts a deploy or undeploy job makes before giving up.
pub const DEFAULT_JOB_RETRIES: u32 = 3;

/// Fixed backoff between deploy attempts, in seconds.
pub const DEFAULT_DEPLOY_BACKOFF_SECONDS: u64 = 60;

/// Fixed backoff between undeploy attempts, in seconds.
pub const DEFAULT_UNDEPLOY_BACKOFF_SECONDS: u64 = 30;
