//! Control-plane configuration, loaded from a YAML file.

use std::{collections::HashMap, path::Path, path::PathBuf};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    runtime::{RuntimeRegistry, RuntimeSpec},
    FncoreError, FncoreResult,
};

use super::{
    DEFAULT_AGENT_PORT, DEFAULT_BREAKER_SAMPLE, DEFAULT_BREAKER_THRESHOLD,
    DEFAULT_BREAKER_WINDOW_SECONDS, DEFAULT_DB_FILENAME, DEFAULT_DEPLOY_BACKOFF_SECONDS,
    DEFAULT_IMAGE_PREFIX, DEFAULT_JOB_RETRIES, DEFAULT_KUBECTL_PATH,
    DEFAULT_MAX_CONCURRENT_INVOCATIONS, DEFAULT_NAMESPACE, DEFAULT_UNDEPLOY_BACKOFF_SECONDS,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The fncore daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct FncoreConfig {
    /// The namespace function workloads are deployed into.
    #[serde(default = "FncoreConfig::default_namespace")]
    #[builder(default = FncoreConfig::default_namespace())]
    pub(super) namespace: String,

    /// Prefix of the built-in runtime images.
    #[serde(default = "FncoreConfig::default_image_prefix")]
    #[builder(default = FncoreConfig::default_image_prefix())]
    pub(super) image_prefix: String,

    /// Extra runtime entries, merged over the built-in table.
    #[serde(default)]
    #[builder(default)]
    pub(super) runtimes: HashMap<String, RuntimeSpec>,

    /// Path of the control-plane SQLite database.
    #[serde(default = "FncoreConfig::default_db_path")]
    #[builder(default = FncoreConfig::default_db_path())]
    pub(super) db_path: PathBuf,

    /// Executable used to open development tunnels.
    #[serde(default = "FncoreConfig::default_kubectl_path")]
    #[builder(default = FncoreConfig::default_kubectl_path())]
    pub(super) kubectl_path: String,

    /// Port the execution agent listens on inside function pods.
    #[serde(default = "FncoreConfig::default_agent_port")]
    #[builder(default = FncoreConfig::default_agent_port())]
    pub(super) agent_port: u16,

    /// Admission control: maximum invocations in flight per function.
    #[serde(default = "FncoreConfig::default_max_concurrent_invocations")]
    #[builder(default = FncoreConfig::default_max_concurrent_invocations())]
    pub(super) max_concurrent_invocations: i64,

    /// Circuit breaker: how many recent invocations are sampled.
    #[serde(default = "FncoreConfig::default_breaker_sample")]
    #[builder(default = FncoreConfig::default_breaker_sample())]
    pub(super) breaker_sample: i64,

    /// Circuit breaker: errors within the sample that trip the breaker.
    #[serde(default = "FncoreConfig::default_breaker_threshold")]
    #[builder(default = FncoreConfig::default_breaker_threshold())]
    pub(super) breaker_threshold: i64,

    /// Circuit breaker: age limit of sampled invocations, in seconds.
    #[serde(default = "FncoreConfig::default_breaker_window_seconds")]
    #[builder(default = FncoreConfig::default_breaker_window_seconds())]
    pub(super) breaker_window_seconds: i64,

    /// Attempts a deploy or undeploy job makes before giving up.
    #[serde(default = "FncoreConfig::default_job_retries")]
    #[builder(default = FncoreConfig::default_job_retries())]
    pub(super) job_retries: u32,

    /// Fixed backoff between deploy attempts, in seconds.
    #[serde(default = "FncoreConfig::default_deploy_backoff_seconds")]
    #[builder(default = FncoreConfig::default_deploy_backoff_seconds())]
    pub(super) deploy_backoff_seconds: u64,

    /// Fixed backoff between undeploy attempts, in seconds.
    #[serde(default = "FncoreConfig::default_undeploy_backoff_seconds")]
    #[builder(default = FncoreConfig::default_undeploy_backoff_seconds())]
    pub(super) undeploy_backoff_seconds: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FncoreConfig {
    /// Loads and validates configuration from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> FncoreResult<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: FncoreConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency of the configuration.
    pub fn validate(&self) -> FncoreResult<()> {
        if self.max_concurrent_invocations < 1 {
            return Err(FncoreError::ConfigValidation(
                "max_concurrent_invocations must be at least 1".to_string(),
            ));
        }
        if self.breaker_threshold > self.breaker_sample {
            return Err(FncoreError::ConfigValidation(format!(
                "breaker_threshold ({}) cannot exceed breaker_sample ({})",
                self.breaker_threshold, self.breaker_sample
            )));
        }
        if self.breaker_window_seconds < 1 {
            return Err(FncoreError::ConfigValidation(
                "breaker_window_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the runtime registry: built-in table plus configured entries.
    pub fn registry(&self) -> RuntimeRegistry {
        let mut registry = RuntimeRegistry::with_defaults(&self.image_prefix);
        for (runtime, spec) in &self.runtimes {
            registry.insert(runtime.clone(), spec.clone());
        }
        registry
    }

    fn default_namespace() -> String {
        DEFAULT_NAMESPACE.to_string()
    }

    fn default_image_prefix() -> String {
        DEFAULT_IMAGE_PREFIX.to_string()
    }

    fn default_db_path() -> PathBuf {
        PathBuf::from(DEFAULT_DB_FILENAME)
    }

    fn default_kubectl_path() -> String {
        DEFAULT_KUBECTL_PATH.to_string()
    }

    fn default_agent_port() -> u16 {
        DEFAULT_AGENT_PORT
    }

    fn default_max_concurrent_invocations() -> i64 {
        DEFAULT_MAX_CONCURRENT_INVOCATIONS
    }

    fn default_breaker_sample() -> i64 {
        DEFAULT_BREAKER_SAMPLE
    }

    fn default_breaker_threshold() -> i64 {
        DEFAULT_BREAKER_THRESHOLD
    }

    fn default_breaker_window_seconds() -> i64 {
        DEFAULT_BREAKER_WINDOW_SECONDS
    }

    fn default_job_retries() -> u32 {
        DEFAULT_JOB_RETRIES
    }

    fn default_deploy_backoff_seconds() -> u64 {
        DEFAULT_DEPLOY_BACKOFF_SECONDS
    }

    fn default_undeploy_backoff_seconds() -> u64 {
        DEFAULT_UNDEPLOY_BACKOFF_SECONDS
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for FncoreConfig {
    fn default() -> Self {
        FncoreConfig::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
