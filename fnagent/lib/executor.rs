//! Handler execution in killable driver child processes.
//!
//! Every runtime image ships a driver executable that knows how to take a
//! code file and a handler name, feed it the event JSON on stdin, and print
//! the outcome as a single sentinel-prefixed JSON line on stdout. The agent
//! stays runtime-agnostic: it spawns the driver, captures output, enforces
//! the timeout, and force-kills the child when the budget elapses.

use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use nix::sys::resource::{getrusage, UsageWho};
use serde::Deserialize;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
    task::JoinHandle,
    time::timeout,
};

use crate::{api::AgentResult, FnagentError, FnagentResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix marking the driver's result line on stdout.
pub const RESULT_SENTINEL: &str = "__FNAGENT_RESULT__";

/// Default location of the runtime driver inside function images.
pub const DEFAULT_DRIVER_PATH: &str = "/opt/fnagent/driver";

/// Filename the code is written under in the per-invocation workdir.
const CODE_FILENAME: &str = "function.code";

/// How long the pipe readers get to drain after the driver is gone. A
/// handler may leave grandchildren holding the pipe open; the agent will
/// not wait on them.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A function installed on the agent, ready to be invoked.
#[derive(Debug, Clone)]
pub struct LoadedFunction {
    /// Source code of the function.
    pub code: String,

    /// Name of the handler entry point.
    pub handler: String,

    /// Environment variables exported to the driver process.
    pub env_vars: HashMap<String, String>,
}

/// Executes loaded functions through the runtime driver.
pub struct Executor {
    /// Path to the runtime driver executable.
    driver_path: PathBuf,
}

/// The driver's parsed sentinel line.
#[derive(Debug, Deserialize)]
struct DriverOutcome {
    success: bool,

    #[serde(default)]
    result: Option<Value>,

    #[serde(default)]
    error: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Executor {
    /// Creates an executor that spawns the driver at the given path.
    pub fn new(driver_path: impl Into<PathBuf>) -> Self {
        Self {
            driver_path: driver_path.into(),
        }
    }

    /// Runs the loaded function against an event under a hard timeout.
    ///
    /// Never returns an error: every failure mode, including the agent's own,
    /// is folded into an [`AgentResult`] so the caller always gets the wire
    /// shape back.
    pub async fn execute(
        &self,
        function: &LoadedFunction,
        event: &Value,
        timeout_seconds: u64,
    ) -> AgentResult {
        match self.try_execute(function, event, timeout_seconds).await {
            Ok(result) => result,
            Err(e) => AgentResult::failed(format!("agent error: {}", e), String::new(), 0),
        }
    }

    async fn try_execute(
        &self,
        function: &LoadedFunction,
        event: &Value,
        timeout_seconds: u64,
    ) -> FnagentResult<AgentResult> {
        // Per-invocation workdir; removed when the guard drops.
        let workdir = tempfile::tempdir()?;
        let code_path = workdir.path().join(CODE_FILENAME);
        tokio::fs::write(&code_path, &function.code).await?;

        let rss_before_mb = peak_children_rss_mb();
        let start = Instant::now();

        let mut child = Command::new(&self.driver_path)
            .arg(&code_path)
            .arg(&function.handler)
            .env("FNAGENT_TIMEOUT_SECONDS", timeout_seconds.to_string())
            .envs(&function.env_vars)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed the event JSON. A driver that exits before reading produces
        // EPIPE here; the exit status tells the real story, so don't fail on
        // the write itself.
        if let Some(mut stdin) = child.stdin.take() {
            let event_bytes = serde_json::to_vec(event)?;
            if let Err(e) = stdin.write_all(&event_bytes).await {
                tracing::warn!("failed to write event to driver stdin: {}", e);
            }
            let _ = stdin.write_all(b"\n").await;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FnagentError::custom(anyhow::anyhow!("driver stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FnagentError::custom(anyhow::anyhow!("driver stderr not captured")))?;

        // Readers append into shared buffers so partial logs survive a kill.
        // A grandchild inheriting the pipe can hold it open past the
        // driver's death, so EOF is never awaited unconditionally.
        let stdout_logs = Arc::new(Mutex::new(String::new()));
        let stderr_logs = Arc::new(Mutex::new(String::new()));
        let outcome_slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let mut stdout_task: JoinHandle<()> = tokio::spawn({
            let logs = stdout_logs.clone();
            let slot = outcome_slot.clone();
            async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(rest) = line.strip_prefix(RESULT_SENTINEL) {
                        *slot.lock().unwrap() = Some(rest.trim().to_string());
                    } else {
                        let mut logs = logs.lock().unwrap();
                        logs.push_str(&line);
                        logs.push('\n');
                    }
                }
            }
        });
        let mut stderr_task: JoinHandle<()> = tokio::spawn({
            let logs = stderr_logs.clone();
            async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut logs = logs.lock().unwrap();
                    logs.push_str(&line);
                    logs.push('\n');
                }
            }
        });

        let waited = timeout(Duration::from_secs(timeout_seconds), child.wait()).await;

        let timed_out = waited.is_err();
        if timed_out {
            // Budget elapsed: the child is killed outright and reaped, so a
            // runaway handler cannot linger past its timeout.
            if let Err(e) = child.start_kill() {
                tracing::warn!("failed to kill overrunning driver: {}", e);
            }
            let _ = child.wait().await;
            tracing::warn!(
                "handler exceeded its {}s budget, driver killed",
                timeout_seconds
            );
        }

        // Let the readers flush whatever the pipes already hold, then stop
        // caring about stragglers.
        let _ = timeout(DRAIN_GRACE, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await;
        stdout_task.abort();
        stderr_task.abort();

        let logs = combine_logs(&stdout_logs.lock().unwrap(), &stderr_logs.lock().unwrap());

        let status = match waited {
            Err(_) => {
                return Ok(AgentResult::failed(
                    format!("Function execution exceeded {} seconds", timeout_seconds),
                    logs,
                    timeout_seconds * 1000,
                ));
            }
            Ok(status) => status?,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let outcome = outcome_slot.lock().unwrap().take();

        let Some(raw) = outcome else {
            return Ok(if status.success() {
                AgentResult::failed("runtime driver produced no result", logs, elapsed_ms)
            } else {
                AgentResult::failed(
                    format!("runtime driver exited with {}", status),
                    logs,
                    elapsed_ms,
                )
            });
        };

        let outcome: DriverOutcome = match serde_json::from_str(&raw) {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(AgentResult::failed(
                    format!("malformed driver result: {}", e),
                    logs,
                    elapsed_ms,
                ))
            }
        };

        if outcome.success {
            let memory_used_mb = peak_children_rss_mb().saturating_sub(rss_before_mb);
            Ok(AgentResult::ok(
                outcome.result.unwrap_or(Value::Null),
                logs,
                elapsed_ms,
                memory_used_mb,
            ))
        } else {
            Ok(AgentResult::failed(
                outcome
                    .error
                    .unwrap_or_else(|| "handler failed without detail".to_string()),
                logs,
                elapsed_ms,
            ))
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Peak resident memory of reaped children, in MiB.
///
/// ru_maxrss is reported in KiB on Linux. The delta around a call gives the
/// invocation's footprint because the counter is monotone per process tree.
fn peak_children_rss_mb() -> u64 {
    match getrusage(UsageWho::RUSAGE_CHILDREN) {
        Ok(usage) => (usage.max_rss().max(0) as u64) / 1024,
        Err(e) => {
            tracing::debug!("getrusage failed: {}", e);
            0
        }
    }
}

fn combine_logs(stdout_logs: &str, stderr_logs: &str) -> String {
    let mut logs = String::new();
    if !stdout_logs.is_empty() {
        logs.push_str("[stdout]\n");
        logs.push_str(stdout_logs);
    }
    if !stderr_logs.is_empty() {
        logs.push_str("[stderr]\n");
        logs.push_str(stderr_logs);
    }
    logs
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::{os::unix::fs::PermissionsExt, path::Path};

    fn write_driver(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("driver");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn loaded(env_vars: HashMap<String, String>) -> LoadedFunction {
        LoadedFunction {
            code: "def handler(event, context): return event".to_string(),
            handler: "handler".to_string(),
            env_vars,
        }
    }

    #[tokio::test]
    async fn test_execute_success_echoes_event() {
        let dir = tempfile::tempdir().unwrap();
        let driver = write_driver(
            dir.path(),
            "#!/bin/sh\n\
             read -r EVENT\n\
             echo \"processing event\"\n\
             echo \"__FNAGENT_RESULT__ {\\\"success\\\": true, \\\"result\\\": $EVENT}\"\n",
        );

        let executor = Executor::new(&driver);
        let event = serde_json::json!({"n": 42});
        let result = executor.execute(&loaded(HashMap::new()), &event, 10).await;

        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.result, Some(serde_json::json!({"n": 42})));
        assert!(result.logs.contains("[stdout]"));
        assert!(result.logs.contains("processing event"));
        assert!(!result.logs.contains(RESULT_SENTINEL));
    }

    #[tokio::test]
    async fn test_execute_handler_error() {
        let dir = tempfile::tempdir().unwrap();
        let driver = write_driver(
            dir.path(),
            "#!/bin/sh\n\
             cat > /dev/null\n\
             echo \"Traceback: boom\" >&2\n\
             echo '__FNAGENT_RESULT__ {\"success\": false, \"error\": \"ValueError: boom\"}'\n",
        );

        let executor = Executor::new(&driver);
        let result = executor
            .execute(&loaded(HashMap::new()), &Value::Null, 10)
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("ValueError: boom"));
        assert!(result.logs.contains("[stderr]"));
        assert!(result.logs.contains("Traceback: boom"));
    }

    #[tokio::test]
    async fn test_execute_timeout_kills_driver() {
        let dir = tempfile::tempdir().unwrap();
        let driver = write_driver(
            dir.path(),
            "#!/bin/sh\n\
             echo \"started\"\n\
             sleep 30\n\
             echo '__FNAGENT_RESULT__ {\"success\": true}'\n",
        );

        let executor = Executor::new(&driver);
        let start = Instant::now();
        let result = executor
            .execute(&loaded(HashMap::new()), &Value::Null, 1)
            .await;

        assert!(!result.success);
        assert_eq!(result.execution_time_ms, 1000);
        assert!(result.error.unwrap().contains("exceeded 1 seconds"));
        assert!(result.logs.contains("started"));
        // The driver must actually die, not run out its 30s sleep.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_execute_env_vars_reach_driver() {
        let dir = tempfile::tempdir().unwrap();
        let driver = write_driver(
            dir.path(),
            "#!/bin/sh\n\
             cat > /dev/null\n\
             echo \"__FNAGENT_RESULT__ {\\\"success\\\": true, \\\"result\\\": \\\"$API_KEY\\\"}\"\n",
        );

        let executor = Executor::new(&driver);
        let mut env_vars = HashMap::new();
        env_vars.insert("API_KEY".to_string(), "sk-123".to_string());
        let result = executor.execute(&loaded(env_vars), &Value::Null, 10).await;

        assert!(result.success);
        assert_eq!(result.result, Some(Value::String("sk-123".to_string())));
    }

    #[tokio::test]
    async fn test_execute_driver_crash_without_result() {
        let dir = tempfile::tempdir().unwrap();
        let driver = write_driver(
            dir.path(),
            "#!/bin/sh\n\
             cat > /dev/null\n\
             echo \"about to crash\" >&2\n\
             exit 3\n",
        );

        let executor = Executor::new(&driver);
        let result = executor
            .execute(&loaded(HashMap::new()), &Value::Null, 10)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("exited with"));
        assert!(result.logs.contains("about to crash"));
    }

    #[tokio::test]
    async fn test_execute_missing_driver_is_structured_failure() {
        let executor = Executor::new("/nonexistent/driver");
        let result = executor
            .execute(&loaded(HashMap::new()), &Value::Null, 10)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("agent error"));
    }
}
