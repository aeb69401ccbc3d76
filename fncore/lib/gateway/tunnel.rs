//! Development tunnels: `kubectl port-forward` child processes.
//!
//! Outside the cluster there is no service DNS, so the gateway opens a
//! temporary port-forward for the duration of one invocation. The child is
//! always cleaned up: graceful SIGTERM first, force kill when it lingers.

use std::{process::Stdio, time::Duration};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    process::{Child, Command},
    time::timeout,
};

use crate::{FncoreError, FncoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long the tunnel gets to establish before we check on it.
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// How long a SIGTERM'd tunnel gets to exit before the hard kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A live port-forward from `localhost:<local_port>` to a cluster service.
#[derive(Debug)]
pub struct PortForwardTunnel {
    child: Child,
    local_port: u16,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PortForwardTunnel {
    /// Starts a port-forward and verifies the process survived its first
    /// moment; a tunnel that dies immediately (bad service name, no cluster)
    /// is reported as an error rather than a hung invocation.
    pub async fn open(
        kubectl_path: &str,
        service: &str,
        namespace: &str,
        local_port: u16,
        remote_port: u16,
    ) -> FncoreResult<Self> {
        tracing::info!(
            "port-forwarding {} to localhost:{}",
            service,
            local_port
        );

        let mut child = Command::new(kubectl_path)
            .arg("port-forward")
            .arg(format!("service/{}", service))
            .arg(format!("{}:{}", local_port, remote_port))
            .arg("-n")
            .arg(namespace)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                FncoreError::Tunnel(format!("failed to start {}: {}", kubectl_path, e))
            })?;

        tokio::time::sleep(SETTLE_DELAY).await;

        if let Some(status) = child.try_wait()? {
            return Err(FncoreError::Tunnel(format!(
                "port-forward process exited unexpectedly with {}",
                status
            )));
        }

        Ok(Self { child, local_port })
    }

    /// The local port the tunnel listens on.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Tears the tunnel down: SIGTERM, bounded wait, then SIGKILL.
    pub async fn close(mut self) {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            let _ = self.child.wait().await;
            return;
        };

        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::warn!("failed to send SIGTERM to port-forward {}: {}", pid, e);
        }

        match timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(_) => tracing::info!("cleaned up port-forward process"),
            Err(_) => {
                tracing::warn!("port-forward didn't terminate gracefully, force killing");
                if let Err(e) = self.child.kill().await {
                    tracing::error!("failed to force kill port-forward {}: {}", pid, e);
                }
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::{os::unix::fs::PermissionsExt, path::Path, path::PathBuf, time::Instant};

    fn write_stub(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("kubectl");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn test_open_and_close_long_lived_tunnel() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), "#!/bin/sh\nsleep 60\n");

        let tunnel = PortForwardTunnel::open(
            stub.to_str().unwrap(),
            "func-a1b2c3d4-svc",
            "fncore-functions",
            30123,
            8080,
        )
        .await
        .unwrap();
        assert_eq!(tunnel.local_port(), 30123);

        // SIGTERM is enough for a plain sleep.
        let start = Instant::now();
        tunnel.close().await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_open_fails_when_process_dies_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), "#!/bin/sh\nexit 1\n");

        let err = PortForwardTunnel::open(
            stub.to_str().unwrap(),
            "func-a1b2c3d4-svc",
            "fncore-functions",
            30124,
            8080,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FncoreError::Tunnel(_)));
    }

    #[tokio::test]
    async fn test_close_force_kills_a_stubborn_tunnel() {
        let dir = tempfile::tempdir().unwrap();
        // Ignores SIGTERM; only the hard kill ends it.
        let stub = write_stub(dir.path(), "#!/bin/sh\ntrap '' TERM\nsleep 60 & wait\n");

        let tunnel = PortForwardTunnel::open(
            stub.to_str().unwrap(),
            "func-a1b2c3d4-svc",
            "fncore-functions",
            30125,
            8080,
        )
        .await
        .unwrap();

        let start = Instant::now();
        tunnel.close().await;
        // Grace period plus the kill, never the full sleep.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_executable() {
        let err = PortForwardTunnel::open(
            "/nonexistent/kubectl",
            "svc",
            "ns",
            30126,
            8080,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FncoreError::Tunnel(_)));
    }
}
