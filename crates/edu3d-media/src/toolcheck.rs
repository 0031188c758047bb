//! Availability probes for the external binaries.

use serde::Serialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::tools::{self, ToolPaths};

/// Timeout for a single `--version` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of running `<binary> <version flag>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolProbe {
    pub ok: bool,
    /// First line of the version banner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl ToolProbe {
    fn failed(error: impl Into<String>, started: Instant) -> Self {
        Self {
            ok: false,
            version: None,
            error: Some(error.into()),
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Run `binary flag` and report whether it exited successfully within `timeout`.
///
/// Spawn failures, non-zero exits and timeouts all produce a failed probe.
pub async fn probe(tool: &'static str, binary: &str, flag: &str, timeout: Duration) -> ToolProbe {
    let started = Instant::now();

    let path = match tools::resolve(tool, binary) {
        Ok(path) => path,
        Err(e) => return ToolProbe::failed(e.to_string(), started),
    };

    let child = Command::new(&path)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(e) => return ToolProbe::failed(format!("failed to start {tool}: {e}"), started),
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ToolProbe::failed(format!("{tool} probe failed: {e}"), started),
        Err(_) => {
            return ToolProbe::failed(
                format!("{tool} did not respond within {}s", timeout.as_secs()),
                started,
            )
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.lines().next().unwrap_or("").trim();
        return ToolProbe::failed(
            format!("{tool} exited with {}: {reason}", output.status),
            started,
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = stdout.lines().next().map(|l| l.trim().to_string());
    debug!(tool, version = ?version, "Tool probe ok");

    ToolProbe {
        ok: true,
        version,
        error: None,
        latency_ms: started.elapsed().as_millis() as u64,
    }
}

pub async fn probe_blender(paths: &ToolPaths) -> ToolProbe {
    probe("Blender", &paths.blender, "--version", PROBE_TIMEOUT).await
}

pub async fn probe_ffmpeg(paths: &ToolPaths) -> ToolProbe {
    probe("FFmpeg", &paths.ffmpeg, "-version", PROBE_TIMEOUT).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unhealthy() {
        let p = probe("Blender", "/no/such/blender", "--version", PROBE_TIMEOUT).await;
        assert!(!p.ok);
        assert!(p.error.unwrap().contains("Blender not found"));
    }

    #[cfg(unix)]
    fn script(dir: &std::path::Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_probe() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "fake-ffmpeg", "echo 'ffmpeg version 6.1'");
        let p = probe("FFmpeg", &bin, "-version", PROBE_TIMEOUT).await;
        assert!(p.ok, "{:?}", p.error);
        assert_eq!(p.version.as_deref(), Some("ffmpeg version 6.1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "broken", "echo 'missing library' >&2; exit 3");
        let p = probe("Blender", &bin, "--version", PROBE_TIMEOUT).await;
        assert!(!p.ok);
        let error = p.error.unwrap();
        assert!(error.contains("exited with"));
        assert!(error.contains("missing library"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "slow-tool", "sleep 5");
        let p = probe("Blender", &bin, "--version", Duration::from_millis(200)).await;
        assert!(!p.ok);
        assert!(p.error.unwrap().contains("did not respond"));
    }
}
