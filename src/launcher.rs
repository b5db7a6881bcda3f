//! Bootstrap launcher for the simulator process.
//!
//! When no server is listening, the client can start the simulator itself
//! and watch its standard output for the readiness marker before retrying
//! the connection. The launched process is not supervised beyond that: the
//! PID is reported back for reference and the child runs on its own.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::error::{LinkError, Result};

/// Substring of a stdout line that signals the simulator is ready to
/// accept API connections. Matched case-insensitively.
const READY_MARKER: &str = "running";

/// Bounded wait for each stdout line while watching for the marker.
const LINE_WAIT: Duration = Duration::from_secs(5);

/// How to start the simulator.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to run.
    pub executable: PathBuf,
    /// Arguments, already split.
    pub args: Vec<String>,
    /// Overall budget for the process to report readiness.
    pub ready_timeout: Duration,
}

impl LaunchSpec {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            ready_timeout: Duration::from_secs(60),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Spawn the simulator and block until its stdout contains the readiness
/// marker. Returns the child's PID.
///
/// Fails if the process cannot be spawned, closes its stdout without
/// printing the marker, stalls between lines, or
/// exceeds the overall `ready_timeout`.
pub async fn start_and_wait_ready(spec: &LaunchSpec) -> Result<u32> {
    let executable = expand_home(&spec.executable);
    debug!("starting simulator: {:?} {:?}", executable, spec.args);

    let mut child = Command::new(&executable)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            LinkError::StartupFailed(format!("could not spawn {}: {e}", executable.display()))
        })?;

    let pid = child.id().ok_or_else(|| {
        LinkError::StartupFailed("simulator exited before reporting readiness".to_string())
    })?;
    let stdout = child.stdout.take().ok_or_else(|| {
        LinkError::StartupFailed("simulator stdout is not capturable".to_string())
    })?;

    let deadline = Instant::now() + spec.ready_timeout;
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let wait = LINE_WAIT.min(deadline.saturating_duration_since(Instant::now()));
        if wait.is_zero() {
            return Err(LinkError::StartupFailed(format!(
                "no readiness marker within {:?}",
                spec.ready_timeout
            )));
        }
        match time::timeout(wait, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                debug!("simulator output: {line}");
                if line.to_lowercase().contains(READY_MARKER) {
                    info!("simulator is running (pid {pid})");
                    return Ok(pid);
                }
            }
            Ok(Ok(None)) => {
                return Err(LinkError::StartupFailed(
                    "simulator closed stdout before reporting readiness".to_string(),
                ))
            }
            Ok(Err(e)) => {
                return Err(LinkError::StartupFailed(format!(
                    "error reading simulator output: {e}"
                )))
            }
            Err(_) => {
                return Err(LinkError::StartupFailed(format!(
                    "simulator produced no output for {wait:?}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_only_touches_tilde_prefix() {
        let absolute = PathBuf::from("/opt/sim/bin/sim");
        assert_eq!(expand_home(&absolute), absolute);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home(Path::new("~/Sim/bin/sim")),
                home.join("Sim/bin/sim")
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn returns_pid_once_marker_is_seen() {
        let spec = LaunchSpec::new(
            "/bin/sh",
            vec![
                "-c".to_string(),
                "echo starting; echo 'RoboDK is Running'; sleep 1".to_string(),
            ],
        );
        let pid = start_and_wait_ready(&spec).await.expect("marker printed");
        assert!(pid > 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn marker_match_is_case_insensitive() {
        let spec = LaunchSpec::new(
            "/bin/sh",
            vec!["-c".to_string(), "echo 'API server RUNNING'".to_string()],
        );
        assert!(start_and_wait_ready(&spec).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fails_when_stream_closes_without_marker() {
        let spec = LaunchSpec::new(
            "/bin/sh",
            vec!["-c".to_string(), "echo loading; echo done".to_string()],
        );
        let err = start_and_wait_ready(&spec).await.expect_err("no marker");
        assert!(matches!(err, LinkError::StartupFailed(_)));
    }

    #[tokio::test]
    async fn fails_when_executable_is_missing() {
        let spec = LaunchSpec::new("/nonexistent/simulator-binary", vec![]);
        let err = start_and_wait_ready(&spec).await.expect_err("no binary");
        assert!(matches!(err, LinkError::StartupFailed(_)));
    }
}
