//! Subprocess execution with piped I/O and a hard timeout.
//!
//! Children are spawned in their own process group on unix so a timeout
//! kills the whole tree (compilers, test binaries), not just the direct child.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("I/O error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// A command ready to run.
#[derive(Debug, Clone)]
pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub working_dir: &'a Path,
    pub stdin: Option<&'a str>,
    pub timeout: Duration,
}

pub async fn run_process(spec: ProcessSpec<'_>) -> Result<ProcessOutput, ProcessError> {
    let started = Instant::now();
    let program = spec.program.to_string();

    let mut cmd = Command::new(spec.program);
    cmd.args(spec.args)
        .current_dir(spec.working_dir)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();
    debug!(program = %program, pid, "spawned process");

    if let (Some(input), Some(mut stdin)) = (spec.stdin, child.stdin.take()) {
        let input = input.to_string();
        // Written concurrently so a child that fills its stdout pipe before
        // reading all of stdin cannot deadlock us.
        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %err, "child closed stdin early");
            }
            drop(stdin);
        });
    }

    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        }),
        Ok(Err(source)) => Err(ProcessError::Io { program, source }),
        Err(_) => {
            warn!(program = %program, pid, timeout_secs = spec.timeout.as_secs(), "process timed out; killing process group");
            kill_group(pid);
            Err(ProcessError::Timeout {
                program,
                timeout: spec.timeout,
            })
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %err, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let args = sh("echo out; echo err >&2; exit 3");
        let output = run_process(ProcessSpec {
            program: "sh",
            args: &args,
            working_dir: Path::new("."),
            stdin: None,
            timeout: Duration::from_secs(10),
        })
        .await
        .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let args = sh("cat");
        let output = run_process(ProcessSpec {
            program: "sh",
            args: &args,
            working_dir: Path::new("."),
            stdin: Some("hello"),
            timeout: Duration::from_secs(10),
        })
        .await
        .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let args = sh("sleep 5");
        let err = run_process(ProcessSpec {
            program: "sh",
            args: &args,
            working_dir: Path::new("."),
            stdin: None,
            timeout: Duration::from_millis(100),
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let err = run_process(ProcessSpec {
            program: "definitely-not-a-real-program-name",
            args: &[],
            working_dir: Path::new("."),
            stdin: None,
            timeout: Duration::from_secs(1),
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
