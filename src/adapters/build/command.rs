//! Runs the configured build command as a subprocess.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::adapters::process::{run_process, ProcessError, ProcessSpec};
use crate::domain::ports::{BuildOutcome, BuildRunner, BuildSpec};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBuildRunner;

impl CommandBuildRunner {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    #[instrument(skip(self, spec), fields(program = %spec.program))]
    async fn run(&self, spec: &BuildSpec) -> BuildOutcome {
        let result = run_process(ProcessSpec {
            program: &spec.program,
            args: &spec.args,
            working_dir: &spec.working_dir,
            stdin: None,
            timeout: spec.timeout,
        })
        .await;

        match result {
            Ok(output) => {
                let duration_ms = u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX);
                info!(success = output.success, code = ?output.code, duration_ms, "build finished");
                BuildOutcome {
                    success: output.success,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    timed_out: false,
                    duration_ms,
                }
            }
            Err(err @ ProcessError::Timeout { .. }) => {
                warn!(error = %err, "build timed out");
                BuildOutcome {
                    success: false,
                    stderr: err.to_string(),
                    timed_out: true,
                    duration_ms: u64::try_from(spec.timeout.as_millis()).unwrap_or(u64::MAX),
                    ..BuildOutcome::default()
                }
            }
            Err(err) => {
                warn!(error = %err, "build could not run");
                BuildOutcome {
                    success: false,
                    stderr: err.to_string(),
                    ..BuildOutcome::default()
                }
            }
        }
    }
}
