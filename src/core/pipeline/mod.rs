use std::{any::Any, panic::AssertUnwindSafe, path::Path, sync::Arc, time::Instant};

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    config::Config,
    core::{
        domain::{
            ExecutionResult, FailureKind, Stage, StageKind, StageResult, StageTimeouts, Submission,
        },
        errors::ExecutionError,
        sanitize::Sanitizer,
        traits::supervisor::Supervisor,
    },
    native::{
        supervisor::NativeSupervisor,
        workspace::{Workspace, WorkspaceManager},
    },
    toolchain::{
        adapter::{ARTIFACT_PLACEHOLDER, ToolchainAdapter},
        registry::ToolchainRegistry,
    },
};

mod compiling;
mod running;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Resolving,
    Building,
    Running,
    Sanitizing,
    Done,
}

/// Turns a (language, source, stdin) submission into a time-bounded run.
///
/// Runs are independent: the only state shared between concurrent calls to
/// `execute` is the workspace namespace, which is collision free by naming,
/// and the optional admission limiter.
#[derive(Clone, Debug)]
pub struct Pipeline {
    registry: Arc<ToolchainRegistry>,
    workspaces: WorkspaceManager,
    supervisor: Arc<dyn Supervisor>,
    timeouts: StageTimeouts,
    limiter: Option<Arc<Semaphore>>,
}

impl Pipeline {
    pub fn new(
        registry: ToolchainRegistry,
        workspaces: WorkspaceManager,
        supervisor: Arc<dyn Supervisor>,
        timeouts: StageTimeouts,
    ) -> Self {
        Pipeline {
            registry: Arc::new(registry),
            workspaces,
            supervisor,
            timeouts,
            limiter: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let pipeline = Pipeline::new(
            ToolchainRegistry::from_config(config),
            WorkspaceManager::new(&config.workspace_root),
            Arc::new(NativeSupervisor::new(
                config.kill_grace,
                config.output_limit_bytes,
            )),
            config.stage_timeouts(),
        );

        match config.max_concurrent {
            Some(limit) => pipeline.with_max_concurrent(limit),
            None => pipeline,
        }
    }

    /// Queues submissions beyond `limit` until a running one finishes.
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    pub fn supervisor(&self) -> &dyn Supervisor {
        self.supervisor.as_ref()
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Never fails: every error is folded into the returned result's
    /// `failure_kind`.
    #[tracing::instrument(skip(self, source, stdin))]
    pub async fn execute(&self, language: &str, source: &str, stdin: &str) -> ExecutionResult {
        let started = Instant::now();
        log_state(PipelineState::Received);

        let outcome = match Submission::new(language, source, stdin) {
            Ok(submission) => self.execute_submission(&submission).await,
            Err(e) => Err(e),
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => {
                if e.failure_kind() == FailureKind::InvalidInput {
                    tracing::info!(error = %e, "Submission rejected");
                } else {
                    tracing::error!(error = ?e, "Execution failed");
                }
                ExecutionResult::from(&e)
            }
        };
        result.execution_time_ms = started.elapsed().as_millis() as u64;

        log_state(PipelineState::Done);
        tracing::info!(
            failure_kind = ?result.failure_kind,
            return_code = ?result.exit_code,
            execution_time_ms = result.execution_time_ms,
            "Execution finished"
        );
        result
    }

    #[tracing::instrument(
        skip_all,
        fields(
            submission = %submission.id,
            language = %submission.language,
            received_at = %submission.received_at
        )
    )]
    async fn execute_submission(
        &self,
        submission: &Submission,
    ) -> Result<ExecutionResult, ExecutionError> {
        let _permit = self.admit().await?;

        log_state(PipelineState::Resolving);
        let adapter = self.registry.resolve(submission.language)?;

        let workspace = self.workspaces.acquire().await?;
        let outcome = self.run_stages(&workspace, adapter, submission).await;
        if let Err(e) = workspace.release().await {
            tracing::error!(error = ?e, "Failed to release workspace");
        }

        outcome
    }

    async fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, ExecutionError> {
        let Some(limiter) = &self.limiter else {
            return Ok(None);
        };

        limiter
            .clone()
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|_| ExecutionError::LimiterClosed)
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        adapter: &ToolchainAdapter,
        submission: &Submission,
    ) -> Result<ExecutionResult, ExecutionError> {
        let source_path = workspace
            .write_file(adapter.source_file(), &submission.source)
            .await?;

        let mut sanitizer = Sanitizer::new()
            .with_rewrite(path_text(&source_path), adapter.placeholder())
            .with_rewrite(path_text(workspace.path()), ".");
        if let Some(artifact) = adapter.artifact_path(workspace.path()) {
            sanitizer = sanitizer.with_rewrite(path_text(&artifact), ARTIFACT_PLACEHOLDER);
        }

        for stage in adapter.stages(workspace.path(), &self.timeouts) {
            match stage.kind {
                StageKind::Build => {
                    log_state(PipelineState::Building);
                    let result = self.run_stage(&stage, "").await?;
                    if let Some(failed) =
                        compiling::build_failure(&result, &sanitizer, stage.timeout)
                    {
                        return Ok(failed);
                    }
                }
                StageKind::Run => {
                    log_state(PipelineState::Running);
                    let result = self.run_stage(&stage, &submission.stdin).await?;
                    log_state(PipelineState::Sanitizing);
                    return Ok(running::run_outcome(&result, &sanitizer, stage.timeout));
                }
            }
        }

        Err(ExecutionError::StageTask {
            msg: "toolchain produced no run stage".to_string(),
        })
    }

    async fn run_stage(&self, stage: &Stage, stdin: &str) -> Result<StageResult, ExecutionError> {
        // The call itself goes inside the future so a panic while starting
        // the stage is caught as well.
        AssertUnwindSafe(async { self.supervisor.run(stage, stdin).await })
            .catch_unwind()
            .await
            .map_err(|panic| ExecutionError::StageTask {
                msg: panic_message(panic.as_ref()),
            })?
            .map_err(ExecutionError::from)
    }
}

fn log_state(state: PipelineState) {
    tracing::debug!(?state, "Pipeline state");
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "stage panicked".to_string()
    }
}

/// Appends `line` to `text`, starting a new line if needed.
pub(crate) fn append_line(mut text: String, line: &str) -> String {
    if line.is_empty() {
        return text;
    }
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(line);
    text
}
