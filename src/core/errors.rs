use std::path::PathBuf;

use crate::core::domain::FailureKind;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SupervisorError {
    #[error("stage command is empty")]
    EmptyCommand,
    #[error("failed to spawn {program}: {msg}")]
    Spawn { program: String, msg: String },
    #[error("failed to wait for process: {msg}")]
    Wait { msg: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove workspace at {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Unsupported language: {tag}")]
    UnsupportedLanguage { tag: String },
    #[error("No code provided")]
    MissingSource,
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("stage task failed: {msg}")]
    StageTask { msg: String },
    #[error("execution limiter is closed")]
    LimiterClosed,
}

impl ExecutionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExecutionError::UnsupportedLanguage { .. } | ExecutionError::MissingSource => {
                FailureKind::InvalidInput
            }
            _ => FailureKind::InternalError,
        }
    }
}
