use crate::core::{
    domain::{Stage, StageResult},
    errors::SupervisorError,
};

/// Runs one stage to completion or timeout.
///
/// Implementations must return within `stage.timeout` plus a bounded grace
/// period and must release every process and pipe they opened before
/// returning, including on timeout.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Supervisor: std::fmt::Debug + Send + Sync {
    async fn run(&self, stage: &Stage, stdin: &str) -> Result<StageResult, SupervisorError>;
}
