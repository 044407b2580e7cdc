use std::time::Duration;

use crate::core::{
    domain::{ExecutionResult, FailureKind, StageResult},
    pipeline::append_line,
    sanitize::Sanitizer,
};

pub const COMPILATION_ERROR_HEADER: &str = "Compilation error:\n";

/// Turns a failed build stage into the final result. Returns `None` when the
/// build succeeded and the run stage may start.
pub(super) fn build_failure(
    result: &StageResult,
    sanitizer: &Sanitizer,
    limit: Duration,
) -> Option<ExecutionResult> {
    if result.success() {
        return None;
    }

    // Compilers print diagnostics on stderr; a few tools use stdout instead.
    let diagnostics = append_line(
        sanitizer.sanitize(&result.stderr),
        &sanitizer.sanitize(&result.stdout),
    );

    let (error, failure_kind) = if result.timed_out {
        (
            append_line(
                diagnostics,
                &format!("Compilation timed out after {} ms", limit.as_millis()),
            ),
            FailureKind::Timeout,
        )
    } else {
        (
            format!("{COMPILATION_ERROR_HEADER}{diagnostics}"),
            FailureKind::BuildFailed,
        )
    };

    Some(ExecutionResult {
        output: String::new(),
        error,
        exit_code: result.return_code(),
        failure_kind,
        execution_time_ms: 0,
    })
}
