use std::time::Duration;

use crate::core::{
    domain::{ExecutionResult, FailureKind, StageResult},
    pipeline::append_line,
    sanitize::Sanitizer,
};

pub const OUTPUT_TRUNCATED_NOTICE: &str = "Output truncated";

/// Classifies the run stage. A non-zero exit is the program's own business
/// and is not a failure; being killed by a signal is.
pub(super) fn run_outcome(
    result: &StageResult,
    sanitizer: &Sanitizer,
    limit: Duration,
) -> ExecutionResult {
    let output = sanitizer.sanitize(&result.stdout);
    let mut error = sanitizer.sanitize(&result.stderr);
    if result.truncated {
        error = append_line(error, OUTPUT_TRUNCATED_NOTICE);
    }

    let (error, failure_kind) = if result.timed_out {
        (
            append_line(
                error,
                &format!("Execution timed out after {} ms", limit.as_millis()),
            ),
            FailureKind::Timeout,
        )
    } else if result.exit_code.is_none() {
        (error, FailureKind::RuntimeError)
    } else {
        (error, FailureKind::None)
    };

    ExecutionResult {
        output,
        error,
        exit_code: result.return_code(),
        failure_kind,
        execution_time_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_clean_exit() {
        let result = StageResult {
            stdout: "2\n".to_string(),
            exit_code: Some(0),
            ..Default::default()
        };

        let outcome = run_outcome(&result, &Sanitizer::new(), LIMIT);

        assert_eq!(outcome.output, "2\n");
        assert_eq!(outcome.error, "");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.failure_kind, FailureKind::None);
    }

    #[test]
    fn test_nonzero_exit_is_not_a_failure() {
        let result = StageResult {
            stderr: "Traceback (most recent call last):\nValueError: bad\n".to_string(),
            exit_code: Some(1),
            ..Default::default()
        };

        let outcome = run_outcome(&result, &Sanitizer::new(), LIMIT);

        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.error.contains("ValueError"));
    }

    #[test]
    fn test_signal_is_runtime_error() {
        let result = StageResult {
            stderr: "partial".to_string(),
            signal: Some(11),
            ..Default::default()
        };

        let outcome = run_outcome(&result, &Sanitizer::new(), LIMIT);

        assert_eq!(outcome.failure_kind, FailureKind::RuntimeError);
        assert_eq!(outcome.exit_code, Some(-11));
        assert_eq!(outcome.error, "partial");
        assert_eq!(outcome.status_code(), 200);
    }

    #[test]
    fn test_timeout_keeps_partial_output() {
        let result = StageResult {
            stdout: "\x1b[32mtick\x1b[0m\ntick\n".to_string(),
            stderr: "warning\n".to_string(),
            signal: Some(9),
            timed_out: true,
            ..Default::default()
        };

        let outcome = run_outcome(&result, &Sanitizer::new(), LIMIT);

        assert_eq!(outcome.failure_kind, FailureKind::Timeout);
        assert_eq!(outcome.output, "tick\ntick\n");
        assert_eq!(outcome.error, "warning\nExecution timed out after 2000 ms");
    }

    #[test]
    fn test_truncation_is_reported_before_timeout_notice() {
        let result = StageResult {
            stdout: "x".repeat(16),
            timed_out: true,
            truncated: true,
            ..Default::default()
        };

        let outcome = run_outcome(&result, &Sanitizer::new(), LIMIT);

        assert_eq!(outcome.output, "x".repeat(16));
        assert_eq!(
            outcome.error,
            "Output truncated\nExecution timed out after 2000 ms"
        );
    }

    #[test]
    fn test_workspace_paths_hidden_in_tracebacks() {
        let sanitizer = Sanitizer::new()
            .with_rewrite("/tmp/ws", ".")
            .with_rewrite("/tmp/ws/main.py", "program.py");
        let result = StageResult {
            stderr: "  File \"/tmp/ws/main.py\", line 1, in <module>\n".to_string(),
            exit_code: Some(1),
            ..Default::default()
        };

        let outcome = run_outcome(&result, &sanitizer, LIMIT);

        assert_eq!(outcome.error, "  File \"program.py\", line 1, in <module>\n");
    }
}
