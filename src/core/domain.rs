use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::ExecutionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Cpp,
    C,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::C => "c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ExecutionError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            _ => Err(ExecutionError::UnsupportedLanguage {
                tag: tag.to_string(),
            }),
        }
    }
}

/// One user submission. Owned by a single pipeline run.
#[derive(Clone, Debug)]
pub struct Submission {
    pub id: Uuid,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub language: Language,
    pub source: String,
    pub stdin: String,
}

impl Submission {
    pub fn new(language: &str, source: &str, stdin: &str) -> Result<Self, ExecutionError> {
        let language = language.parse()?;
        if source.trim().is_empty() {
            return Err(ExecutionError::MissingSource);
        }

        Ok(Submission {
            id: Uuid::new_v4(),
            received_at: chrono::Utc::now(),
            language,
            source: source.to_string(),
            stdin: stdin.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Build,
    Run,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub kind: StageKind,
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageTimeouts {
    pub build: Duration,
    pub run: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or never reaped.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    /// Set when either stream hit the capture limit.
    pub truncated: bool,
    pub elapsed: Duration,
}

impl StageResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Exit code, or the negated signal number for signalled processes.
    pub fn return_code(&self) -> Option<i32> {
        self.exit_code.or(self.signal.map(|signal| -signal))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[default]
    None,
    BuildFailed,
    Timeout,
    RuntimeError,
    InvalidInput,
    InternalError,
}

impl FailureKind {
    /// HTTP-equivalent status for the outer request layer.
    pub fn status_code(&self) -> u16 {
        match self {
            FailureKind::None | FailureKind::RuntimeError | FailureKind::BuildFailed => 200,
            FailureKind::Timeout => 408,
            FailureKind::InvalidInput => 400,
            FailureKind::InternalError => 500,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    #[serde(rename = "return_code", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub failure_kind: FailureKind,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn status_code(&self) -> u16 {
        self.failure_kind.status_code()
    }
}

impl From<&ExecutionError> for ExecutionResult {
    fn from(err: &ExecutionError) -> Self {
        let failure_kind = err.failure_kind();
        let error = match failure_kind {
            FailureKind::InvalidInput => err.to_string(),
            _ => "Internal error".to_string(),
        };

        ExecutionResult {
            output: String::new(),
            error,
            exit_code: None,
            failure_kind,
            execution_time_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_aliases() {
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("Python3".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!(" c ".parse::<Language>().unwrap(), Language::C);
    }

    #[test]
    fn test_unknown_language_is_invalid_input() {
        let err = "brainfuck".parse::<Language>().unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::InvalidInput);
        assert!(err.to_string().contains("brainfuck"));
    }

    #[test]
    fn test_submission_requires_source() {
        let err = Submission::new("python", "   \n", "").unwrap_err();
        assert!(matches!(err, ExecutionError::MissingSource));
    }

    #[test]
    fn test_stage_result_return_code() {
        let exited = StageResult {
            exit_code: Some(3),
            ..Default::default()
        };
        assert_eq!(exited.return_code(), Some(3));
        assert!(!exited.success());

        let killed = StageResult {
            signal: Some(11),
            ..Default::default()
        };
        assert_eq!(killed.return_code(), Some(-11));

        let timed_out = StageResult {
            exit_code: Some(0),
            timed_out: true,
            ..Default::default()
        };
        assert!(!timed_out.success());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FailureKind::None.status_code(), 200);
        assert_eq!(FailureKind::RuntimeError.status_code(), 200);
        assert_eq!(FailureKind::Timeout.status_code(), 408);
        assert_eq!(FailureKind::InvalidInput.status_code(), 400);
        assert_eq!(FailureKind::InternalError.status_code(), 500);
    }

    #[test]
    fn test_result_serialization_field_names() {
        let result = ExecutionResult {
            output: "2\n".to_string(),
            error: String::new(),
            exit_code: Some(0),
            failure_kind: FailureKind::None,
            execution_time_ms: 12,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["output"], "2\n");
        assert_eq!(json["return_code"], 0);
        assert_eq!(json["failure_kind"], "none");

        let internal = ExecutionResult::from(&ExecutionError::LimiterClosed);
        let json = serde_json::to_value(&internal).unwrap();
        assert!(json.get("return_code").is_none());
        assert_eq!(json["failure_kind"], "internal_error");
        assert_eq!(json["error"], "Internal error");
    }
}
