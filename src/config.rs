use std::{path::PathBuf, time::Duration};

use crate::core::domain::StageTimeouts;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Parent directory for per-run workspaces.
    pub workspace_root: PathBuf,
    pub build_timeout: Duration,
    pub run_timeout: Duration,
    /// How long to wait for a killed process (and for its pipes) before giving up.
    pub kill_grace: Duration,
    /// Per stream cap on captured stdout/stderr.
    pub output_limit_bytes: usize,
    /// `None` means no limit on simultaneous runs.
    pub max_concurrent: Option<usize>,
    pub python_path: PathBuf,
    pub gpp_path: PathBuf,
    pub gcc_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace_root: std::env::temp_dir().join("playground-runner"),
            build_timeout: Duration::from_secs(15),
            run_timeout: Duration::from_secs(10),
            kill_grace: Duration::from_secs(1),
            output_limit_bytes: 1024 * 1024,
            max_concurrent: None,
            python_path: PathBuf::from("python3"),
            gpp_path: PathBuf::from("g++"),
            gcc_path: PathBuf::from("gcc"),
        }
    }
}

impl Config {
    pub fn stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            build: self.build_timeout,
            run: self.run_timeout,
        }
    }
}
