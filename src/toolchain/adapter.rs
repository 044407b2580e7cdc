use std::path::{Path, PathBuf};

use crate::core::domain::{Stage, StageKind, StageTimeouts};

/// Placeholder for the built artifact in sanitized output.
pub const ARTIFACT_PLACEHOLDER: &str = "program";

/// How a language turns a source file into a running process.
///
/// Adapters are plain argv templates with no mutable state, so one registry
/// can serve any number of concurrent runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolchainAdapter {
    Interpret(InterpretAdapter),
    CompileThenRun(CompileThenRunAdapter),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterpretAdapter {
    pub interpreter: PathBuf,
    pub args: Vec<String>,
    pub source_file: String,
    pub placeholder: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileThenRunAdapter {
    pub compiler: PathBuf,
    pub flags: Vec<String>,
    pub source_file: String,
    pub artifact_file: String,
    pub placeholder: String,
}

impl ToolchainAdapter {
    pub fn python<T: AsRef<Path>>(interpreter: T) -> Self {
        ToolchainAdapter::Interpret(InterpretAdapter {
            interpreter: interpreter.as_ref().into(),
            args: Vec::new(),
            source_file: "main.py".to_string(),
            placeholder: "program.py".to_string(),
        })
    }

    pub fn gnu_cpp<T: AsRef<Path>>(compiler: T) -> Self {
        ToolchainAdapter::CompileThenRun(CompileThenRunAdapter {
            compiler: compiler.as_ref().into(),
            flags: vec!["-std=c++11".to_string()],
            source_file: "main.cpp".to_string(),
            artifact_file: "main.out".to_string(),
            placeholder: "program.cpp".to_string(),
        })
    }

    pub fn gnu_c<T: AsRef<Path>>(compiler: T) -> Self {
        ToolchainAdapter::CompileThenRun(CompileThenRunAdapter {
            compiler: compiler.as_ref().into(),
            flags: vec!["-std=c11".to_string()],
            source_file: "main.c".to_string(),
            artifact_file: "main.out".to_string(),
            placeholder: "program.c".to_string(),
        })
    }

    /// File name the source must be written to inside the workspace.
    pub fn source_file(&self) -> &str {
        match self {
            ToolchainAdapter::Interpret(adapter) => &adapter.source_file,
            ToolchainAdapter::CompileThenRun(adapter) => &adapter.source_file,
        }
    }

    /// Stable name shown in place of the real source path.
    pub fn placeholder(&self) -> &str {
        match self {
            ToolchainAdapter::Interpret(adapter) => &adapter.placeholder,
            ToolchainAdapter::CompileThenRun(adapter) => &adapter.placeholder,
        }
    }

    /// The external program this adapter depends on.
    pub fn tool(&self) -> &Path {
        match self {
            ToolchainAdapter::Interpret(adapter) => &adapter.interpreter,
            ToolchainAdapter::CompileThenRun(adapter) => &adapter.compiler,
        }
    }

    pub fn artifact_path(&self, workspace_dir: &Path) -> Option<PathBuf> {
        match self {
            ToolchainAdapter::Interpret(_) => None,
            ToolchainAdapter::CompileThenRun(adapter) => {
                Some(workspace_dir.join(&adapter.artifact_file))
            }
        }
    }

    /// Ordered stages for a workspace that already holds the source file.
    pub fn stages(&self, workspace_dir: &Path, timeouts: &StageTimeouts) -> Vec<Stage> {
        let source = path_arg(&workspace_dir.join(self.source_file()));

        match self {
            ToolchainAdapter::Interpret(adapter) => {
                let mut command = vec![path_arg(&adapter.interpreter)];
                command.extend(adapter.args.iter().cloned());
                command.push(source);

                vec![Stage {
                    kind: StageKind::Run,
                    command,
                    working_dir: workspace_dir.into(),
                    timeout: timeouts.run,
                }]
            }
            ToolchainAdapter::CompileThenRun(adapter) => {
                let artifact = path_arg(&workspace_dir.join(&adapter.artifact_file));

                let mut build = vec![path_arg(&adapter.compiler), source];
                build.push("-o".to_string());
                build.push(artifact.clone());
                build.extend(adapter.flags.iter().cloned());

                vec![
                    Stage {
                        kind: StageKind::Build,
                        command: build,
                        working_dir: workspace_dir.into(),
                        timeout: timeouts.build,
                    },
                    Stage {
                        kind: StageKind::Run,
                        command: vec![artifact],
                        working_dir: workspace_dir.into(),
                        timeout: timeouts.run,
                    },
                ]
            }
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
