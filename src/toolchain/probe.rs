use std::{collections::BTreeMap, time::Duration};

use crate::{
    core::{
        domain::{Language, Stage, StageKind},
        traits::supervisor::Supervisor,
    },
    toolchain::registry::ToolchainRegistry,
};

pub const NOT_AVAILABLE: &str = "Not available";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Asks every registered tool for its version.
///
/// Reports the first non-empty line the tool prints, or `Not available` if it
/// cannot be started or exits non-zero.
#[tracing::instrument(skip_all)]
pub async fn probe(
    registry: &ToolchainRegistry,
    supervisor: &dyn Supervisor,
) -> BTreeMap<Language, String> {
    let mut versions = BTreeMap::new();

    for (language, adapter) in registry.iter() {
        let stage = Stage {
            kind: StageKind::Run,
            command: vec![
                adapter.tool().to_string_lossy().into_owned(),
                "--version".to_string(),
            ],
            working_dir: std::env::temp_dir(),
            timeout: PROBE_TIMEOUT,
        };

        let version = match supervisor.run(&stage, "").await {
            Ok(result) if result.success() => result
                .stdout
                .lines()
                .chain(result.stderr.lines())
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            Ok(result) => {
                tracing::debug!(%language, exit_code = ?result.exit_code, "Toolchain probe failed");
                NOT_AVAILABLE.to_string()
            }
            Err(e) => {
                tracing::debug!(%language, error = %e, "Toolchain not available");
                NOT_AVAILABLE.to_string()
            }
        };

        versions.insert(language, version);
    }

    versions
}
