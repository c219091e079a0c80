//! Pipeline configuration.
//!
//! The plan, the failure-tolerance policy, and the tool fallback directories
//! are all data: `isoforge.toml`, discovered by searching upward from the
//! working directory. Precedence for the few runtime knobs is CLI flags >
//! config file > defaults; the CLI applies its overrides after loading.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use isoforge_pipeline::{FailurePolicy, Phase, Plan};
use isoforge_utils::IsoforgeError;
use isoforge_utils::error::ConfigError;
use isoforge_utils::paths::{self, StateLayout};

/// `[pipeline]` table: run-wide defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineSection {
    /// Refuse to start without elevated privileges
    #[serde(default)]
    require_root: bool,
    /// Timeout applied to items that declare none of their own
    #[serde(default)]
    default_timeout_secs: Option<u64>,
}

/// `[tools]` table: extra fallback directories for tool resolution.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolsSection {
    #[serde(default)]
    fallback_dirs: Vec<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    tools: ToolsSection,
    #[serde(default, rename = "phase")]
    phases: Vec<Phase>,
    #[serde(default)]
    policy: FailurePolicy,
}

/// Loaded and validated pipeline configuration.
#[derive(Debug)]
pub struct PipelineConfig {
    /// Directory containing the config file; state lives beneath it
    pub project_root: Utf8PathBuf,
    /// Well-known state paths under `.isoforge/`
    pub layout: StateLayout,
    /// The validated phase plan
    pub plan: Plan,
    /// External failure-tolerance policy
    pub policy: FailurePolicy,
    /// Extra tool fallback directories from `[tools].fallback_dirs`
    pub extra_fallback_dirs: Vec<Utf8PathBuf>,
    /// Whether the pipeline refuses to run without root
    pub require_root: bool,
    /// Default per-item timeout
    pub default_timeout: Option<Duration>,
}

impl PipelineConfig {
    /// Load from an explicit path, or discover `isoforge.toml` upward from
    /// the current directory.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self, IsoforgeError> {
        let config_path = match explicit {
            Some(path) => path.to_owned(),
            None => {
                let cwd = std::env::current_dir()
                    .ok()
                    .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
                    .unwrap_or_else(|| Utf8PathBuf::from("."));
                paths::discover_config(&cwd).ok_or(ConfigError::NotFound {
                    searched_from: cwd.to_string(),
                })?
            }
        };
        Self::load_file(&config_path)
    }

    /// Load and validate one config file.
    pub fn load_file(config_path: &Utf8Path) -> Result<Self, IsoforgeError> {
        let content =
            fs::read_to_string(config_path).map_err(|e| ConfigError::Unreadable {
                path: config_path.to_string(),
                reason: e.to_string(),
            })?;

        let raw: RawConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_string(),
            reason: e.to_string(),
        })?;

        let plan = Plan::new(raw.phases)?;
        raw.policy.validate_against(&plan)?;

        let project_root = config_path
            .parent()
            .map_or_else(|| Utf8PathBuf::from("."), Utf8Path::to_owned);
        let layout = StateLayout::for_project(&project_root);

        Ok(Self {
            project_root,
            layout,
            plan,
            policy: raw.policy,
            extra_fallback_dirs: raw.tools.fallback_dirs,
            require_root: raw.pipeline.require_root,
            default_timeout: raw.pipeline.default_timeout_secs.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isoforge_utils::types::{ItemId, PhaseId};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[pipeline]
require_root = false
default_timeout_secs = 3600

[tools]
fallback_dirs = ["/opt/imaging/bin"]

[[phase]]
id = "bootstrap"
tools = ["pacstrap"]

[[phase.item]]
id = "pacstrap"
program = "pacstrap"
args = ["-c", "rootfs", "base", "linux"]

[[phase]]
id = "extras"
depends_on = ["bootstrap"]
max_parallel = 4

[[phase.item]]
id = "aur-helper"
program = "paru"
args = ["-S", "--noconfirm", "extra-tools"]
best_effort = true
max_retries = 2

[[phase.item]]
id = "fonts"
program = "install-fonts"

[policy]
extras = ["fonts"]
"#;

    fn write_config(dir: &TempDir, content: &str) -> Utf8PathBuf {
        let path =
            Utf8PathBuf::from_path_buf(dir.path().join("isoforge.toml")).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_a_complete_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, SAMPLE);

        let config = PipelineConfig::load_file(&path).unwrap();
        assert_eq!(config.plan.phases().len(), 2);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(
            config.extra_fallback_dirs,
            vec![Utf8PathBuf::from("/opt/imaging/bin")]
        );

        let extras = config.plan.get(&PhaseId::new("extras").unwrap()).unwrap();
        assert_eq!(extras.max_parallel, 4);
        assert!(extras.items[0].best_effort);
        assert_eq!(extras.items[0].max_retries, 2);
        assert!(config.policy.is_tolerated(
            &PhaseId::new("extras").unwrap(),
            &ItemId::new("fonts").unwrap()
        ));
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[surprise]\nkey = 1\n");
        let err = PipelineConfig::load_file(&path).unwrap_err();
        assert!(matches!(
            err,
            IsoforgeError::Config(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_policy_entries_for_unknown_items() {
        let dir = TempDir::new().unwrap();
        let bad = r#"
[[phase]]
id = "extras"

[[phase.item]]
id = "fonts"
program = "install-fonts"

[policy]
extras = ["ghost"]
"#;
        let path = write_config(&dir, bad);
        let err = PipelineConfig::load_file(&path).unwrap_err();
        assert!(matches!(
            err,
            IsoforgeError::Config(ConfigError::UnknownPolicyTarget { .. })
        ));
    }

    #[test]
    fn rejects_forward_dependencies() {
        let dir = TempDir::new().unwrap();
        let bad = r#"
[[phase]]
id = "first"
depends_on = ["second"]

[[phase.item]]
id = "a"
program = "true"

[[phase]]
id = "second"

[[phase.item]]
id = "b"
program = "true"
"#;
        let path = write_config(&dir, bad);
        assert!(matches!(
            PipelineConfig::load_file(&path).unwrap_err(),
            IsoforgeError::Phase(_)
        ));
    }

    #[test]
    fn missing_file_reports_unreadable() {
        let dir = TempDir::new().unwrap();
        let path =
            Utf8PathBuf::from_path_buf(dir.path().join("absent.toml")).unwrap();
        assert!(matches!(
            PipelineConfig::load_file(&path).unwrap_err(),
            IsoforgeError::Config(ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn state_layout_sits_next_to_the_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, SAMPLE);
        let config = PipelineConfig::load_file(&path).unwrap();
        assert_eq!(config.layout.state_dir, config.project_root.join(".isoforge"));
    }
}
