//! Preflight environment checks.
//!
//! `isoforge doctor` answers "will a build start?" without running one:
//! config parse, tool availability under the captured execution context,
//! state-directory writability, an atomic-rename probe, and the privilege
//! requirement.

use camino::Utf8Path;

use isoforge_toolchain::{ExecutionContext, ToolLocator};
use isoforge_utils::atomic_write::write_file_atomic;

use crate::config::PipelineConfig;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One named health check with details.
#[derive(Debug, Clone)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub details: String,
}

impl DoctorCheck {
    fn pass(name: &str, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: details.into(),
        }
    }

    fn warn(name: &str, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: details.into(),
        }
    }

    fn fail(name: &str, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: details.into(),
        }
    }
}

/// Run all checks. Checks are sorted by name for stable output.
pub fn run_checks(config_path: Option<&Utf8Path>) -> Vec<DoctorCheck> {
    let mut checks = Vec::new();

    let config = match PipelineConfig::load(config_path) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_parse",
                format!(
                    "{} phases, {} required tools",
                    config.plan.phases().len(),
                    config.plan.required_tools().len()
                ),
            ));
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck::fail("config_parse", e.to_string()));
            None
        }
    };

    if let Some(config) = &config {
        let ctx = ExecutionContext::capture();

        // Tool checks run against a throwaway locator so doctor never
        // pollutes the persistent cache.
        let mut fallback = config.extra_fallback_dirs.clone();
        fallback.extend(ctx.default_fallback_dirs());
        let mut locator = ToolLocator::new(ctx.clone()).with_fallback_dirs(fallback);
        for tool in config.plan.required_tools() {
            match locator.resolve_name(tool) {
                Ok(path) => {
                    checks.push(DoctorCheck::pass(&format!("tool:{tool}"), path.to_string()));
                }
                Err(e) => {
                    checks.push(DoctorCheck::fail(&format!("tool:{tool}"), e.to_string()));
                }
            }
        }

        checks.push(check_state_dir(config));
        checks.push(check_atomic_rename(config));

        if config.require_root {
            checks.push(if ctx.is_elevated() {
                DoctorCheck::pass("elevation", "running with elevated privileges")
            } else {
                DoctorCheck::warn(
                    "elevation",
                    "pipeline requires root; `isoforge build` will refuse to start",
                )
            });
        } else {
            checks.push(DoctorCheck::pass("elevation", "not required by this pipeline"));
        }
    }

    checks.sort_by(|a, b| a.name.cmp(&b.name));
    checks
}

fn check_state_dir(config: &PipelineConfig) -> DoctorCheck {
    match config.layout.ensure() {
        Ok(()) => DoctorCheck::pass("state_dir", config.layout.state_dir.to_string()),
        Err(e) => DoctorCheck::fail(
            "state_dir",
            format!("cannot create {}: {e}", config.layout.state_dir),
        ),
    }
}

fn check_atomic_rename(config: &PipelineConfig) -> DoctorCheck {
    let probe = config.layout.state_dir.join(".doctor-probe");
    let result = write_file_atomic(&probe, "probe");
    let _ = std::fs::remove_file(&probe);
    match result {
        Ok(()) => DoctorCheck::pass("atomic_rename", "temp-file + rename works in state dir"),
        Err(e) => DoctorCheck::fail("atomic_rename", e.to_string()),
    }
}
