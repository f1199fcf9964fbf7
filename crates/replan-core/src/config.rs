//! replan.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplanConfig {
    pub plan: PlanConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Strategy used by `ReconfigurationPlan::result`.
    pub applier: ApplierKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound for a single practical-executor call. `None` waits forever.
    pub task_timeout_ms: Option<u64>,
}

/// The plan applier strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplierKind {
    #[default]
    TimeBased,
    DependencyBased,
    MomentBased,
}

impl FromStr for ApplierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time_based" => Ok(ApplierKind::TimeBased),
            "dependency_based" => Ok(ApplierKind::DependencyBased),
            "moment_based" => Ok(ApplierKind::MomentBased),
            other => anyhow::bail!("unknown applier: {other}"),
        }
    }
}

impl ExecutorConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

impl ReplanConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReplanConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment.
    ///
    /// - `REPLAN_APPLIER`: `time_based`, `dependency_based` or `moment_based`
    /// - `REPLAN_TASK_TIMEOUT_MS`: per-task timeout in milliseconds
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup` (keyed by environment variable name).
    pub fn with_overrides<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(applier) = lookup("REPLAN_APPLIER") {
            self.plan.applier = applier.parse()?;
        }
        if let Some(timeout) = lookup("REPLAN_TASK_TIMEOUT_MS") {
            self.executor.task_timeout_ms = Some(timeout.parse()?);
        }
        Ok(self)
    }
}
