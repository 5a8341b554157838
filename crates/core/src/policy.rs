use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Frozen policy snapshot consumed by the planner, executor, critic, and RBAC
/// checks. Parsed once at startup; read-only afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySnapshot {
    pub slo: SloPolicy,
    pub execution: ExecutionPolicy,
    pub rbac: RbacPolicy,
    pub data_policy: DataPolicy,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SloPolicy {
    pub max_steps: usize,
    pub max_latency_ms: Option<i64>,
    pub max_retries: u32,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionPolicy {
    pub retry: RetryBackoff,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryBackoff {
    pub base_ms: u64,
    pub max_ms: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RbacPolicy {
    pub roles: RolePolicies,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RolePolicies {
    pub agent: RolePolicy,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RolePolicy {
    pub allow_tools: BTreeSet<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DataPolicy {
    pub redact_fields: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("could not read policies file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse policies file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("policy validation failed: {0}")]
    Validation(String),
}

impl Default for SloPolicy {
    fn default() -> Self {
        Self { max_steps: 16, max_latency_ms: None, max_retries: 2 }
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self { base_ms: 100, max_ms: 1000 }
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self { retry: RetryBackoff::default() }
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        let allow_tools = ["call_rest", "publish_kafka", "transform_json", "open_ticket", "route_jms"]
            .into_iter()
            .map(str::to_string)
            .collect();
        Self { allow_tools }
    }
}

impl Default for RolePolicies {
    fn default() -> Self {
        Self { agent: RolePolicy::default() }
    }
}

impl Default for RbacPolicy {
    fn default() -> Self {
        Self { roles: RolePolicies::default() }
    }
}

impl Default for DataPolicy {
    fn default() -> Self {
        let redact_fields =
            ["ssn", "card_number", "dob", "email", "password", "token", "secret", "api_key"]
                .into_iter()
                .map(str::to_string)
                .collect();
        Self { redact_fields }
    }
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            slo: SloPolicy::default(),
            execution: ExecutionPolicy::default(),
            rbac: RbacPolicy::default(),
            data_policy: DataPolicy::default(),
        }
    }
}

impl PolicySnapshot {
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| PolicyError::ReadFile { path: path.to_path_buf(), source })?;
        let snapshot: Self = toml::from_str(&raw)
            .map_err(|source| PolicyError::ParseFile { path: path.to_path_buf(), source })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Loads the file when a path is given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.slo.max_steps == 0 {
            return Err(PolicyError::Validation(
                "slo.max_steps must be greater than zero".to_string(),
            ));
        }
        if let Some(max_latency_ms) = self.slo.max_latency_ms {
            if max_latency_ms <= 0 {
                return Err(PolicyError::Validation(
                    "slo.max_latency_ms must be greater than zero when set".to_string(),
                ));
            }
        }
        if self.execution.retry.base_ms == 0 {
            return Err(PolicyError::Validation(
                "execution.retry.base_ms must be greater than zero".to_string(),
            ));
        }
        if self.execution.retry.max_ms < self.execution.retry.base_ms {
            return Err(PolicyError::Validation(
                "execution.retry.max_ms must be at least execution.retry.base_ms".to_string(),
            ));
        }
        Ok(())
    }
}
