//! Coordination configuration: TOML file plus environment overrides.
//!
//! ```toml
//! inbox_capacity = 64
//! max_rounds = 3
//!
//! [default_agent]
//! token_budget = 4000
//!
//! [agents.critic]
//! token_budget = 1500
//! temperature = 0.2
//! ```
//!
//! Environment variables win over the file:
//! `DEBATE_TOKEN_BUDGET`, `DEBATE_MAX_ROUNDS`, `DEBATE_INBOX_CAPACITY`
//! (`unbounded` or a number), `DEBATE_TEMPERATURE`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::AgentSpec;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

pub const ENV_TOKEN_BUDGET: &str = "DEBATE_TOKEN_BUDGET";
pub const ENV_MAX_ROUNDS: &str = "DEBATE_MAX_ROUNDS";
pub const ENV_INBOX_CAPACITY: &str = "DEBATE_INBOX_CAPACITY";
pub const ENV_TEMPERATURE: &str = "DEBATE_TEMPERATURE";

/// Settings shared by a debate session's bus, agents and state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Inbox capacity; `None` means unbounded.
    pub inbox_capacity: Option<usize>,
    /// Round ceiling for new sessions.
    pub max_rounds: u32,
    /// Characters of generated text kept in history previews.
    pub preview_chars: usize,
    /// Spec for agents without an entry in `agents`.
    pub default_agent: AgentSpec,
    /// Per-agent specs keyed by agent id.
    pub agents: BTreeMap<String, AgentSpec>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: None,
            max_rounds: 2,
            preview_chars: 120,
            default_agent: AgentSpec::default(),
            agents: BTreeMap::new(),
        }
    }
}

impl CoordinationConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&source)?;
        let config = config.with_env_overrides()?;
        config.validate()?;
        debug!(path = %path.display(), agents = config.agents.len(), "Config loaded");
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        if let Some(raw) = lookup(ENV_TOKEN_BUDGET) {
            let budget: u64 = parse_var(ENV_TOKEN_BUDGET, &raw)?;
            self.default_agent.token_budget = budget;
            for spec in self.agents.values_mut() {
                spec.token_budget = budget;
            }
        }
        if let Some(raw) = lookup(ENV_MAX_ROUNDS) {
            self.max_rounds = parse_var(ENV_MAX_ROUNDS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_INBOX_CAPACITY) {
            self.inbox_capacity = if raw.trim().eq_ignore_ascii_case("unbounded") {
                None
            } else {
                Some(parse_var(ENV_INBOX_CAPACITY, &raw)?)
            };
        }
        if let Some(raw) = lookup(ENV_TEMPERATURE) {
            let temperature: f32 = parse_var(ENV_TEMPERATURE, &raw)?;
            self.default_agent.temperature = temperature;
            for spec in self.agents.values_mut() {
                spec.temperature = temperature;
            }
        }
        Ok(self)
    }

    /// Spec for `agent_id`, falling back to `default_agent`.
    pub fn spec_for(&self, agent_id: &str) -> AgentSpec {
        self.agents
            .get(agent_id)
            .unwrap_or(&self.default_agent)
            .clone()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_rounds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.inbox_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "inbox_capacity".to_string(),
                reason: "must be positive (omit for unbounded)".to_string(),
            });
        }
        self.default_agent.validate()?;
        for spec in self.agents.values() {
            spec.validate()?;
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: name.to_string(),
        reason: format!("'{}': {}", raw, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
inbox_capacity = 64
max_rounds = 3

[default_agent]
token_budget = 4000

[agents.critic]
token_budget = 1500
temperature = 0.2
"#;

    #[test]
    fn test_defaults() {
        let config = CoordinationConfig::default();
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.preview_chars, 120);
        assert!(config.inbox_capacity.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = CoordinationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.inbox_capacity, Some(64));
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.spec_for("critic").token_budget, 1500);
        assert_eq!(config.spec_for("critic").temperature, 0.2);
        assert_eq!(config.spec_for("author").token_budget, 4000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = CoordinationConfig::load(file.path()).unwrap();
        assert_eq!(config.agents.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CoordinationConfig::load("/nonexistent/debate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = CoordinationConfig::from_toml_str("max_rounds = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TOKEN_BUDGET, "250"),
            (ENV_MAX_ROUNDS, "5"),
            (ENV_INBOX_CAPACITY, "unbounded"),
        ]
        .into_iter()
        .collect();

        let config = CoordinationConfig::from_toml_str(SAMPLE)
            .unwrap()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_rounds, 5);
        assert!(config.inbox_capacity.is_none());
        assert_eq!(config.spec_for("critic").token_budget, 250);
        assert_eq!(config.spec_for("anyone").token_budget, 250);
    }

    #[test]
    fn test_bad_override_value() {
        let err = CoordinationConfig::default()
            .with_overrides(|name| (name == ENV_MAX_ROUNDS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == ENV_MAX_ROUNDS));
    }

    #[test]
    fn test_validate_rejects_zero_rounds_and_capacity() {
        let config = CoordinationConfig {
            max_rounds: 0,
            ..CoordinationConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CoordinationConfig {
            inbox_capacity: Some(0),
            ..CoordinationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
