//! Agent resource specification: token budget, sampling, policy knobs.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};

/// Resources and hyperparameters granted to one agent.
///
/// Every field has a default, so a TOML table only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSpec {
    /// Token ceiling per session.
    pub token_budget: u64,
    /// Context window of the backing model.
    pub context_capacity: u64,
    pub cost_per_1k_tokens: f64,

    // Policy hyperparameters
    pub alpha: f64,
    pub beta: f64,
    /// Exploration rate, in [0, 1].
    pub epsilon: f64,
    pub confidence_threshold: f64,

    /// Generation rate hint; also the default `max_tokens` per generation.
    pub gen_rate_hint: u32,
    pub toolset: Vec<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub do_sample: bool,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            token_budget: 8_000,
            context_capacity: 32_000,
            cost_per_1k_tokens: 0.0,
            alpha: 1.0,
            beta: 1.0,
            epsilon: 0.05,
            confidence_threshold: 0.6,
            gen_rate_hint: 180,
            toolset: vec!["search".to_string(), "summarize".to_string()],
            temperature: 0.7,
            top_p: 0.9,
            do_sample: true,
        }
    }
}

impl AgentSpec {
    /// Spec with a different token ceiling.
    pub fn with_token_budget(mut self, token_budget: u64) -> Self {
        self.token_budget = token_budget;
        self
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.toolset.iter().any(|t| t == tool)
    }

    /// Cost of `tokens` at this spec's rate.
    pub fn cost_of(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k_tokens
    }

    /// Reject values no agent could run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.temperature < 0.0 {
            return Err(invalid("temperature", format!("{} is negative", self.temperature)));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid("top_p", format!("{} is outside [0, 1]", self.top_p)));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(invalid("epsilon", format!("{} is outside [0, 1]", self.epsilon)));
        }
        if self.cost_per_1k_tokens < 0.0 {
            return Err(invalid(
                "cost_per_1k_tokens",
                format!("{} is negative", self.cost_per_1k_tokens),
            ));
        }
        if self.gen_rate_hint == 0 {
            return Err(invalid("gen_rate_hint", "must be positive".to_string()));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}
