//! Observation handed to decision logic.

use serde::{Deserialize, Serialize};

use crate::debate::DebateFeedback;

/// Fixed-shape, read-only view of a session from one agent's seat.
///
/// Combines the shared [`crate::debate::SessionState`], the agent's
/// private [`crate::agent::SessionLocal`] and its
/// [`crate::agent::AgentSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub session_id: String,
    pub agent_id: String,
    pub role: String,

    // Shared session state
    pub prompt: String,
    pub outline: Vec<String>,
    pub draft: String,
    pub critiques: Vec<String>,
    pub feedback_history: Vec<DebateFeedback>,
    pub round: u32,
    pub max_rounds: u32,

    // Agent-local bookkeeping
    pub invited_for: Option<String>,
    pub need_more_sources: bool,
    pub kb_size: u64,
    pub last_confidence: f64,

    // Policy hyperparameters
    pub alpha: f64,
    pub beta: f64,
    pub epsilon: f64,
    pub confidence_threshold: f64,

    /// Ceiling minus tokens already used in this session.
    pub remaining_tokens: u64,
}

impl Observation {
    pub fn is_invited(&self) -> bool {
        self.invited_for.is_some()
    }

    pub fn is_final_round(&self) -> bool {
        self.round >= self.max_rounds
    }

    pub fn budget_exhausted(&self) -> bool {
        self.remaining_tokens == 0
    }

    /// JSON form for policies that take untyped input.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
