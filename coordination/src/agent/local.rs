//! Per-session private bookkeeping of one agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a session's interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Operation type, e.g. `write`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Tokens charged for the operation.
    pub tokens: u64,
    /// Leading characters of the generated text.
    pub preview: String,
    pub recorded_at: DateTime<Utc>,
}

/// What an agent privately knows about one debate session.
///
/// Token usage can only grow, and only through [`SessionLocal::charge`],
/// which the owning runtime calls once per generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLocal {
    invited_for: Option<String>,
    need_more_sources: bool,
    kb_size: u64,
    tokens_used: u64,
    last_confidence: f64,
    history: Vec<HistoryEntry>,
}

impl Default for SessionLocal {
    fn default() -> Self {
        Self {
            invited_for: None,
            need_more_sources: true,
            kb_size: 0,
            tokens_used: 0,
            last_confidence: 0.0,
            history: Vec::new(),
        }
    }
}

impl SessionLocal {
    /// Action the agent has been invited to perform, if any.
    pub fn invited_for(&self) -> Option<&str> {
        self.invited_for.as_deref()
    }

    pub fn is_invited(&self) -> bool {
        self.invited_for.is_some()
    }

    pub fn need_more_sources(&self) -> bool {
        self.need_more_sources
    }

    pub fn kb_size(&self) -> u64 {
        self.kb_size
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn last_confidence(&self) -> f64 {
        self.last_confidence
    }

    /// Interaction log, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn invite(&mut self, action: impl Into<String>) {
        self.invited_for = Some(action.into());
    }

    pub fn clear_invitation(&mut self) -> Option<String> {
        self.invited_for.take()
    }

    pub fn set_need_more_sources(&mut self, needed: bool) {
        self.need_more_sources = needed;
    }

    pub fn set_kb_size(&mut self, kb_size: u64) {
        self.kb_size = kb_size;
    }

    pub fn set_last_confidence(&mut self, confidence: f64) {
        self.last_confidence = confidence;
    }

    /// Add `tokens` to the running total and log the operation.
    pub(crate) fn charge(&mut self, kind: &str, tokens: u64, preview: String) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        self.history.push(HistoryEntry {
            kind: kind.to_string(),
            tokens,
            preview,
            recorded_at: Utc::now(),
        });
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
