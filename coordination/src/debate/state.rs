//! Debate session state: prompt, working text, critiques and round tracking.

use serde::{Deserialize, Serialize};

use crate::agent::SessionId;

/// Outcome of a single debate round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateFeedback {
    /// Round the feedback belongs to.
    pub round: u32,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
    /// Critiques raised during the round, in arrival order.
    #[serde(default)]
    pub critiques: Vec<String>,
}

impl DebateFeedback {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            score: 0.0,
            reasoning: String::new(),
            critiques: Vec::new(),
        }
    }
}

/// Error for invalid round movements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("session {session_id} is already at its final round {max_rounds}")]
    LimitReached { session_id: SessionId, max_rounds: u32 },

    #[error("session {session_id}: round {requested} is outside {current}..={max_rounds}")]
    OutOfRange {
        session_id: SessionId,
        requested: u32,
        current: u32,
        max_rounds: u32,
    },
}

/// Shared record of one debate session.
///
/// Text fields are plain data. `round` only moves forward and never passes
/// `max_rounds`; it changes through [`SessionState::advance_round`] or
/// [`SessionState::sync_round`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub prompt: String,
    pub outline: Vec<String>,
    pub draft: String,
    /// Critiques of the round in progress.
    pub critiques: Vec<String>,
    /// Closed rounds, oldest first.
    pub feedback_history: Vec<DebateFeedback>,
    round: u32,
    max_rounds: u32,
}

impl SessionState {
    /// Create a new session at round 0.
    pub fn new(session_id: &str, prompt: &str, max_rounds: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            outline: Vec::new(),
            draft: String::new(),
            critiques: Vec::new(),
            feedback_history: Vec::new(),
            round: 0,
            max_rounds,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Whether more rounds are available.
    pub fn has_rounds_remaining(&self) -> bool {
        self.round < self.max_rounds
    }

    /// Move to the next round.
    pub fn advance_round(&mut self) -> Result<u32, RoundError> {
        if !self.has_rounds_remaining() {
            return Err(RoundError::LimitReached {
                session_id: self.session_id.clone(),
                max_rounds: self.max_rounds,
            });
        }
        self.round += 1;
        Ok(self.round)
    }

    /// Catch up with a round number observed elsewhere.
    ///
    /// Accepts any value between the current round and the ceiling.
    pub fn sync_round(&mut self, round: u32) -> Result<(), RoundError> {
        if round < self.round || round > self.max_rounds {
            return Err(RoundError::OutOfRange {
                session_id: self.session_id.clone(),
                requested: round,
                current: self.round,
                max_rounds: self.max_rounds,
            });
        }
        self.round = round;
        Ok(())
    }

    /// Turn the pending critiques into the current round's feedback record.
    pub fn close_round(&mut self, score: f64, reasoning: &str) -> &DebateFeedback {
        let feedback = DebateFeedback {
            round: self.round,
            score,
            reasoning: reasoning.to_string(),
            critiques: std::mem::take(&mut self.critiques),
        };
        self.feedback_history.push(feedback);
        &self.feedback_history[self.feedback_history.len() - 1]
    }

    pub fn latest_feedback(&self) -> Option<&DebateFeedback> {
        self.feedback_history.last()
    }

    /// Every critique, closed rounds first, then the pending ones.
    pub fn all_critiques(&self) -> Vec<String> {
        self.feedback_history
            .iter()
            .flat_map(|f| f.critiques.iter().cloned())
            .chain(self.critiques.iter().cloned())
            .collect()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | outline {} | draft {} chars | {} rounds closed",
            self.session_id,
            self.round,
            self.max_rounds,
            self.outline.len(),
            self.draft.chars().count(),
            self.feedback_history.len()
        )
    }
}
