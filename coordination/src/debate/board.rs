//! Session board: the blackboard view of a debate session's shared fields.
//!
//! Collections that several agents grow at once (outline, critiques,
//! feedback) live under per-session keys with the list-append reducer, so
//! concurrent contributions are merged instead of overwritten. The round
//! counter uses numeric-max, which keeps it from moving backwards.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::state::{DebateFeedback, RoundError, SessionState};
use crate::agent::SessionId;
use crate::blackboard::{ListAppend, NumericMax, SharedBlackboard};

/// Error type for session board reads
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Blackboard key {key} holds an unexpected value: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Round(#[from] RoundError),
}

/// Result type for session board operations
pub type BoardResult<T> = Result<T, BoardError>;

const OUTLINE: &str = "outline";
const CRITIQUES: &str = "critiques";
const FEEDBACK: &str = "feedback";
const DRAFT: &str = "draft";
const ROUND: &str = "round";

/// Blackboard key for a session field.
pub fn session_key(session_id: &str, field: &str) -> String {
    format!("session:{}:{}", session_id, field)
}

/// Handle for one session's shared fields on a blackboard.
#[derive(Clone)]
pub struct SessionBoard {
    blackboard: SharedBlackboard,
    session_id: SessionId,
}

impl SessionBoard {
    /// Attach to a session, installing its reducers if no one has yet.
    pub fn attach(blackboard: SharedBlackboard, session_id: &str) -> Self {
        for field in [OUTLINE, CRITIQUES, FEEDBACK] {
            blackboard.register_reducer_if_absent(session_key(session_id, field), ListAppend);
        }
        blackboard.register_reducer_if_absent(session_key(session_id, ROUND), NumericMax);
        Self {
            blackboard,
            session_id: session_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn key(&self, field: &str) -> String {
        session_key(&self.session_id, field)
    }

    /// Publish a locally built state as the starting point.
    ///
    /// Overwrites whatever the board held for this session.
    pub fn seed(&self, state: &SessionState) -> BoardResult<()> {
        self.blackboard.set(self.key(OUTLINE), strings(&state.outline));
        self.blackboard.set(self.key(CRITIQUES), strings(&state.critiques));
        self.blackboard
            .set(self.key(FEEDBACK), encode(&self.key(FEEDBACK), &state.feedback_history)?);
        self.blackboard
            .set(self.key(DRAFT), Value::String(state.draft.clone()));
        self.blackboard.set(self.key(ROUND), Value::from(state.round()));
        debug!(session_id = %self.session_id, "Session seeded on blackboard");
        Ok(())
    }

    pub fn append_outline<I, S>(&self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(Into::into).collect();
        self.blackboard.merge(self.key(OUTLINE), strings(&items));
    }

    pub fn add_critique(&self, critique: &str) {
        self.blackboard
            .merge(self.key(CRITIQUES), Value::Array(vec![Value::String(critique.to_string())]));
    }

    pub fn push_feedback(&self, feedback: &DebateFeedback) -> BoardResult<()> {
        let key = self.key(FEEDBACK);
        let entry = encode(&key, feedback)?;
        self.blackboard.merge(key, Value::Array(vec![entry]));
        Ok(())
    }

    /// Replace the draft; the latest writer wins.
    pub fn set_draft(&self, draft: &str) {
        self.blackboard
            .set(self.key(DRAFT), Value::String(draft.to_string()));
    }

    /// Announce a round. Lower numbers than the stored one are ignored.
    pub fn publish_round(&self, round: u32) -> u32 {
        let stored = self.blackboard.merge(self.key(ROUND), Value::from(round));
        stored
            .as_u64()
            .and_then(|r| u32::try_from(r).ok())
            .unwrap_or(round)
    }

    pub fn outline(&self) -> BoardResult<Vec<String>> {
        Ok(self.decode(OUTLINE)?.unwrap_or_default())
    }

    pub fn critiques(&self) -> BoardResult<Vec<String>> {
        Ok(self.decode(CRITIQUES)?.unwrap_or_default())
    }

    pub fn feedback(&self) -> BoardResult<Vec<DebateFeedback>> {
        Ok(self.decode(FEEDBACK)?.unwrap_or_default())
    }

    pub fn draft(&self) -> BoardResult<Option<String>> {
        self.decode(DRAFT)
    }

    pub fn round(&self) -> BoardResult<Option<u32>> {
        self.decode(ROUND)
    }

    /// `base` with every field the board holds for this session applied.
    pub fn materialize(&self, base: &SessionState) -> BoardResult<SessionState> {
        let mut state = base.clone();
        if let Some(outline) = self.decode(OUTLINE)? {
            state.outline = outline;
        }
        if let Some(critiques) = self.decode(CRITIQUES)? {
            state.critiques = critiques;
        }
        if let Some(feedback) = self.decode(FEEDBACK)? {
            state.feedback_history = feedback;
        }
        if let Some(draft) = self.decode(DRAFT)? {
            state.draft = draft;
        }
        if let Some(round) = self.decode::<u32>(ROUND)? {
            if round > state.round() {
                state.sync_round(round)?;
            }
        }
        Ok(state)
    }

    fn decode<T: DeserializeOwned>(&self, field: &str) -> BoardResult<Option<T>> {
        let key = self.key(field);
        match self.blackboard.get_opt(&key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| BoardError::Corrupt { key, source }),
        }
    }
}

fn strings(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> BoardResult<Value> {
    serde_json::to_value(value).map_err(|source| BoardError::Encode {
        key: key.to_string(),
        source,
    })
}
