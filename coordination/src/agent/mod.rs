//! Agent runtime
//!
//! An [`AgentRuntime`] bundles one agent's identity, inbox, subscriptions
//! and per-session bookkeeping, and wires them to the shared bus and
//! blackboard. Decision logic plugs in as a [`MessageHandler`]; text
//! generation as a [`TextGenerator`].
//!
//! # Budget
//!
//! ```text
//!  check_budget ──▶ generate ──▶ record_usage
//!  (used < ceiling)              (words × 1.3, floored)
//! ```
//!
//! The check happens before generating, so a single generation may push
//! usage past the ceiling. The agent is refused only from then on.

pub mod budget;
pub mod generation;
pub mod local;
pub mod observation;
pub mod runtime;
pub mod spec;

pub use budget::{BudgetStatus, TokenEstimator, WordCountEstimator, TOKENS_PER_WORD};
pub use generation::{Blocking, BlockingTextGenerator, GenerationError, TextGenerator};
pub use local::{preview, HistoryEntry, SessionLocal};
pub use observation::Observation;
pub use runtime::{
    kb_size_key, max_confidence_key, AgentError, AgentResult, AgentRuntime, AgentStatus,
    LoopExit, MessageHandler, SessionId, DEFAULT_PREVIEW_CHARS, WRITE_OPERATION,
};
pub use spec::AgentSpec;
