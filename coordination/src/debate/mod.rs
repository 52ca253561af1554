//! Debate session state shared by all participants.
//!
//! ```text
//!  round 0 ──advance──▶ round 1 ──advance──▶ ... ──▶ round max_rounds
//!     │                    │
//!     └─ critiques ──close_round──▶ feedback_history
//! ```
//!
//! [`SessionState`] is the passive record agents observe. Fields several
//! agents contribute to concurrently are mirrored on the blackboard
//! through [`SessionBoard`], which merges rather than overwrites.

pub mod board;
pub mod state;

pub use board::{session_key, BoardError, BoardResult, SessionBoard};
pub use state::{DebateFeedback, RoundError, SessionState};
