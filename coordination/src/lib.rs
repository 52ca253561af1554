//! Debate Coordination Library
//!
//! Messaging and shared-state substrate for multi-agent debates:
//! - Immutable message envelopes with field-wise forking
//! - A message bus with topic broadcast and direct delivery
//! - A blackboard whose keys merge through pluggable reducers
//! - An agent runtime with per-session token budgets and observations
//! - Debate session state with round tracking
//!
//! # Example
//!
//! ```rust,ignore
//! use debate_coordination::{AgentRuntime, AgentSpec, Blackboard, MessageBus};
//! use serde_json::{json, Map};
//!
//! let bus = MessageBus::new().shared();
//! let board = Blackboard::new().shared();
//!
//! let author = AgentRuntime::new("author", AgentSpec::default(), bus.clone(), board.clone());
//! let mut critic = AgentRuntime::new("critic", AgentSpec::default(), bus, board);
//! critic.subscribe(["draft"]);
//!
//! author.send("draft", json!("v1"), None, Map::new()).await?;
//! let draft = critic.recv().await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod blackboard;
pub mod config;
pub mod debate;
pub mod messaging;
pub mod telemetry;

// Re-export key messaging types
pub use messaging::{
    AgentId, BusError, BusResult, Inbox, InboxHandle, Message, MessageBus, MessageError,
    MessageOverrides, MessageResult, SharedMessageBus,
};

// Re-export key blackboard types
pub use blackboard::{
    Blackboard, FnReducer, ListAppend, NumericMax, NumericSum, Reducer, SetUnion,
    SharedBlackboard,
};

// Re-export key agent types
pub use agent::{
    AgentError, AgentResult, AgentRuntime, AgentSpec, AgentStatus, LoopExit, MessageHandler,
    Observation, SessionId, SessionLocal, TextGenerator,
};

// Re-export key debate types
pub use debate::{DebateFeedback, SessionBoard, SessionState};

// Re-export configuration types
pub use config::{ConfigError, ConfigResult, CoordinationConfig};
