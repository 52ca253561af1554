//! Messaging substrate for debate agents
//!
//! # Architecture
//!
//! 1. **Envelope** (`envelope.rs`): the immutable [`Message`] and its
//!    fork/override rules.
//!
//! 2. **Inbox** (`inbox.rs`): per-agent FIFO queue with cancel-safe async
//!    receive, bounded (backpressure) or unbounded.
//!
//! 3. **Bus** (`bus.rs`): topic broadcast and direct delivery.
//!
//! # Routing
//!
//! ```text
//!                       receiver set?
//!  ┌──────────┐   yes   ┌─────────────────┐
//!  │ publish  │────────▶│ direct inbox    │  (unknown id: dropped)
//!  └────┬─────┘         └─────────────────┘
//!       │ no
//!       ▼
//!  ┌─────────────────────────────────────┐
//!  │ every inbox subscribed to the topic │  (one copy each, in order)
//!  └─────────────────────────────────────┘
//! ```

pub mod bus;
pub mod envelope;
pub mod inbox;
pub mod topics;

pub use bus::{BusError, BusResult, MessageBus, SharedMessageBus};
pub use envelope::{
    AgentId, Message, MessageError, MessageOverrides, MessageResult, SESSION_ID_KEY,
};
pub use inbox::{Inbox, InboxHandle};
