//! Blackboard: shared memory with per-key merge semantics.
//!
//! Agents publish cross-cutting knowledge (knowledge-base sizes, highest
//! confidence seen, accumulated critiques) by merging into well-known keys.
//! How a merge combines old and new values is decided by the [`Reducer`]
//! registered for the key; keys without one are plain overwrite.

pub mod reducers;
pub mod store;

pub use reducers::{FnReducer, ListAppend, NumericMax, NumericSum, Reducer, SetUnion};
pub use store::{Blackboard, SharedBlackboard};
