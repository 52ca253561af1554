//! Message envelope exchanged between agents.
//!
//! A [`Message`] is immutable once built: there are no setters, and the
//! only way to derive a variant is [`Message::fork`], which copies every
//! field into a fresh envelope before applying overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::topics::SHUTDOWN_TOPIC;

/// Agent identifier.
pub type AgentId = String;

/// Metadata key used to tag a message with its debate session.
pub const SESSION_ID_KEY: &str = "session_id";

/// Error type for envelope operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Invalid message from {sender}: {reason}")]
    InvalidMessage { sender: AgentId, reason: String },

    #[error("Invalid override for field '{field}': {reason}")]
    InvalidOverride { field: String, reason: String },
}

/// Result type for envelope operations
pub type MessageResult<T> = Result<T, MessageError>;

/// One unit of communication between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    sender: AgentId,
    topic: String,
    content: Value,
    /// `None` means broadcast on `topic`.
    receiver: Option<AgentId>,
    correlation_id: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl Message {
    /// Build a broadcast message stamped with the current time.
    pub fn new(sender: impl Into<AgentId>, topic: impl Into<String>, content: Value) -> Self {
        Self {
            sender: sender.into(),
            topic: topic.into(),
            content,
            receiver: None,
            correlation_id: None,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Build a message that opens a request/response exchange.
    ///
    /// A fresh correlation id is generated so the eventual reply
    /// (see [`Message::reply`]) can be matched back to this request.
    pub fn request(
        sender: impl Into<AgentId>,
        receiver: impl Into<AgentId>,
        topic: impl Into<String>,
        content: Value,
    ) -> Self {
        Self::new(sender, topic, content)
            .with_receiver(receiver)
            .with_correlation_id(uuid::Uuid::new_v4().to_string())
    }

    /// Control message asking the receiving agent loop to stop.
    pub fn shutdown(sender: impl Into<AgentId>) -> Self {
        Self::new(sender, SHUTDOWN_TOPIC, Value::Null)
    }

    /// Address this message to a single agent.
    pub fn with_receiver(mut self, receiver: impl Into<AgentId>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add one metadata annotation.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replace the whole metadata map.
    pub fn with_metadata_map(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Tag the message with a debate session id.
    pub fn with_session(self, session_id: &str) -> Self {
        self.with_metadata(SESSION_ID_KEY, Value::String(session_id.to_string()))
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn receiver(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Session id carried in metadata, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.metadata.get(SESSION_ID_KEY).and_then(Value::as_str)
    }

    /// Whether the message is routed to a single agent.
    pub fn is_direct(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn is_shutdown(&self) -> bool {
        self.topic == SHUTDOWN_TOPIC
    }

    /// Check the envelope is routable.
    ///
    /// A message needs either a receiver or a non-empty topic.
    pub fn validate(&self) -> MessageResult<()> {
        if self.receiver.is_none() && self.topic.is_empty() {
            return Err(MessageError::InvalidMessage {
                sender: self.sender.clone(),
                reason: "message has neither a receiver nor a topic".to_string(),
            });
        }
        Ok(())
    }

    /// Derive a new message; fields absent from `overrides` are copied.
    pub fn fork(&self, overrides: MessageOverrides) -> Message {
        let mut forked = self.clone();
        if let Some(sender) = overrides.sender {
            forked.sender = sender;
        }
        if let Some(topic) = overrides.topic {
            forked.topic = topic;
        }
        if let Some(content) = overrides.content {
            forked.content = content;
        }
        if let Some(receiver) = overrides.receiver {
            forked.receiver = receiver;
        }
        if let Some(correlation_id) = overrides.correlation_id {
            forked.correlation_id = correlation_id;
        }
        if let Some(created_at) = overrides.created_at {
            forked.created_at = created_at;
        }
        if let Some(metadata) = overrides.metadata {
            forked.metadata = metadata;
        }
        forked
    }

    /// Fork from an untyped field map, e.g. overrides decoded from JSON.
    ///
    /// Unknown field names and values of the wrong shape are rejected with
    /// [`MessageError::InvalidOverride`]; the original is left untouched.
    pub fn fork_with(&self, overrides: &Map<String, Value>) -> MessageResult<Message> {
        Ok(self.fork(MessageOverrides::from_map(overrides)?))
    }

    /// Direct answer to this message's sender, keeping the correlation id.
    pub fn reply(&self, sender: impl Into<AgentId>, content: Value) -> Message {
        self.fork(
            MessageOverrides::new()
                .sender(sender)
                .receiver(self.sender.clone())
                .content(content)
                .created_at(Utc::now()),
        )
    }
}

/// Field overrides applied by [`Message::fork`].
///
/// `receiver` and `correlation_id` are doubly optional: the outer `None`
/// keeps the original value, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageOverrides {
    pub sender: Option<AgentId>,
    pub topic: Option<String>,
    pub content: Option<Value>,
    pub receiver: Option<Option<AgentId>>,
    pub correlation_id: Option<Option<String>>,
    pub created_at: Option<DateTime<Utc>>,
    pub metadata: Option<Map<String, Value>>,
}

impl MessageOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(mut self, sender: impl Into<AgentId>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn receiver(mut self, receiver: impl Into<AgentId>) -> Self {
        self.receiver = Some(Some(receiver.into()));
        self
    }

    /// Turn a direct message back into a topic broadcast.
    pub fn broadcast(mut self) -> Self {
        self.receiver = Some(None);
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(Some(correlation_id.into()));
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Parse overrides from a field-name keyed map.
    pub fn from_map(map: &Map<String, Value>) -> MessageResult<Self> {
        let mut overrides = Self::new();
        for (field, value) in map {
            match field.as_str() {
                "sender" => overrides.sender = Some(expect_string(field, value)?),
                "topic" => overrides.topic = Some(expect_string(field, value)?),
                "content" => overrides.content = Some(value.clone()),
                "receiver" => overrides.receiver = Some(expect_optional_string(field, value)?),
                "correlation_id" => {
                    overrides.correlation_id = Some(expect_optional_string(field, value)?)
                }
                "created_at" => {
                    let created_at = serde_json::from_value::<DateTime<Utc>>(value.clone())
                        .map_err(|e| MessageError::InvalidOverride {
                            field: field.clone(),
                            reason: e.to_string(),
                        })?;
                    overrides.created_at = Some(created_at);
                }
                "metadata" => match value {
                    Value::Object(metadata) => overrides.metadata = Some(metadata.clone()),
                    _ => return Err(wrong_shape(field, "an object")),
                },
                _ => {
                    return Err(MessageError::InvalidOverride {
                        field: field.clone(),
                        reason: "unknown message field".to_string(),
                    })
                }
            }
        }
        Ok(overrides)
    }
}

fn expect_string(field: &str, value: &Value) -> MessageResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_shape(field, "a string"))
}

fn expect_optional_string(field: &str, value: &Value) -> MessageResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(wrong_shape(field, "a string or null")),
    }
}

fn wrong_shape(field: &str, expected: &str) -> MessageError {
    MessageError::InvalidOverride {
        field: field.to_string(),
        reason: format!("expected {}", expected),
    }
}
