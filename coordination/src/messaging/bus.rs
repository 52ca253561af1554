//! Message bus for agent coordination
//!
//! Routes each [`Message`] either to one registered agent inbox (direct
//! delivery) or to every inbox subscribed to its topic (broadcast).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::envelope::{AgentId, Message, MessageError};
use super::inbox::InboxHandle;

/// Error type for message bus operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Result type for message bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Shared reference to MessageBus
pub type SharedMessageBus = Arc<MessageBus>;

/// Topic pub/sub plus direct addressing.
///
/// Subscriber lists keep insertion order and are not deduplicated: an
/// inbox subscribed twice to a topic receives two copies.
#[derive(Default)]
pub struct MessageBus {
    /// Topic name -> subscribed inboxes, in delivery order
    topics: RwLock<HashMap<String, Vec<InboxHandle>>>,

    /// Agent id -> its direct inbox
    direct: RwLock<HashMap<AgentId, InboxHandle>>,
}

impl MessageBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedMessageBus {
        Arc::new(self)
    }

    /// Bind the direct inbox for an agent, replacing any previous binding
    pub fn register_inbox(&self, agent_id: impl Into<AgentId>, inbox: InboxHandle) {
        let agent_id = agent_id.into();
        let replaced = self
            .direct
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_id.clone(), inbox)
            .is_some();
        debug!(agent_id, replaced, "Inbox registered");
    }

    /// Remove an agent's direct inbox binding
    ///
    /// Topic subscriptions made with the same inbox are left in place.
    pub fn unregister_inbox(&self, agent_id: &str) -> Option<InboxHandle> {
        self.direct
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_id)
    }

    /// Remove an agent's binding only if it still points at `inbox`
    pub fn release_inbox(&self, agent_id: &str, inbox: &InboxHandle) -> bool {
        let mut direct = self.direct.write().unwrap_or_else(PoisonError::into_inner);
        match direct.get(agent_id) {
            Some(bound) if bound.same_inbox(inbox) => {
                direct.remove(agent_id);
                debug!(agent_id, "Inbox released");
                true
            }
            _ => false,
        }
    }

    /// Append an inbox to a topic's subscriber list
    pub fn subscribe(&self, topic: impl Into<String>, inbox: InboxHandle) {
        let topic = topic.into();
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let subscribers = topics.entry(topic.clone()).or_default();
        subscribers.push(inbox);
        debug!(topic, subscribers = subscribers.len(), "Inbox subscribed");
    }

    /// Remove every subscription of `inbox` to `topic`, returning how many were removed
    pub fn unsubscribe(&self, topic: &str, inbox: &InboxHandle) -> usize {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(topic) else {
            return 0;
        };
        let before = subscribers.len();
        subscribers.retain(|s| !s.same_inbox(inbox));
        let removed = before - subscribers.len();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Publish a message
    ///
    /// With a receiver set, the message goes only to that agent's direct
    /// inbox; an unknown receiver is dropped silently since agents come and
    /// go. Without a receiver, every inbox subscribed to the topic at this
    /// moment gets its own copy. Returns the number of copies enqueued.
    pub async fn publish(&self, message: Message) -> BusResult<usize> {
        message.validate()?;

        if let Some(receiver) = message.receiver() {
            let target = self
                .direct
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(receiver)
                .cloned();

            let Some(inbox) = target else {
                debug!(
                    sender = message.sender(),
                    receiver,
                    topic = message.topic(),
                    "Direct message dropped (unknown receiver)"
                );
                return Ok(0);
            };

            let receiver = receiver.to_string();
            return Ok(match inbox.deliver(message).await {
                Ok(()) => {
                    debug!(receiver, "Direct message delivered");
                    1
                }
                Err(dropped) => {
                    debug!(
                        receiver,
                        topic = dropped.topic(),
                        "Direct message dropped (inbox closed)"
                    );
                    self.release_inbox(&receiver, &inbox);
                    0
                }
            });
        }

        // Snapshot subscribers so later subscriptions don't see this message
        // and no lock is held across an await.
        let subscribers: Vec<InboxHandle> = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message.topic())
            .cloned()
            .unwrap_or_default();

        if subscribers.is_empty() {
            debug!(topic = message.topic(), "Message published (no subscribers)");
            return Ok(0);
        }

        let topic = message.topic().to_string();
        let mut delivered = 0;
        for inbox in &subscribers {
            if inbox.deliver(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        if delivered < subscribers.len() {
            self.prune_closed(&topic);
        }
        debug!(topic, receivers = delivered, "Message published");
        Ok(delivered)
    }

    /// Drop subscriptions whose inbox no longer exists, returning how many were removed
    pub fn prune_closed(&self, topic: &str) -> usize {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(topic) else {
            return 0;
        };
        let before = subscribers.len();
        subscribers.retain(|s| !s.is_closed());
        let removed = before - subscribers.len();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        if removed > 0 {
            debug!(topic, removed, "Closed subscriptions pruned");
        }
        removed
    }

    /// Number of subscriptions on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Whether an agent has a direct inbox registered
    pub fn has_inbox(&self, agent_id: &str) -> bool {
        self.direct
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(agent_id)
    }

    /// Topics with at least one subscription, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, subscribers)| !subscribers.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }
}
