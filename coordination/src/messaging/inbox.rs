//! Per-agent FIFO inbox.
//!
//! An [`Inbox`] owns the receiving end of a Tokio mpsc channel; the bus
//! only ever holds [`InboxHandle`]s. Bounded inboxes apply backpressure to
//! publishers, unbounded ones never block.

use tokio::sync::mpsc;

use super::envelope::Message;

#[derive(Debug, Clone)]
enum HandleKind {
    Bounded(mpsc::Sender<Message>),
    Unbounded(mpsc::UnboundedSender<Message>),
}

/// Cloneable sending side of an inbox.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    kind: HandleKind,
}

impl InboxHandle {
    /// Enqueue a message, waiting for room if the inbox is bounded and full.
    ///
    /// Returns the message back if the inbox has been dropped.
    pub async fn deliver(&self, message: Message) -> Result<(), Message> {
        match &self.kind {
            HandleKind::Bounded(tx) => tx.send(message).await.map_err(|e| e.0),
            HandleKind::Unbounded(tx) => tx.send(message).map_err(|e| e.0),
        }
    }

    /// Whether the owning [`Inbox`] has been dropped.
    pub fn is_closed(&self) -> bool {
        match &self.kind {
            HandleKind::Bounded(tx) => tx.is_closed(),
            HandleKind::Unbounded(tx) => tx.is_closed(),
        }
    }

    /// Whether both handles feed the same inbox.
    pub fn same_inbox(&self, other: &InboxHandle) -> bool {
        match (&self.kind, &other.kind) {
            (HandleKind::Bounded(a), HandleKind::Bounded(b)) => a.same_channel(b),
            (HandleKind::Unbounded(a), HandleKind::Unbounded(b)) => a.same_channel(b),
            _ => false,
        }
    }
}

#[derive(Debug)]
enum ReceiverKind {
    Bounded(mpsc::Receiver<Message>),
    Unbounded(mpsc::UnboundedReceiver<Message>),
}

/// Receiving side of an agent's message queue.
#[derive(Debug)]
pub struct Inbox {
    receiver: ReceiverKind,
    handle: InboxHandle,
    capacity: Option<usize>,
}

impl Inbox {
    pub fn unbounded() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            receiver: ReceiverKind::Unbounded(rx),
            handle: InboxHandle {
                kind: HandleKind::Unbounded(tx),
            },
            capacity: None,
        }
    }

    /// Bounded inbox. A capacity of zero is bumped to one.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            receiver: ReceiverKind::Bounded(rx),
            handle: InboxHandle {
                kind: HandleKind::Bounded(tx),
            },
            capacity: Some(capacity),
        }
    }

    /// Bounded when a capacity is given, unbounded otherwise.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Self::unbounded(),
        }
    }

    /// A handle for registering this inbox with a bus.
    pub fn handle(&self) -> InboxHandle {
        self.handle.clone()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Wait for the next message.
    ///
    /// Cancel safe: dropping the future never loses a queued message.
    /// The inbox keeps one handle of its own, so this only returns `None`
    /// after [`Inbox::close`].
    pub async fn recv(&mut self) -> Option<Message> {
        match &mut self.receiver {
            ReceiverKind::Bounded(rx) => rx.recv().await,
            ReceiverKind::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        match &mut self.receiver {
            ReceiverKind::Bounded(rx) => rx.try_recv().ok(),
            ReceiverKind::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Remove and return everything currently queued, oldest first.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut drained = Vec::new();
        while let Some(message) = self.try_recv() {
            drained.push(message);
        }
        drained
    }

    /// Stop accepting new messages; already queued ones stay receivable.
    pub fn close(&mut self) {
        match &mut self.receiver {
            ReceiverKind::Bounded(rx) => rx.close(),
            ReceiverKind::Unbounded(rx) => rx.close(),
        }
    }
}
