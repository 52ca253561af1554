//! Agent runtime: identity, inbox, budget and per-session bookkeeping.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::budget::{BudgetStatus, TokenEstimator, WordCountEstimator};
use super::generation::{GenerationError, TextGenerator};
use super::local::{preview, SessionLocal};
use super::observation::Observation;
use super::spec::AgentSpec;
use crate::blackboard::{NumericMax, SharedBlackboard};
use crate::config::CoordinationConfig;
use crate::debate::SessionState;
use crate::messaging::{AgentId, BusError, Inbox, Message, SharedMessageBus};
use crate::telemetry;

/// Session identifier.
pub type SessionId = String;

/// Operation type logged for generated text.
pub const WRITE_OPERATION: &str = "write";

/// Characters of generated text kept in a history entry by default.
pub const DEFAULT_PREVIEW_CHARS: usize = 120;

/// Error type for agent operations
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {agent_id} exhausted its token budget in session {session_id} ({used}/{budget} tokens)")]
    BudgetExceeded {
        agent_id: AgentId,
        session_id: SessionId,
        used: u64,
        budget: u64,
    },

    #[error("Agent {0} has no text generator")]
    NoGenerator(AgentId),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentStatus {
    /// Created, loop not started.
    Idle,
    /// Inside [`AgentRuntime::run`].
    Running,
    /// Loop has returned.
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why an agent loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopExit {
    /// The running flag was cleared.
    Cancelled,
    /// A shutdown message arrived in the inbox.
    Shutdown,
    /// The inbox was closed and emptied.
    InboxClosed,
}

impl std::fmt::Display for LoopExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::InboxClosed => write!(f, "inbox_closed"),
        }
    }
}

/// Decision logic plugged into [`AgentRuntime::run`].
#[async_trait]
pub trait MessageHandler: Send {
    /// React to one inbox message. Errors are logged and the loop continues.
    async fn handle(&mut self, agent: &mut AgentRuntime, message: Message) -> AgentResult<()>;
}

/// Blackboard key mirroring an agent's knowledge-base size in a session.
pub fn kb_size_key(agent_id: &str, session_id: &str) -> String {
    format!("kb:{}:{}:size", agent_id, session_id)
}

/// Blackboard key holding the highest confidence reported in a session.
pub fn max_confidence_key(session_id: &str) -> String {
    format!("confidence:{}:max", session_id)
}

/// One agent's runtime container.
///
/// Owns its inbox and its per-session [`SessionLocal`] records outright;
/// only the bus and the blackboard are shared with other agents.
pub struct AgentRuntime {
    id: AgentId,
    role: String,
    spec: AgentSpec,
    bus: SharedMessageBus,
    blackboard: SharedBlackboard,
    inbox: Inbox,
    topics: BTreeSet<String>,
    sessions: HashMap<SessionId, SessionLocal>,
    estimator: Box<dyn TokenEstimator>,
    generator: Option<Arc<dyn TextGenerator>>,
    running: CancellationToken,
    status: AgentStatus,
    peers: Vec<AgentId>,
    reward_accum: f64,
    current_action: Option<String>,
    preview_chars: usize,
}

impl AgentRuntime {
    /// Create an agent with an unbounded inbox registered on `bus`.
    pub fn new(
        id: impl Into<AgentId>,
        spec: AgentSpec,
        bus: SharedMessageBus,
        blackboard: SharedBlackboard,
    ) -> Self {
        Self::with_inbox(id, spec, bus, blackboard, Inbox::unbounded())
    }

    /// Create an agent around an existing inbox and register it on `bus`.
    pub fn with_inbox(
        id: impl Into<AgentId>,
        spec: AgentSpec,
        bus: SharedMessageBus,
        blackboard: SharedBlackboard,
        inbox: Inbox,
    ) -> Self {
        let id = id.into();
        bus.register_inbox(id.clone(), inbox.handle());
        Self {
            id,
            role: "participant".to_string(),
            spec,
            bus,
            blackboard,
            inbox,
            topics: BTreeSet::new(),
            sessions: HashMap::new(),
            estimator: Box::new(WordCountEstimator::default()),
            generator: None,
            running: CancellationToken::new(),
            status: AgentStatus::Idle,
            peers: Vec::new(),
            reward_accum: 0.0,
            current_action: None,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    /// Create an agent using its spec, inbox capacity and preview length from `config`.
    pub fn from_config(
        id: impl Into<AgentId>,
        config: &CoordinationConfig,
        bus: SharedMessageBus,
        blackboard: SharedBlackboard,
    ) -> Self {
        let id = id.into();
        let spec = config.spec_for(&id);
        let inbox = Inbox::with_capacity(config.inbox_capacity);
        let mut agent = Self::with_inbox(id, spec, bus, blackboard, inbox);
        agent.preview_chars = config.preview_chars;
        agent
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_estimator(mut self, estimator: impl TokenEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    // =========================================================================
    // Identity and lifecycle
    // =========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn blackboard(&self) -> &SharedBlackboard {
        &self.blackboard
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    /// Token that stops [`AgentRuntime::run`] when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.running.clone()
    }

    /// Clear the running flag. A stopped agent's loop cannot be restarted.
    pub fn stop(&self) {
        self.running.cancel();
    }

    pub fn peers(&self) -> &[AgentId] {
        &self.peers
    }

    pub fn add_peer(&mut self, peer: impl Into<AgentId>) {
        let peer = peer.into();
        if peer != self.id && !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
    }

    pub fn reward(&self) -> f64 {
        self.reward_accum
    }

    pub fn add_reward(&mut self, reward: f64) {
        self.reward_accum += reward;
    }

    pub fn current_action(&self) -> Option<&str> {
        self.current_action.as_deref()
    }

    pub fn set_current_action(&mut self, action: Option<String>) {
        self.current_action = action;
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Subscribe to topics. Topics already subscribed are skipped.
    ///
    /// Returns how many new subscriptions were made.
    pub fn subscribe<I, S>(&mut self, topics: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for topic in topics {
            let topic = topic.as_ref();
            if self.topics.insert(topic.to_string()) {
                self.bus.subscribe(topic, self.inbox.handle());
                added += 1;
            }
        }
        if added > 0 {
            debug!(agent_id = %self.id, added, "Subscribed to topics");
        }
        added
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Publish a message from this agent. Returns the number of copies enqueued.
    pub async fn send(
        &self,
        topic: &str,
        content: Value,
        receiver: Option<&str>,
        metadata: Map<String, Value>,
    ) -> AgentResult<usize> {
        let mut message = Message::new(self.id.clone(), topic, content).with_metadata_map(metadata);
        if let Some(receiver) = receiver {
            message = message.with_receiver(receiver);
        }
        self.publish(message).await
    }

    /// Publish a prepared message, e.g. a fork or reply.
    pub async fn publish(&self, message: Message) -> AgentResult<usize> {
        let topic = message.topic().to_string();
        let delivered = self.bus.publish(message).await?;
        debug!(agent_id = %self.id, topic = %topic, delivered, "Message sent");
        Ok(delivered)
    }

    /// Wait for the next inbox message.
    ///
    /// Cancel safe; wrap in `tokio::time::timeout` to bound the wait.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.inbox.try_recv()
    }

    /// Everything queued in the inbox, oldest first.
    pub fn drain_inbox(&mut self) -> Vec<Message> {
        self.inbox.drain()
    }

    /// Process inbox messages until stopped.
    ///
    /// Handler errors and panics are logged and do not end the loop.
    /// Messages still queued when the loop ends stay in the inbox.
    pub async fn run<H: MessageHandler + ?Sized>(&mut self, handler: &mut H) -> LoopExit {
        let span = telemetry::agent_loop_span(&self.id, &self.role);
        self.run_loop(handler).instrument(span).await
    }

    async fn run_loop<H: MessageHandler + ?Sized>(&mut self, handler: &mut H) -> LoopExit {
        self.status = AgentStatus::Running;
        info!(agent_id = %self.id, role = %self.role, "Agent loop started");

        let exit = loop {
            let received = tokio::select! {
                biased;
                _ = self.running.cancelled() => break LoopExit::Cancelled,
                received = self.inbox.recv() => received,
            };
            let Some(message) = received else {
                break LoopExit::InboxClosed;
            };
            if message.is_shutdown() {
                break LoopExit::Shutdown;
            }

            let topic = message.topic().to_string();
            let outcome = AssertUnwindSafe(handler.handle(self, message))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(agent_id = %self.id, topic = %topic, error = %e, "Handler failed");
                }
                Err(panic) => {
                    error!(
                        agent_id = %self.id,
                        topic = %topic,
                        panic = panic_message(panic.as_ref()),
                        "Handler panicked"
                    );
                }
            }
        };

        self.status = AgentStatus::Stopped;
        info!(agent_id = %self.id, exit = %exit, "Agent loop stopped");
        exit
    }

    /// Leave the bus and return whatever was still queued.
    ///
    /// Clears the running flag, drops this agent's subscriptions and its
    /// direct binding (unless another inbox has since taken the id), then
    /// closes and drains the inbox.
    pub fn shutdown(&mut self) -> Vec<Message> {
        self.stop();
        self.leave_bus();
        self.inbox.close();
        let pending = self.inbox.drain();
        self.status = AgentStatus::Stopped;
        info!(agent_id = %self.id, pending = pending.len(), "Agent shut down");
        pending
    }

    fn leave_bus(&mut self) {
        let handle = self.inbox.handle();
        for topic in std::mem::take(&mut self.topics) {
            self.bus.unsubscribe(&topic, &handle);
        }
        self.bus.release_inbox(&self.id, &handle);
    }

    // =========================================================================
    // Sessions, budget and observation
    // =========================================================================

    /// Local record for a session, if one exists.
    pub fn session(&self, session_id: &str) -> Option<&SessionLocal> {
        self.sessions.get(session_id)
    }

    /// Local record for a session, created on first access.
    pub fn session_mut(&mut self, session_id: &str) -> &mut SessionLocal {
        self.sessions.entry(session_id.to_string()).or_default()
    }

    pub fn budget_status(&self, session_id: &str) -> BudgetStatus {
        BudgetStatus {
            used: self.sessions.get(session_id).map_or(0, SessionLocal::tokens_used),
            ceiling: self.spec.token_budget,
        }
    }

    /// Whether another generation may start in this session.
    pub fn check_budget(&self, session_id: &str) -> bool {
        self.budget_status(session_id).allows_generation()
    }

    /// [`AgentRuntime::check_budget`] as a `Result`, for budget-gated actions.
    pub fn ensure_budget(&self, session_id: &str) -> AgentResult<()> {
        let status = self.budget_status(session_id);
        if status.allows_generation() {
            return Ok(());
        }
        warn!(agent_id = %self.id, session_id, budget = %status, "Token budget exhausted");
        Err(AgentError::BudgetExceeded {
            agent_id: self.id.clone(),
            session_id: session_id.to_string(),
            used: status.used,
            budget: status.ceiling,
        })
    }

    /// Charge a completed generation to the session.
    ///
    /// Call exactly once per generation. Returns the tokens charged.
    pub fn record_usage(&mut self, session_id: &str, generated_text: &str) -> u64 {
        let tokens = self.estimator.estimate(generated_text);
        let preview = preview(generated_text, self.preview_chars);
        let agent_id = self.id.clone();
        let local = self.session_mut(session_id);
        local.charge(WRITE_OPERATION, tokens, preview);
        debug!(
            agent_id = %agent_id,
            session_id,
            tokens,
            total = local.tokens_used(),
            "Usage recorded"
        );
        tokens
    }

    /// Estimated spend in this session at the agent's per-1k rate.
    pub fn estimated_cost(&self, session_id: &str) -> f64 {
        self.spec.cost_of(self.budget_status(session_id).used)
    }

    /// Generate text through the configured backend, then charge it.
    ///
    /// `temperature` and `max_tokens` default to [`AgentSpec::temperature`]
    /// and `gen_rate_hint`.
    pub async fn write(
        &mut self,
        session_id: &str,
        prompt: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> AgentResult<String> {
        self.ensure_budget(session_id)?;
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| AgentError::NoGenerator(self.id.clone()))?;

        let temperature = temperature.unwrap_or(self.spec.temperature);
        let max_tokens = max_tokens.unwrap_or(self.spec.gen_rate_hint);
        let span = telemetry::generation_span(&self.id, session_id, max_tokens);
        let started = Instant::now();
        let result = generator
            .generate(prompt, temperature, max_tokens)
            .instrument(span.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                telemetry::record_generation_result(&span, false, elapsed_ms, 0);
                return Err(e.into());
            }
        };
        let tokens = self.record_usage(session_id, &text);
        telemetry::record_generation_result(&span, true, elapsed_ms, tokens);
        Ok(text)
    }

    /// Update the knowledge-base size and mirror it on the blackboard.
    pub fn record_kb_size(&mut self, session_id: &str, kb_size: u64) {
        self.session_mut(session_id).set_kb_size(kb_size);
        let key = kb_size_key(&self.id, session_id);
        self.blackboard
            .register_reducer_if_absent(key.clone(), NumericMax);
        self.blackboard.merge(key, Value::from(kb_size));
    }

    /// Record this agent's confidence; returns the session-wide maximum.
    pub fn record_confidence(&mut self, session_id: &str, confidence: f64) -> f64 {
        self.session_mut(session_id).set_last_confidence(confidence);
        let key = max_confidence_key(session_id);
        self.blackboard
            .register_reducer_if_absent(key.clone(), NumericMax);
        self.blackboard
            .merge(key, Value::from(confidence))
            .as_f64()
            .unwrap_or(confidence)
    }

    /// Read-only snapshot for decision logic.
    ///
    /// Does not create a session record; an unseen session reads as fresh.
    pub fn build_observation(&self, session_id: &str, state: &SessionState) -> Observation {
        let fresh = SessionLocal::default();
        let local = self.sessions.get(session_id).unwrap_or(&fresh);

        Observation {
            session_id: session_id.to_string(),
            agent_id: self.id.clone(),
            role: self.role.clone(),
            prompt: state.prompt.clone(),
            outline: state.outline.clone(),
            draft: state.draft.clone(),
            critiques: state.critiques.clone(),
            feedback_history: state.feedback_history.clone(),
            round: state.round(),
            max_rounds: state.max_rounds(),
            invited_for: local.invited_for().map(str::to_string),
            need_more_sources: local.need_more_sources(),
            kb_size: local.kb_size(),
            last_confidence: local.last_confidence(),
            alpha: self.spec.alpha,
            beta: self.spec.beta,
            epsilon: self.spec.epsilon,
            confidence_threshold: self.spec.confidence_threshold,
            remaining_tokens: self.spec.token_budget.saturating_sub(local.tokens_used()),
        }
    }
}

impl Drop for AgentRuntime {
    fn drop(&mut self) {
        self.leave_bus();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::messaging::MessageBus;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn agent(id: &str, budget: u64) -> AgentRuntime {
        AgentRuntime::new(
            id,
            AgentSpec::default().with_token_budget(budget),
            MessageBus::new().shared(),
            Blackboard::new().shared(),
        )
    }

    fn pair() -> (AgentRuntime, AgentRuntime) {
        let bus = MessageBus::new().shared();
        let bb = Blackboard::new().shared();
        let author = AgentRuntime::new("author", AgentSpec::default(), bus.clone(), bb.clone())
            .with_role("author");
        let critic = AgentRuntime::new("critic", AgentSpec::default(), bus, bb).with_role("critic");
        (author, critic)
    }

    struct Scripted(Mutex<Vec<String>>);

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _: &str, _: f32, _: u32) -> Result<String, GenerationError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| GenerationError::new("script exhausted"))
        }
    }

    struct CharEstimator;

    impl TokenEstimator for CharEstimator {
        fn estimate(&self, text: &str) -> u64 {
            text.len() as u64
        }

        fn name(&self) -> &str {
            "chars"
        }
    }

    #[test]
    fn test_budget_accounting() {
        let mut agent = agent("author", 100);
        assert!(agent.check_budget("S1"));

        assert_eq!(agent.record_usage("S1", &words(47)), 61);
        assert!(agent.check_budget("S1"));
        assert_eq!(agent.record_usage("S1", &words(39)), 50);
        assert!(!agent.check_budget("S1"));

        let local = agent.session("S1").unwrap();
        assert_eq!(local.tokens_used(), 111);
        assert_eq!(local.history().len(), 2);
        assert_eq!(local.history()[0].tokens, 61);
        assert_eq!(local.history()[1].tokens, 50);
        assert_eq!(local.history()[0].kind, WRITE_OPERATION);
    }

    #[test]
    fn test_budget_with_exact_estimates() {
        let mut agent = agent("author", 100).with_estimator(CharEstimator);
        agent.record_usage("S1", &"x".repeat(60));
        agent.record_usage("S1", &"y".repeat(50));
        assert!(!agent.check_budget("S1"));
        assert_eq!(agent.session("S1").unwrap().history().len(), 2);

        let err = agent.ensure_budget("S1").unwrap_err();
        assert!(matches!(
            err,
            AgentError::BudgetExceeded { used: 110, budget: 100, .. }
        ));
    }

    #[test]
    fn test_budget_is_per_session() {
        let mut agent = agent("author", 10).with_estimator(CharEstimator);
        agent.record_usage("S1", &"x".repeat(10));
        assert!(!agent.check_budget("S1"));
        assert!(agent.check_budget("S2"));
    }

    #[test]
    fn test_history_preview_truncated() {
        let mut agent = agent("author", 1000);
        let long = "a".repeat(300);
        agent.record_usage("S1", &long);
        assert_eq!(
            agent.session("S1").unwrap().history()[0].preview.len(),
            DEFAULT_PREVIEW_CHARS
        );
    }

    #[test]
    fn test_build_observation_is_pure() {
        let mut agent = agent("critic", 100).with_role("critic");
        let mut state = SessionState::new("S1", "Is Rust fun?", 2);
        state.outline.push("intro".to_string());
        state.draft = "v1".to_string();
        state.advance_round().unwrap();

        let obs = agent.build_observation("S1", &state);
        assert!(agent.session("S1").is_none());
        assert_eq!(obs.remaining_tokens, 100);
        assert_eq!(obs.round, 1);
        assert_eq!(obs.max_rounds, 2);
        assert_eq!(obs.outline, vec!["intro"]);
        assert_eq!(obs.role, "critic");
        assert!(obs.need_more_sources);
        assert!(!obs.is_invited());

        agent.session_mut("S1").invite("critique");
        agent.session_mut("S1").set_need_more_sources(false);
        agent.record_usage("S1", &words(10));
        let obs = agent.build_observation("S1", &state);
        assert_eq!(obs.remaining_tokens, 87);
        assert_eq!(obs.invited_for.as_deref(), Some("critique"));
        assert!(!obs.need_more_sources);
        assert_eq!(obs.epsilon, 0.05);
    }

    #[test]
    fn test_remaining_budget_saturates() {
        let mut agent = agent("author", 5).with_estimator(CharEstimator);
        agent.record_usage("S1", "0123456789");
        let obs = agent.build_observation("S1", &SessionState::new("S1", "p", 1));
        assert_eq!(obs.remaining_tokens, 0);
        assert!(obs.budget_exhausted());
    }

    #[tokio::test]
    async fn test_default_subscriptions_hear_debate_chatter() {
        let (author, mut critic) = pair();
        let topics = crate::messaging::topics::default_subscriptions();
        assert_eq!(critic.subscribe(topics.iter().copied()), topics.len());

        author
            .send(crate::messaging::topics::DEBATE_TOPIC, json!("hello"), None, Map::new())
            .await
            .unwrap();
        assert_eq!(critic.drain_inbox().len(), 1);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let (_, mut critic) = pair();
        assert_eq!(critic.subscribe(["draft", "critique"]), 2);
        assert_eq!(critic.subscribe(["draft"]), 0);
        assert_eq!(critic.bus.subscriber_count("draft"), 1);
        assert!(critic.is_subscribed("critique"));
    }

    #[tokio::test]
    async fn test_send_broadcast_and_direct() {
        let (author, mut critic) = pair();
        critic.subscribe(["draft"]);

        let delivered = author
            .send("draft", json!("v1"), None, Map::new())
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        let mut meta = Map::new();
        meta.insert("session_id".to_string(), json!("S1"));
        author
            .send("moderator_cmd", json!("please critique"), Some("critic"), meta)
            .await
            .unwrap();

        let first = critic.try_recv().unwrap();
        assert_eq!(first.sender(), "author");
        assert!(first.receiver().is_none());
        let second = critic.try_recv().unwrap();
        assert_eq!(second.receiver(), Some("critic"));
        assert_eq!(second.session_id(), Some("S1"));
    }

    #[tokio::test]
    async fn test_send_malformed_fails() {
        let (author, _) = pair();
        let err = author.send("", json!(1), None, Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::Bus(_)));
    }

    #[tokio::test]
    async fn test_write_charges_usage() {
        let generator = Arc::new(Scripted(Mutex::new(vec![words(20)])));
        let mut agent = agent("author", 100).with_generator(generator);

        let text = agent.write("S1", "draft it", None, None).await.unwrap();
        assert_eq!(text, words(20));
        assert_eq!(agent.session("S1").unwrap().tokens_used(), 26);
    }

    #[tokio::test]
    async fn test_write_refused_when_exhausted() {
        let generator = Arc::new(Scripted(Mutex::new(vec![words(5)])));
        let mut agent = agent("author", 10)
            .with_generator(generator)
            .with_estimator(CharEstimator);
        agent.record_usage("S1", &"x".repeat(10));

        let err = agent.write("S1", "more", None, None).await.unwrap_err();
        assert!(matches!(err, AgentError::BudgetExceeded { .. }));
        assert_eq!(agent.session("S1").unwrap().history().len(), 1);
    }

    #[tokio::test]
    async fn test_write_without_generator() {
        let mut agent = agent("author", 10);
        let err = agent.write("S1", "p", None, None).await.unwrap_err();
        assert!(matches!(err, AgentError::NoGenerator(id) if id == "author"));
    }

    #[tokio::test]
    async fn test_generation_failure_charges_nothing() {
        let generator = Arc::new(Scripted(Mutex::new(Vec::new())));
        let mut agent = agent("author", 10).with_generator(generator);
        let err = agent.write("S1", "p", Some(0.1), Some(5)).await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
        assert!(agent.session("S1").is_none());
    }

    #[test]
    fn test_kb_size_and_confidence_mirrors() {
        let (mut author, mut critic) = pair();
        author.record_kb_size("S1", 4);
        author.record_kb_size("S1", 2);
        assert_eq!(author.session("S1").unwrap().kb_size(), 2);
        assert_eq!(
            author.blackboard().get(&kb_size_key("author", "S1"), json!(0)),
            json!(4)
        );

        assert_eq!(author.record_confidence("S1", 0.4), 0.4);
        assert_eq!(critic.record_confidence("S1", 0.9), 0.9);
        assert_eq!(author.record_confidence("S1", 0.5), 0.9);
        assert_eq!(author.session("S1").unwrap().last_confidence(), 0.5);
    }

    #[test]
    fn test_cost_and_peers() {
        let mut agent = AgentRuntime::new(
            "author",
            AgentSpec {
                cost_per_1k_tokens: 1.0,
                ..AgentSpec::default()
            },
            MessageBus::new().shared(),
            Blackboard::new().shared(),
        )
        .with_estimator(CharEstimator);
        agent.record_usage("S1", &"x".repeat(500));
        assert!((agent.estimated_cost("S1") - 0.5).abs() < 1e-9);

        agent.add_peer("critic");
        agent.add_peer("critic");
        agent.add_peer("author");
        assert_eq!(agent.peers(), ["critic".to_string()]);

        agent.add_reward(0.5);
        agent.add_reward(0.25);
        assert_eq!(agent.reward(), 0.75);
    }

    struct Recorder {
        seen: Vec<String>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&mut self, agent: &mut AgentRuntime, message: Message) -> AgentResult<()> {
            let content = message.content().as_str().unwrap_or_default().to_string();
            if self.fail_on.as_deref() == Some(content.as_str()) {
                return Err(AgentError::Handler(format!("cannot handle {}", content)));
            }
            agent.set_current_action(Some(format!("read {}", content)));
            self.seen.push(content);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_until_shutdown_isolates_failures() {
        let (author, mut critic) = pair();
        critic.subscribe(["draft"]);
        for text in ["v1", "bad", "v2"] {
            author.send("draft", json!(text), None, Map::new()).await.unwrap();
        }
        author.publish(Message::shutdown("author").with_receiver("critic")).await.unwrap();
        author.send("draft", json!("after"), None, Map::new()).await.unwrap();

        let mut handler = Recorder {
            seen: Vec::new(),
            fail_on: Some("bad".to_string()),
        };
        let exit = critic.run(&mut handler).await;

        assert_eq!(exit, LoopExit::Shutdown);
        assert_eq!(handler.seen, vec!["v1", "v2"]);
        assert_eq!(critic.status(), AgentStatus::Stopped);
        assert_eq!(critic.current_action(), Some("read v2"));
        // Messages behind the shutdown marker stay queued.
        assert_eq!(critic.drain_inbox().len(), 1);
    }

    struct Fragile {
        seen: Vec<String>,
    }

    #[async_trait]
    impl MessageHandler for Fragile {
        async fn handle(&mut self, _: &mut AgentRuntime, message: Message) -> AgentResult<()> {
            let content = message.content().as_str().unwrap_or_default().to_string();
            if content == "boom" {
                panic!("cannot parse {}", content);
            }
            self.seen.push(content);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_survives_handler_panic() {
        let (author, mut critic) = pair();
        critic.subscribe(["draft"]);
        for text in ["v1", "boom", "v2"] {
            author.send("draft", json!(text), None, Map::new()).await.unwrap();
        }
        author.publish(Message::shutdown("author").with_receiver("critic")).await.unwrap();
        author.send("draft", json!("after"), None, Map::new()).await.unwrap();

        let mut handler = Fragile { seen: Vec::new() };
        let exit = critic.run(&mut handler).await;

        assert_eq!(exit, LoopExit::Shutdown);
        assert_eq!(handler.seen, vec!["v1", "v2"]);
        assert_eq!(critic.drain_inbox().len(), 1);
    }

    #[test]
    fn test_panic_message() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_dropped_agents_leave_the_bus() {
        let bus = MessageBus::new().shared();
        let bb = Blackboard::new().shared();
        let agents: Vec<AgentRuntime> = (0..100)
            .map(|i| {
                let mut agent = AgentRuntime::new(
                    format!("critic-{}", i),
                    AgentSpec::default(),
                    bus.clone(),
                    bb.clone(),
                );
                agent.subscribe(["draft", "critique"]);
                agent
            })
            .collect();
        assert_eq!(bus.subscriber_count("draft"), 100);

        drop(agents);
        assert_eq!(bus.subscriber_count("draft"), 0);
        assert_eq!(bus.subscriber_count("critique"), 0);
        assert!(!bus.has_inbox("critic-0"));
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_drop_keeps_newer_binding_for_same_id() {
        let bus = MessageBus::new().shared();
        let bb = Blackboard::new().shared();
        let old = AgentRuntime::new("critic", AgentSpec::default(), bus.clone(), bb.clone());
        let new = AgentRuntime::new("critic", AgentSpec::default(), bus.clone(), bb);

        drop(old);
        assert!(bus.has_inbox("critic"));
        drop(new);
        assert!(!bus.has_inbox("critic"));
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let (_, mut critic) = pair();
        let stop = critic.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stop.cancel();
        });

        let mut handler = Recorder {
            seen: Vec::new(),
            fail_on: None,
        };
        let exit = tokio::time::timeout(Duration::from_secs(5), critic.run(&mut handler))
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Cancelled);
        assert!(!critic.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_leaves_bus() {
        let (author, mut critic) = pair();
        critic.subscribe(["draft"]);
        author.send("draft", json!("v1"), None, Map::new()).await.unwrap();

        let pending = critic.shutdown();
        assert_eq!(pending.len(), 1);
        assert!(!critic.bus.has_inbox("critic"));
        assert_eq!(critic.bus.subscriber_count("draft"), 0);

        let delivered = author.send("draft", json!("v2"), None, Map::new()).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_from_config() {
        let config = CoordinationConfig::from_toml_str(
            "inbox_capacity = 4\npreview_chars = 8\n[agents.critic]\ntoken_budget = 42",
        )
        .unwrap();
        let mut critic = AgentRuntime::from_config(
            "critic",
            &config,
            MessageBus::new().shared(),
            Blackboard::new().shared(),
        );
        assert_eq!(critic.spec().token_budget, 42);
        assert_eq!(critic.inbox.capacity(), Some(4));

        critic.record_usage("S1", "a fairly long generated sentence");
        assert_eq!(critic.session("S1").unwrap().history()[0].preview, "a fairly");
    }
}
