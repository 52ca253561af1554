//! Well-known debate topics.

/// General debate chatter.
pub const DEBATE_TOPIC: &str = "debate";
/// Drafts published by the author.
pub const DRAFT_TOPIC: &str = "draft";
/// Critiques of the current draft.
pub const CRITIC_TOPIC: &str = "critique";
/// Commands from the moderator.
pub const MOD_CMD_TOPIC: &str = "moderator_cmd";
/// Results returned by search tools.
pub const SEARCH_RESULTS_TOPIC: &str = "search_results";
/// Findings extracted from sources.
pub const FINDINGS_TOPIC: &str = "findings";

/// Reserved for loop control; see [`crate::messaging::Message::shutdown`].
pub const SHUTDOWN_TOPIC: &str = "__shutdown__";

/// Topics every debate participant normally listens on.
pub fn default_subscriptions() -> &'static [&'static str] {
    &[
        DEBATE_TOPIC,
        MOD_CMD_TOPIC,
        DRAFT_TOPIC,
        CRITIC_TOPIC,
        SEARCH_RESULTS_TOPIC,
        FINDINGS_TOPIC,
    ]
}
