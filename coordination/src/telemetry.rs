//! Tracing setup and span helpers
//!
//! Spans use dot-notation field names compatible with OpenTelemetry
//! semantic conventions.
//!
//! # Span Hierarchy
//!
//! ```text
//! debate.agent_loop           (one per AgentRuntime::run)
//!   └─ debate.generate        (one text generation, charged to a session)
//! ```

use tracing::Span;

// ── Span Name Constants ──────────────────────────────────────────────

/// An agent's message loop.
pub const SPAN_AGENT_LOOP: &str = "debate.agent_loop";

/// One text generation.
pub const SPAN_GENERATE: &str = "debate.generate";

// ── Field Name Constants ─────────────────────────────────────────────

// Fields recorded after span creation; the rest are set inline.
pub const FIELD_TOKENS_USED: &str = "debate.tokens_used";
pub const FIELD_DURATION_MS: &str = "debate.duration_ms";
pub const FIELD_SUCCESS: &str = "debate.success";

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .try_init()
        .is_ok()
}

// ── Span Builders ────────────────────────────────────────────────────

/// Span around an agent loop.
pub fn agent_loop_span(agent_id: &str, role: &str) -> Span {
    tracing::info_span!(
        "debate.agent_loop",
        "debate.agent.id" = %agent_id,
        "debate.agent.role" = %role,
    )
}

/// Span around one generation.
///
/// Fields filled later via [`record_generation_result`]: success, timing, tokens.
pub fn generation_span(agent_id: &str, session_id: &str, max_tokens: u32) -> Span {
    tracing::info_span!(
        "debate.generate",
        "debate.agent.id" = %agent_id,
        "debate.session.id" = %session_id,
        "debate.max_tokens" = max_tokens,
        "debate.success" = tracing::field::Empty,
        "debate.duration_ms" = tracing::field::Empty,
        "debate.tokens_used" = tracing::field::Empty,
    )
}

/// Record the outcome of a generation.
pub fn record_generation_result(span: &Span, success: bool, duration_ms: u64, tokens_used: u64) {
    span.record(FIELD_SUCCESS, success);
    span.record(FIELD_DURATION_MS, duration_ms);
    span.record(FIELD_TOKENS_USED, tokens_used);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_subscriber() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .try_init();
        });
    }

    #[test]
    fn test_agent_loop_span() {
        init_test_subscriber();
        let span = agent_loop_span("critic", "critic");
        assert!(!span.is_disabled());
        let meta = span.metadata().unwrap();
        assert_eq!(meta.name(), SPAN_AGENT_LOOP);
        assert!(meta.fields().field("debate.agent.role").is_some());
    }

    #[test]
    fn test_generation_span_records() {
        init_test_subscriber();
        let span = generation_span("author", "S1", 180);
        assert!(!span.is_disabled());
        let meta = span.metadata().unwrap();
        assert_eq!(meta.name(), SPAN_GENERATE);
        for field in [FIELD_SUCCESS, FIELD_DURATION_MS, FIELD_TOKENS_USED] {
            assert!(meta.fields().field(field).is_some());
        }
        record_generation_result(&span, true, 12, 61);
    }

    #[test]
    fn test_init_tracing_is_repeatable() {
        init_test_subscriber();
        assert!(!init_tracing());
    }
}
