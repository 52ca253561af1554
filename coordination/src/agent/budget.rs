//! Token accounting: pluggable estimator for generated text.

/// Trait for estimating token counts from text.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text.
    fn estimate(&self, text: &str) -> u64;

    /// Estimator name for logging.
    fn name(&self) -> &str;
}

/// Tokens per whitespace-delimited word for English text.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Simple word-count based estimator (words × factor, rounded down).
#[derive(Debug, Clone)]
pub struct WordCountEstimator {
    /// Tokens per word multiplier.
    pub factor: f64,
}

impl Default for WordCountEstimator {
    fn default() -> Self {
        Self {
            factor: TOKENS_PER_WORD,
        }
    }
}

impl TokenEstimator for WordCountEstimator {
    fn estimate(&self, text: &str) -> u64 {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.factor).floor() as u64
    }

    fn name(&self) -> &str {
        "word_count"
    }
}

/// Snapshot of one agent's spending in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetStatus {
    pub used: u64,
    pub ceiling: u64,
}

impl BudgetStatus {
    /// Tokens left before the ceiling (zero once reached or passed).
    pub fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.used)
    }

    /// Whether another generation may start.
    pub fn allows_generation(&self) -> bool {
        self.used < self.ceiling
    }

    /// Fraction of the ceiling consumed; 1.0 for a zero ceiling.
    pub fn utilization(&self) -> f64 {
        if self.ceiling == 0 {
            return 1.0;
        }
        self.used as f64 / self.ceiling as f64
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} tokens ({} remaining)",
            self.used,
            self.ceiling,
            self.remaining()
        )
    }
}
