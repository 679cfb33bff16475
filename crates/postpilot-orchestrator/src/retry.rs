//! Retry engine — classification-driven retry with exponential backoff.
//!
//! Wraps a capability invocation: every failure is classified and recorded,
//! the strategy table decides whether another attempt is worth it, and
//! backoff sleeps space the attempts out. Constructed explicitly and injected
//! where needed — there is no process-global engine instance.

use postpilot_core::config::RetryConfig;
use postpilot_core::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::classify::{ErrorCategory, ErrorClassifier, ErrorHistory, ErrorRecord, ErrorSeverity};

/// What to do after a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Try again after a backoff delay.
    Retry,
    /// Give up on this unit of work without escalating.
    Skip,
    /// Give up; a human needs to look at it.
    UserInput,
    /// Give up everything.
    Abort,
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Skip => write!(f, "skip"),
            Self::UserInput => write!(f, "user-input"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Strategy table, evaluated after classification.
///
/// Skip, UserInput, and Abort all stop the retry sequence identically — the
/// distinction is carried through to the failure report for presentation,
/// not acted on here. Whether richer handling (skip-this-task vs
/// abort-the-plan) was ever intended is an open question; this is the
/// documented conservative behavior.
pub fn decide_strategy(
    category: ErrorCategory,
    severity: ErrorSeverity,
    attempt: u32,
    max_retries: u32,
) -> RetryStrategy {
    // No classification rule currently produces Fatal, so this branch is
    // unreachable today. Kept: the taxonomy names it and a future rule may
    // start producing it.
    if severity == ErrorSeverity::Fatal {
        return RetryStrategy::Abort;
    }
    match category {
        ErrorCategory::Api | ErrorCategory::Network | ErrorCategory::Timeout => {
            if attempt < max_retries {
                RetryStrategy::Retry
            } else {
                RetryStrategy::UserInput
            }
        }
        ErrorCategory::Validation => RetryStrategy::UserInput,
        ErrorCategory::System => {
            if attempt == 0 {
                RetryStrategy::Retry
            } else {
                RetryStrategy::UserInput
            }
        }
        ErrorCategory::Unknown => {
            if attempt == 0 {
                RetryStrategy::Retry
            } else {
                RetryStrategy::Skip
            }
        }
    }
}

/// Exponential backoff: `min(initial * base^attempt, max)`, optionally
/// jittered by a uniform factor in [0.8, 1.2].
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub base: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from_retry_config(&RetryConfig::default())
    }
}

impl BackoffConfig {
    pub fn from_retry_config(config: &RetryConfig) -> Self {
        Self {
            initial: config.initial_delay(),
            base: config.backoff_base,
            max: config.max_delay(),
            jitter: config.jitter,
        }
    }

    /// Delay before the attempt after `attempt` (zero-based). Exactly
    /// reproducible with jitter disabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp_ms = self.initial.as_millis() as f64 * self.base.powi(attempt as i32);
        let capped_ms = exp_ms.min(self.max.as_millis() as f64);
        let ms = if self.jitter {
            capped_ms * rand::thread_rng().gen_range(0.8..=1.2)
        } else {
            capped_ms
        };
        Duration::from_millis(ms.round() as u64)
    }
}

/// Lifetime counters for one engine instance.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RetryStats {
    /// Individual invocation attempts, including retries.
    pub attempts: u64,
    /// Attempts that were followed by another try.
    pub retries: u64,
    /// Retry sequences that failed at least once and then succeeded.
    pub recoveries: u64,
    /// Retry sequences that ended in failure.
    pub failures: u64,
}

/// A retry sequence that ended in failure.
#[derive(Debug)]
pub struct RetryFailure {
    /// The record of the last (decisive) failure.
    pub record: ErrorRecord,
    /// The strategy that stopped the sequence.
    pub strategy: RetryStrategy,
    /// Total attempts made.
    pub attempts: u32,
}

/// Drives retry sequences and owns the error history.
pub struct RetryEngine {
    classifier: ErrorClassifier,
    backoff: BackoffConfig,
    history: ErrorHistory,
    stats: RetryStats,
}

impl RetryEngine {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            classifier: ErrorClassifier::new(),
            backoff: BackoffConfig::from_retry_config(config),
            history: ErrorHistory::new(config.history_cap),
            stats: RetryStats::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn stats(&self) -> RetryStats {
        self.stats
    }

    /// Invoke `op` up to `max_retries + 1` times.
    ///
    /// Each failure is classified and appended to the history. The sequence
    /// continues only when the strategy table says Retry *and* attempts
    /// remain; any other outcome stops immediately and reports the last
    /// record. A success after earlier failures marks those records
    /// recovered.
    pub async fn execute_with_retry<F, Fut>(
        &mut self,
        context: &str,
        max_retries: u32,
        op: F,
    ) -> std::result::Result<serde_json::Value, RetryFailure>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<serde_json::Value>>,
    {
        let mut sequence_ids: Vec<String> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            self.stats.attempts += 1;
            match op(attempt).await {
                Ok(value) => {
                    if !sequence_ids.is_empty() {
                        self.history.mark_recovered(&sequence_ids);
                        self.stats.recoveries += 1;
                        tracing::info!(
                            "✅ {context}: recovered on attempt {} after {} failure(s)",
                            attempt + 1,
                            sequence_ids.len()
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let (category, severity) = self.classifier.classify(&error);
                    let record =
                        ErrorRecord::new(category, severity, &error.to_string(), attempt, context);
                    sequence_ids.push(record.id.clone());
                    self.history.push(record.clone());

                    let strategy = decide_strategy(category, severity, attempt, max_retries);
                    tracing::warn!(
                        "⚠️ {context}: attempt {}/{} failed ({category}): {error}",
                        attempt + 1,
                        max_retries + 1,
                    );

                    if strategy == RetryStrategy::Retry && attempt < max_retries {
                        let delay = self.backoff.delay(attempt);
                        self.stats.retries += 1;
                        tracing::debug!("⏳ {context}: backing off {delay:?}");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    self.stats.failures += 1;
                    return Err(RetryFailure {
                        record,
                        strategy,
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }
}
