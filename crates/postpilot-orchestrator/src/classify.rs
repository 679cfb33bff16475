//! Error classification — ordered rule table over capability failures.
//!
//! Every failure caught at the retry boundary is assigned a (category,
//! severity) pair by the first matching rule. The table is fixed-order:
//! earlier rules win, so "rate limit exceeded" classifies as API even though
//! it also mentions nothing network-ish would catch.

use chrono::{DateTime, Utc};
use postpilot_core::error::PostPilotError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Api,
    Network,
    Timeout,
    Validation,
    System,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Validation => write!(f, "validation"),
            Self::System => write!(f, "system"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure severity.
///
/// `Fatal` and `Recoverable` are part of the taxonomy but no classification
/// rule currently produces them; the retry engine's Fatal→Abort branch is
/// therefore unreachable today. Kept deliberately — see the strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Fatal,
    Critical,
    Warning,
    Recoverable,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
            Self::Recoverable => write!(f, "recoverable"),
        }
    }
}

/// One classified failure occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    /// Zero-based attempt within the retry sequence that produced this.
    pub attempt: u32,
    /// Free-form caller context, e.g. "plan 4f2a task revision-1".
    pub context: String,
    /// Set true when a later attempt in the same retry sequence succeeded.
    pub recovered: bool,
}

impl ErrorRecord {
    pub fn new(
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: &str,
        attempt: u32,
        context: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category,
            severity,
            message: message.to_string(),
            attempt,
            context: context.to_string(),
            recovered: false,
        }
    }
}

/// Inputs a rule predicate sees: the lowercased message, the structured
/// error, and the configured provider brand markers.
struct ClassifyCtx<'a> {
    message: &'a str,
    error: &'a PostPilotError,
    markers: &'a [String],
}

struct Rule {
    category: ErrorCategory,
    severity: ErrorSeverity,
    applies: fn(&ClassifyCtx) -> bool,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// The fixed-priority rule table. Order matters: first match wins.
static RULES: &[Rule] = &[
    // 1. Rate limiting beats the generic API rule.
    Rule {
        category: ErrorCategory::Api,
        severity: ErrorSeverity::Critical,
        applies: |ctx| ctx.message.contains("rate") && ctx.message.contains("limit"),
    },
    // 2. API mentions, provider brand names, or a structured Api error.
    Rule {
        category: ErrorCategory::Api,
        severity: ErrorSeverity::Critical,
        applies: |ctx| {
            ctx.message.contains("api")
                || ctx.markers.iter().any(|m| ctx.message.contains(m.as_str()))
                || matches!(ctx.error, PostPilotError::Api(_))
        },
    },
    // 3. Connectivity.
    Rule {
        category: ErrorCategory::Network,
        severity: ErrorSeverity::Critical,
        applies: |ctx| {
            contains_any(ctx.message, &["connection", "network", "dns", "unreachable"])
                || matches!(ctx.error, PostPilotError::Network(_))
        },
    },
    // 4. Deadlines.
    Rule {
        category: ErrorCategory::Timeout,
        severity: ErrorSeverity::Critical,
        applies: |ctx| {
            contains_any(ctx.message, &["timeout", "timed out"])
                || matches!(ctx.error, PostPilotError::Timeout(_))
        },
    },
    // 5. Bad input — never worth retrying.
    Rule {
        category: ErrorCategory::Validation,
        severity: ErrorSeverity::Warning,
        applies: |ctx| {
            ctx.message.contains("validation") || matches!(ctx.error, PostPilotError::Validation(_))
        },
    },
    // 6. OS/storage-level failures.
    Rule {
        category: ErrorCategory::System,
        severity: ErrorSeverity::Critical,
        applies: |ctx| {
            matches!(
                ctx.error,
                PostPilotError::Io(_) | PostPilotError::Database(_)
            )
        },
    },
];

/// Classifies failures against the rule table.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// Provider brand names treated as API markers alongside the literal "api".
    provider_markers: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            provider_markers: vec!["openai".to_string(), "anthropic".to_string()],
        }
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_markers(markers: Vec<String>) -> Self {
        Self {
            provider_markers: markers,
        }
    }

    /// Assign (category, severity) to a failure. First matching rule wins;
    /// anything unmatched is Unknown/Warning.
    pub fn classify(&self, error: &PostPilotError) -> (ErrorCategory, ErrorSeverity) {
        let message = error.to_string().to_lowercase();
        let ctx = ClassifyCtx {
            message: &message,
            error,
            markers: &self.provider_markers,
        };
        for rule in RULES {
            if (rule.applies)(&ctx) {
                return (rule.category, rule.severity);
            }
        }
        (ErrorCategory::Unknown, ErrorSeverity::Warning)
    }
}

/// Bounded in-memory error history.
///
/// A ring, not an unbounded list: once `cap` is reached the oldest record is
/// dropped. Long-lived processes get a hard memory bound without needing an
/// external flush.
#[derive(Debug)]
pub struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
    cap: usize,
}

impl ErrorHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
        }
    }

    /// Append a record, evicting the oldest once at capacity.
    pub fn push(&mut self, record: ErrorRecord) {
        if self.records.len() == self.cap {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Mark the records with the given ids as recovered.
    pub fn mark_recovered(&mut self, ids: &[String]) {
        for record in self.records.iter_mut() {
            if ids.contains(&record.id) {
                record.recovered = true;
            }
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
