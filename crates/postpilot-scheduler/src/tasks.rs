//! Scheduled task definitions — the data model for durable deferred work.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How often a scheduled task recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    /// Interval to the next execution. `None` for one-shot tasks.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Once => None,
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::weeks(1)),
            Self::Biweekly => Some(Duration::weeks(2)),
            Self::Monthly => Some(Duration::days(30)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "once" => Some(Self::Once),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scheduled task status. Completed, Failed, and Cancelled are terminal —
/// there is no un-cancel or automatic re-queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScheduledStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ScheduledStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable unit of deferred or recurring work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub description: String,
    /// Registry name of the capability to invoke when due.
    pub capability: String,
    pub parameters: serde_json::Value,
    /// First (or only) execution time.
    pub scheduled_for: DateTime<Utc>,
    pub frequency: Frequency,
    pub status: ScheduledStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Null until a recurring task has executed at least once.
    pub next_execution: Option<DateTime<Utc>>,
    pub execution_count: u32,
    /// Optional cap for recurring tasks.
    pub max_executions: Option<u32>,
    pub last_error: Option<String>,
}

impl ScheduledTask {
    /// Create a one-shot task due at `at`.
    pub fn once(
        description: &str,
        capability: &str,
        parameters: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self::recurring(description, capability, parameters, at, Frequency::Once, None)
    }

    /// Create a task first due at `first_at`, recurring per `frequency`.
    pub fn recurring(
        description: &str,
        capability: &str,
        parameters: serde_json::Value,
        first_at: DateTime<Utc>,
        frequency: Frequency,
        max_executions: Option<u32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            capability: capability.to_string(),
            parameters,
            scheduled_for: first_at,
            frequency,
            status: ScheduledStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            next_execution: None,
            execution_count: 0,
            max_executions,
            last_error: None,
        }
    }

    /// The time this task is next expected to run: `next_execution` once the
    /// task has history, `scheduled_for` before then.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.next_execution.unwrap_or(self.scheduled_for)
    }

    /// Whether this task should be dispatched at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduledStatus::Pending && self.effective_time() <= now
    }

    /// Post-execution bookkeeping: advance-or-complete.
    ///
    /// Increments the execution count and stamps `executed_at`. A failure is
    /// terminal (no automatic re-queue). On success, one-shot tasks and
    /// recurring tasks at their execution cap complete; anything else gets
    /// `next_execution` advanced by the frequency interval and returns to
    /// pending. Once terminal, `next_execution` never advances again.
    pub fn record_execution(&mut self, success: bool, error: Option<&str>, now: DateTime<Utc>) {
        self.execution_count += 1;
        self.executed_at = Some(now);

        if !success {
            self.status = ScheduledStatus::Failed;
            self.last_error = Some(error.unwrap_or("unknown error").to_string());
            return;
        }

        let capped = self
            .max_executions
            .is_some_and(|max| self.execution_count >= max);

        match self.frequency.interval() {
            None => self.status = ScheduledStatus::Completed,
            Some(_) if capped => self.status = ScheduledStatus::Completed,
            Some(interval) => {
                self.next_execution = Some(now + interval);
                self.status = ScheduledStatus::Pending;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_task(max: Option<u32>) -> ScheduledTask {
        ScheduledTask::recurring(
            "weekly digest",
            "generate_posts",
            serde_json::json!({}),
            Utc::now(),
            Frequency::Daily,
            max,
        )
    }

    #[test]
    fn test_new_task_is_pending_with_no_next() {
        let task = daily_task(None);
        assert_eq!(task.status, ScheduledStatus::Pending);
        assert!(task.next_execution.is_none());
        assert_eq!(task.execution_count, 0);
    }

    #[test]
    fn test_due_uses_scheduled_for_before_first_run() {
        let now = Utc::now();
        let mut task = daily_task(None);
        task.scheduled_for = now - Duration::minutes(1);
        assert!(task.is_due(now));

        task.scheduled_for = now + Duration::minutes(1);
        assert!(!task.is_due(now));
    }

    #[test]
    fn test_due_uses_next_execution_after_first_run() {
        let now = Utc::now();
        let mut task = daily_task(None);
        task.scheduled_for = now - Duration::days(2);
        task.record_execution(true, None, now - Duration::days(1));
        // next_execution == now, scheduled_for long past
        assert!(task.is_due(now));
        assert_eq!(task.next_execution, Some(now));
    }

    #[test]
    fn test_once_completes_after_run() {
        let now = Utc::now();
        let mut task =
            ScheduledTask::once("kickoff call", "send_email", serde_json::json!({}), now);
        task.record_execution(true, None, now);
        assert_eq!(task.status, ScheduledStatus::Completed);
        assert!(task.next_execution.is_none());
        assert_eq!(task.execution_count, 1);
    }

    #[test]
    fn test_failure_is_terminal_with_error() {
        let now = Utc::now();
        let mut task = daily_task(None);
        task.record_execution(false, Some("smtp unreachable"), now);
        assert_eq!(task.status, ScheduledStatus::Failed);
        assert_eq!(task.last_error.as_deref(), Some("smtp unreachable"));
        // No re-queue: next_execution untouched
        assert!(task.next_execution.is_none());
    }

    #[test]
    fn test_recurring_advances_by_frequency() {
        let now = Utc::now();
        let mut task = daily_task(None);
        task.record_execution(true, None, now);
        assert_eq!(task.status, ScheduledStatus::Pending);
        assert_eq!(task.next_execution, Some(now + Duration::days(1)));
    }

    #[test]
    fn test_max_executions_completes_and_stops_advancing() {
        let now = Utc::now();
        let mut task = daily_task(Some(3));

        task.record_execution(true, None, now);
        assert_eq!(task.status, ScheduledStatus::Pending);
        task.record_execution(true, None, now + Duration::days(1));
        assert_eq!(task.status, ScheduledStatus::Pending);
        let next_before_last = task.next_execution;

        // Third run hits the cap: completed, next_execution frozen
        task.record_execution(true, None, now + Duration::days(2));
        assert_eq!(task.status, ScheduledStatus::Completed);
        assert_eq!(task.execution_count, 3);
        assert_eq!(task.next_execution, next_before_last);
    }

    #[test]
    fn test_frequency_intervals() {
        assert_eq!(Frequency::Once.interval(), None);
        assert_eq!(Frequency::Daily.interval(), Some(Duration::days(1)));
        assert_eq!(Frequency::Weekly.interval(), Some(Duration::weeks(1)));
        assert_eq!(Frequency::Biweekly.interval(), Some(Duration::weeks(2)));
        assert_eq!(Frequency::Monthly.interval(), Some(Duration::days(30)));
    }

    #[test]
    fn test_frequency_roundtrip() {
        for f in [
            Frequency::Once,
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Biweekly,
            Frequency::Monthly,
        ] {
            assert_eq!(Frequency::parse(f.as_str()), Some(f));
        }
        assert_eq!(Frequency::parse("hourly"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ScheduledStatus::Completed.is_terminal());
        assert!(ScheduledStatus::Failed.is_terminal());
        assert!(ScheduledStatus::Cancelled.is_terminal());
        assert!(!ScheduledStatus::Pending.is_terminal());
        assert!(!ScheduledStatus::Running.is_terminal());
    }
}
