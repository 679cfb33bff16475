//! Scheduler engine — registration surface plus the polling loop.
//!
//! The engine owns the store. Execution itself is a callback supplied by the
//! host (usually a thin wrapper over the capability registry or the
//! execution engine) — the indirection keeps this crate free of a circular
//! dependency on the orchestrator.

use chrono::{DateTime, Duration, Utc};
use postpilot_core::error::Result;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::SchedulerStore;
use crate::tasks::{Frequency, ScheduledTask};

/// The scheduler engine — schedules, cancels, and drives due tasks.
pub struct SchedulerEngine {
    store: SchedulerStore,
}

impl SchedulerEngine {
    pub fn new(store: SchedulerStore) -> Self {
        Self { store }
    }

    /// Open an engine over the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(SchedulerStore::open(path)?))
    }

    /// Create and persist a task due at an absolute time.
    pub fn schedule(
        &self,
        description: &str,
        capability: &str,
        parameters: serde_json::Value,
        when: DateTime<Utc>,
        frequency: Frequency,
        max_executions: Option<u32>,
    ) -> Result<ScheduledTask> {
        let task = ScheduledTask::recurring(
            description,
            capability,
            parameters,
            when,
            frequency,
            max_executions,
        );
        self.store.save(&task)?;
        tracing::info!(
            "📅 Scheduled '{}' ({}) for {} [{}]",
            task.description,
            task.id,
            task.scheduled_for,
            task.frequency
        );
        Ok(task)
    }

    /// Create and persist a task due `delay` from now.
    pub fn schedule_in(
        &self,
        description: &str,
        capability: &str,
        parameters: serde_json::Value,
        delay: Duration,
        frequency: Frequency,
        max_executions: Option<u32>,
    ) -> Result<ScheduledTask> {
        self.schedule(
            description,
            capability,
            parameters,
            Utc::now() + delay,
            frequency,
            max_executions,
        )
    }

    /// Cancel a task. Pre-dispatch only: an in-flight execution finishes.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let cancelled = self.store.cancel(id)?;
        if cancelled {
            tracing::info!("🚫 Cancelled scheduled task {id}");
        }
        Ok(cancelled)
    }

    pub fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        self.store.get(id)
    }

    pub fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.store.list()
    }

    /// Remove a task row entirely.
    pub fn remove_task(&self, id: &str) -> Result<bool> {
        self.store.delete(id)
    }

    pub fn task_count(&self) -> Result<usize> {
        Ok(self.store.list()?.len())
    }

    /// One poll cycle: claim everything due at `now`, run each through the
    /// executor callback, and record the outcome. Returns (task id, success)
    /// per dispatched task.
    pub async fn tick<F, Fut>(
        &mut self,
        now: DateTime<Utc>,
        execute: &F,
    ) -> Result<Vec<(String, bool)>>
    where
        F: Fn(ScheduledTask) -> Fut,
        Fut: Future<Output = std::result::Result<String, String>>,
    {
        let claimed = self.store.claim_due_tasks(now)?;
        let mut results = Vec::with_capacity(claimed.len());

        for task in claimed {
            let id = task.id.clone();
            let description = task.description.clone();
            tracing::info!("🔔 Task due: '{description}' ({id})");

            match execute(task).await {
                Ok(summary) => {
                    self.store.mark_executed(&id, true, None, Utc::now())?;
                    tracing::info!("✅ '{description}' done: {summary}");
                    results.push((id, true));
                }
                Err(e) => {
                    self.store.mark_executed(&id, false, Some(&e), Utc::now())?;
                    tracing::warn!("⚠️ '{description}' failed: {e}");
                    results.push((id, false));
                }
            }
        }

        Ok(results)
    }
}

/// Run the scheduler poll loop forever as a background task.
///
/// The `execute` callback receives each claimed task and returns a short
/// result summary or an error string; the engine does the bookkeeping.
pub async fn spawn_scheduler<F, Fut>(
    engine: Arc<Mutex<SchedulerEngine>>,
    execute: F,
    check_interval_secs: u64,
) where
    F: Fn(ScheduledTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<String, String>> + Send,
{
    tracing::info!("⏰ Scheduler started (check every {check_interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));

    loop {
        interval.tick().await;
        let mut eng = engine.lock().await;
        if let Err(e) = eng.tick(Utc::now(), &execute).await {
            tracing::warn!("⚠️ Scheduler tick failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ScheduledStatus;

    fn engine() -> SchedulerEngine {
        SchedulerEngine::new(SchedulerStore::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_tick_executes_due_and_completes_once_task() {
        let mut eng = engine();
        let task = eng
            .schedule(
                "send kickoff email",
                "send_email",
                serde_json::json!({"client": "Acme"}),
                Utc::now() - Duration::minutes(1),
                Frequency::Once,
                None,
            )
            .unwrap();

        let results = eng
            .tick(Utc::now(), &|t: ScheduledTask| async move {
                Ok(format!("ran {}", t.capability))
            })
            .await
            .unwrap();

        assert_eq!(results, vec![(task.id.clone(), true)]);
        let after = eng.get(&task.id).unwrap().unwrap();
        assert_eq!(after.status, ScheduledStatus::Completed);
        assert_eq!(after.execution_count, 1);
        assert!(after.executed_at.is_some());
    }

    #[tokio::test]
    async fn test_tick_skips_future_tasks() {
        let mut eng = engine();
        eng.schedule(
            "tomorrow's digest",
            "generate_posts",
            serde_json::json!({}),
            Utc::now() + Duration::days(1),
            Frequency::Once,
            None,
        )
        .unwrap();

        let results = eng
            .tick(Utc::now(), &|_t: ScheduledTask| async { Ok(String::new()) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_tick_failure_marks_failed() {
        let mut eng = engine();
        let task = eng
            .schedule_in(
                "doomed",
                "send_email",
                serde_json::json!({}),
                Duration::minutes(-1),
                Frequency::Daily,
                None,
            )
            .unwrap();

        let results = eng
            .tick(Utc::now(), &|_t: ScheduledTask| async {
                Err("smtp unreachable".to_string())
            })
            .await
            .unwrap();

        assert_eq!(results, vec![(task.id.clone(), false)]);
        let after = eng.get(&task.id).unwrap().unwrap();
        assert_eq!(after.status, ScheduledStatus::Failed);
        assert_eq!(after.last_error.as_deref(), Some("smtp unreachable"));
    }

    #[tokio::test]
    async fn test_tick_advances_recurring_task() {
        let mut eng = engine();
        let task = eng
            .schedule_in(
                "daily digest",
                "generate_posts",
                serde_json::json!({}),
                Duration::minutes(-1),
                Frequency::Daily,
                None,
            )
            .unwrap();

        eng.tick(Utc::now(), &|_t: ScheduledTask| async { Ok(String::new()) })
            .await
            .unwrap();

        let after = eng.get(&task.id).unwrap().unwrap();
        assert_eq!(after.status, ScheduledStatus::Pending);
        assert!(after.next_execution.is_some());
        assert!(after.next_execution.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_cancelled_task_never_dispatched() {
        let mut eng = engine();
        let task = eng
            .schedule_in(
                "cancel me",
                "send_email",
                serde_json::json!({}),
                Duration::minutes(-1),
                Frequency::Once,
                None,
            )
            .unwrap();

        assert!(eng.cancel(&task.id).unwrap());
        let results = eng
            .tick(Utc::now(), &|_t: ScheduledTask| async { Ok(String::new()) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let eng = engine();
        eng.schedule_in(
            "a",
            "send_email",
            serde_json::json!({}),
            Duration::hours(1),
            Frequency::Once,
            None,
        )
        .unwrap();
        let b = eng
            .schedule_in(
                "b",
                "send_email",
                serde_json::json!({}),
                Duration::hours(2),
                Frequency::Once,
                None,
            )
            .unwrap();

        assert_eq!(eng.task_count().unwrap(), 2);
        assert!(eng.remove_task(&b.id).unwrap());
        assert_eq!(eng.task_count().unwrap(), 1);
    }
}
