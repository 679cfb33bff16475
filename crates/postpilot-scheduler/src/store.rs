//! SQLite-backed store for scheduled tasks.
//!
//! The field set and the due-task predicate are the wire contract; the
//! schema below is an implementation detail. Timestamps are stored as
//! fixed-width UTC text so SQL comparisons order correctly.

use chrono::{DateTime, SecondsFormat, Utc};
use postpilot_core::error::{PostPilotError, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::tasks::{Frequency, ScheduledStatus, ScheduledTask};

const SELECT_COLUMNS: &str = "id, description, capability, parameters, scheduled_for, frequency, \
     status, created_at, executed_at, next_execution, execution_count, max_executions, last_error";

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite persistence for `ScheduledTask` rows.
pub struct SchedulerStore {
    conn: Connection,
}

impl SchedulerStore {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| PostPilotError::Database(format!("DB open: {e}")))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PostPilotError::Database(format!("DB open: {e}")))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                capability TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '{}',
                scheduled_for TEXT NOT NULL,
                frequency TEXT NOT NULL DEFAULT 'once',
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                executed_at TEXT,
                next_execution TEXT,
                execution_count INTEGER NOT NULL DEFAULT 0,
                max_executions INTEGER,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_status
                ON scheduled_tasks(status);
         ",
            )
            .map_err(|e| PostPilotError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Insert or replace a task row.
    pub fn save(&self, task: &ScheduledTask) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO scheduled_tasks
                 (id, description, capability, parameters, scheduled_for, frequency, status,
                  created_at, executed_at, next_execution, execution_count, max_executions, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    task.id,
                    task.description,
                    task.capability,
                    task.parameters.to_string(),
                    ts(task.scheduled_for),
                    task.frequency.as_str(),
                    task.status.as_str(),
                    ts(task.created_at),
                    task.executed_at.map(ts),
                    task.next_execution.map(ts),
                    task.execution_count,
                    task.max_executions,
                    task.last_error,
                ],
            )
            .map_err(|e| PostPilotError::Database(format!("Save task: {e}")))?;
        Ok(())
    }

    /// Point lookup by id.
    pub fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM scheduled_tasks WHERE id = ?1");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| PostPilotError::Database(format!("Get task: {e}")))?;
        let mut rows = stmt
            .query_map([id], row_to_task)
            .map_err(|e| PostPilotError::Database(format!("Get task: {e}")))?;
        match rows.next() {
            Some(Ok(task)) => Ok(Some(task)),
            Some(Err(e)) => Err(PostPilotError::Database(format!("Get task: {e}"))),
            None => Ok(None),
        }
    }

    /// All tasks, oldest first.
    pub fn list(&self) -> Result<Vec<ScheduledTask>> {
        let sql =
            format!("SELECT {SELECT_COLUMNS} FROM scheduled_tasks ORDER BY created_at, id");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| PostPilotError::Database(format!("List tasks: {e}")))?;
        let rows = stmt
            .query_map([], row_to_task)
            .map_err(|e| PostPilotError::Database(format!("List tasks: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PostPilotError::Database(format!("List tasks: {e}")))
    }

    /// Delete a task row. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM scheduled_tasks WHERE id = ?1", [id])
            .map_err(|e| PostPilotError::Database(format!("Delete task: {e}")))?;
        Ok(n > 0)
    }

    /// Tasks ready to dispatch at `now`: pending, with their effective time
    /// (`next_execution` once set, `scheduled_for` before then) at or before
    /// `now`. The status filter scopes over both time branches — a terminal
    /// task with a stale `next_execution` in the past must never surface.
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM scheduled_tasks
             WHERE status = 'pending'
               AND COALESCE(next_execution, scheduled_for) <= ?1
             ORDER BY COALESCE(next_execution, scheduled_for), id"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| PostPilotError::Database(format!("Due tasks: {e}")))?;
        let rows = stmt
            .query_map([ts(now)], row_to_task)
            .map_err(|e| PostPilotError::Database(format!("Due tasks: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PostPilotError::Database(format!("Due tasks: {e}")))
    }

    /// Claim due tasks for execution: each is transitioned pending→running
    /// with a conditional update, so two pollers asking at the same instant
    /// get disjoint sets. Returns only the tasks this caller won.
    pub fn claim_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        let due = self.due_tasks(now)?;
        let mut claimed = Vec::with_capacity(due.len());
        for mut task in due {
            let n = self
                .conn
                .execute(
                    "UPDATE scheduled_tasks SET status = 'running'
                     WHERE id = ?1 AND status = 'pending'",
                    [&task.id],
                )
                .map_err(|e| PostPilotError::Database(format!("Claim task: {e}")))?;
            if n == 1 {
                task.status = ScheduledStatus::Running;
                claimed.push(task);
            }
        }
        Ok(claimed)
    }

    /// Post-execution bookkeeping (see `ScheduledTask::record_execution`).
    /// Returns the updated task.
    pub fn mark_executed(
        &self,
        id: &str,
        success: bool,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ScheduledTask> {
        let mut task = self
            .get(id)?
            .ok_or_else(|| PostPilotError::Scheduler(format!("Task '{id}' not found")))?;
        task.record_execution(success, error, now);
        self.save(&task)?;
        Ok(task)
    }

    /// Cancel a task unconditionally. This only prevents future selection by
    /// the due-task query — an execution already in flight is not signalled.
    /// Returns whether the task existed.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "UPDATE scheduled_tasks SET status = 'cancelled' WHERE id = ?1",
                [id],
            )
            .map_err(|e| PostPilotError::Database(format!("Cancel task: {e}")))?;
        Ok(n > 0)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let parameters_str: String = row.get(3)?;
    let scheduled_for_str: String = row.get(4)?;
    let frequency_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let executed_at_str: Option<String> = row.get(8)?;
    let next_execution_str: Option<String> = row.get(9)?;

    Ok(ScheduledTask {
        id: row.get(0)?,
        description: row.get(1)?,
        capability: row.get(2)?,
        parameters: serde_json::from_str(&parameters_str).unwrap_or_default(),
        scheduled_for: parse_ts(&scheduled_for_str),
        frequency: Frequency::parse(&frequency_str).unwrap_or(Frequency::Once),
        status: ScheduledStatus::parse(&status_str).unwrap_or(ScheduledStatus::Pending),
        created_at: parse_ts(&created_at_str),
        executed_at: executed_at_str.as_deref().map(parse_ts),
        next_execution: next_execution_str.as_deref().map(parse_ts),
        execution_count: row.get(10)?,
        max_executions: row.get(11)?,
        last_error: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SchedulerStore {
        SchedulerStore::in_memory().unwrap()
    }

    fn pending_task(at: DateTime<Utc>, frequency: Frequency) -> ScheduledTask {
        ScheduledTask::recurring(
            "test task",
            "generate_posts",
            serde_json::json!({"client": "Acme"}),
            at,
            frequency,
            None,
        )
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let db = store();
        let task = pending_task(Utc::now(), Frequency::Weekly);
        db.save(&task).unwrap();

        let loaded = db.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.capability, "generate_posts");
        assert_eq!(loaded.parameters["client"], "Acme");
        assert_eq!(loaded.frequency, Frequency::Weekly);
        assert_eq!(loaded.status, ScheduledStatus::Pending);
        assert!(loaded.next_execution.is_none());
    }

    #[test]
    fn test_get_missing_is_none() {
        let db = store();
        assert!(db.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_due_boundary() {
        let db = store();
        let now = Utc::now();

        let due_exactly = pending_task(now, Frequency::Once);
        let not_yet = pending_task(now + Duration::seconds(1), Frequency::Once);
        db.save(&due_exactly).unwrap();
        db.save(&not_yet).unwrap();

        let due = db.due_tasks(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_exactly.id);
    }

    #[test]
    fn test_due_never_returns_non_pending() {
        // Regression for the grouping defect: terminal tasks with a past
        // next_execution must not slip through the OR branch.
        let db = store();
        let now = Utc::now();

        for status in [
            ScheduledStatus::Completed,
            ScheduledStatus::Failed,
            ScheduledStatus::Cancelled,
            ScheduledStatus::Running,
        ] {
            let mut task = pending_task(now - Duration::days(2), Frequency::Daily);
            task.status = status;
            task.next_execution = Some(now - Duration::days(1));
            db.save(&task).unwrap();
        }

        assert!(db.due_tasks(now).unwrap().is_empty());
    }

    #[test]
    fn test_due_prefers_next_execution_over_scheduled_for() {
        let db = store();
        let now = Utc::now();

        // First execution happened; next one is tomorrow. scheduled_for is
        // long past but must no longer count.
        let mut task = pending_task(now - Duration::days(5), Frequency::Daily);
        task.next_execution = Some(now + Duration::days(1));
        task.execution_count = 1;
        db.save(&task).unwrap();

        assert!(db.due_tasks(now).unwrap().is_empty());
    }

    #[test]
    fn test_claim_is_disjoint() {
        let db = store();
        let now = Utc::now();
        db.save(&pending_task(now - Duration::minutes(1), Frequency::Once))
            .unwrap();
        db.save(&pending_task(now - Duration::minutes(2), Frequency::Once))
            .unwrap();

        let first = db.claim_due_tasks(now).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.status == ScheduledStatus::Running));

        // Everything already claimed — a second poller gets nothing
        let second = db.claim_due_tasks(now).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_mark_executed_once_completes() {
        let db = store();
        let now = Utc::now();
        let task = pending_task(now, Frequency::Once);
        db.save(&task).unwrap();

        let updated = db.mark_executed(&task.id, true, None, now).unwrap();
        assert_eq!(updated.status, ScheduledStatus::Completed);
        assert_eq!(updated.execution_count, 1);
        assert!(db.due_tasks(now + Duration::days(30)).unwrap().is_empty());
    }

    #[test]
    fn test_mark_executed_failure_records_error() {
        let db = store();
        let now = Utc::now();
        let task = pending_task(now, Frequency::Daily);
        db.save(&task).unwrap();

        let updated = db
            .mark_executed(&task.id, false, Some("smtp unreachable"), now)
            .unwrap();
        assert_eq!(updated.status, ScheduledStatus::Failed);
        assert_eq!(updated.last_error.as_deref(), Some("smtp unreachable"));
        // Failed tasks are terminal — never due again
        assert!(db.due_tasks(now + Duration::days(30)).unwrap().is_empty());
    }

    #[test]
    fn test_recurring_lifecycle_with_cap() {
        let db = store();
        let start = Utc::now() - Duration::minutes(1);
        let mut task = pending_task(start, Frequency::Daily);
        task.max_executions = Some(3);
        db.save(&task).unwrap();

        let mut now = Utc::now();
        for round in 1..=3u32 {
            let claimed = db.claim_due_tasks(now).unwrap();
            assert_eq!(claimed.len(), 1, "round {round} should have one due task");
            let updated = db.mark_executed(&task.id, true, None, now).unwrap();
            assert_eq!(updated.execution_count, round);
            now += Duration::days(1);
        }

        let final_task = db.get(&task.id).unwrap().unwrap();
        assert_eq!(final_task.status, ScheduledStatus::Completed);
        // A fourth round never materializes
        assert!(db.claim_due_tasks(now + Duration::days(30)).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_prevents_selection() {
        let db = store();
        let now = Utc::now();
        let task = pending_task(now - Duration::minutes(1), Frequency::Daily);
        db.save(&task).unwrap();

        assert!(db.cancel(&task.id).unwrap());
        assert_eq!(
            db.get(&task.id).unwrap().unwrap().status,
            ScheduledStatus::Cancelled
        );
        assert!(db.due_tasks(now).unwrap().is_empty());
        // Unknown id
        assert!(!db.cancel("missing").unwrap());
    }

    #[test]
    fn test_delete_and_list() {
        let db = store();
        let now = Utc::now();
        let a = pending_task(now, Frequency::Once);
        let b = pending_task(now, Frequency::Daily);
        db.save(&a).unwrap();
        db.save(&b).unwrap();
        assert_eq!(db.list().unwrap().len(), 2);

        assert!(db.delete(&a.id).unwrap());
        assert!(!db.delete(&a.id).unwrap());
        assert_eq!(db.list().unwrap().len(), 1);
    }
}
