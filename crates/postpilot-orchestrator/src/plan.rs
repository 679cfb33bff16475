//! Task graph model — Plans and their dependency-ordered Tasks.
//!
//! A Plan is an ordered list of Tasks with dependency edges. Execution order
//! is driven purely by dependency satisfaction in stored list order; the
//! `priority` field is informational metadata and never reorders anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Task priority — metadata only, not an ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Urgent => write!(f, "urgent"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Semantic category of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    CreateClient,
    GenerateBrief,
    GeneratePosts,
    SendEmail,
    SendReminder,
    ProcessRevision,
    ProcessDeliverable,
    CollectFeedback,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateClient => write!(f, "create-client"),
            Self::GenerateBrief => write!(f, "generate-brief"),
            Self::GeneratePosts => write!(f, "generate-posts"),
            Self::SendEmail => write!(f, "send-email"),
            Self::SendReminder => write!(f, "send-reminder"),
            Self::ProcessRevision => write!(f, "process-revision"),
            Self::ProcessDeliverable => write!(f, "process-deliverable"),
            Self::CollectFeedback => write!(f, "collect-feedback"),
        }
    }
}

/// One unit of work bound to a named capability.
///
/// Immutable once its Plan is built — completion is tracked by the caller in
/// a separate set of completed ids, not on the Task itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within the owning Plan.
    pub id: String,
    pub kind: TaskKind,
    pub description: String,
    /// Registry name of the external operation to invoke.
    pub capability: String,
    /// JSON object passed to the capability.
    pub parameters: serde_json::Value,
    pub estimated_minutes: u32,
    pub priority: Priority,
    /// Ids of tasks in the same Plan that must complete first.
    /// Cycles are not validated; a cyclic plan simply never becomes ready.
    pub depends_on: Vec<String>,
    /// When false, a permanent failure of this task halts the whole plan.
    pub can_fail: bool,
    pub retry_enabled: bool,
    pub max_retries: u32,
}

impl Task {
    /// Create a task with default policy: normal priority, tolerated failure,
    /// retries enabled with a cap of 3.
    pub fn new(
        id: &str,
        kind: TaskKind,
        description: &str,
        capability: &str,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            description: description.to_string(),
            capability: capability.to_string(),
            parameters,
            estimated_minutes: 5,
            priority: Priority::Normal,
            depends_on: Vec::new(),
            can_fail: true,
            retry_enabled: true,
            max_retries: 3,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn with_depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Mark this task as required: a permanent failure halts the plan.
    pub fn required(mut self) -> Self {
        self.can_fail = false;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_enabled = false;
        self
    }
}

/// An ordered collection of Tasks representing one user intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub intent: String,
    pub tasks: Vec<Task>,
    pub total_estimated_minutes: u32,
    pub requires_confirmation: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Build a plan from an ordered task list. Task ids must be unique
    /// within the plan; duplicates would shadow each other in the
    /// completed-set bookkeeping.
    pub fn new(intent: &str, tasks: Vec<Task>, requires_confirmation: bool) -> Self {
        debug_assert!(
            {
                let mut seen = HashSet::new();
                tasks.iter().all(|t| seen.insert(t.id.as_str()))
            },
            "duplicate task ids in plan"
        );
        let total = tasks.iter().map(|t| t.estimated_minutes).sum();
        Self {
            id: short_id(),
            intent: intent.to_string(),
            tasks,
            total_estimated_minutes: total,
            requires_confirmation,
            created_at: Utc::now(),
        }
    }

    /// A one-task plan. Never requires confirmation.
    pub fn single(intent: &str, task: Task) -> Self {
        Self::new(intent, vec![task], false)
    }

    /// Multi-step client onboarding: a linear dependency chain from intake
    /// through the welcome email. Requires confirmation before execution.
    pub fn onboarding(client_name: &str) -> Self {
        let client = serde_json::json!({"client": client_name});
        let tasks = vec![
            Task::new(
                "intake",
                TaskKind::CreateClient,
                &format!("Create client record for {client_name}"),
                "create_client",
                client.clone(),
            )
            .with_estimate(5)
            .required(),
            Task::new(
                "brief",
                TaskKind::GenerateBrief,
                &format!("Generate brand brief for {client_name}"),
                "generate_brief",
                client.clone(),
            )
            .with_estimate(20)
            .with_depends_on(&["intake"])
            .required(),
            Task::new(
                "posts",
                TaskKind::GeneratePosts,
                &format!("Generate initial post batch for {client_name}"),
                "generate_posts",
                serde_json::json!({"client": client_name, "count": 5}),
            )
            .with_estimate(40)
            .with_depends_on(&["brief"])
            .required(),
            Task::new(
                "welcome",
                TaskKind::SendEmail,
                &format!("Send welcome email to {client_name}"),
                "send_email",
                serde_json::json!({"client": client_name, "template": "welcome"}),
            )
            .with_estimate(2)
            .with_depends_on(&["posts"]),
        ];
        Self::new(&format!("Onboard client {client_name}"), tasks, true)
    }

    /// Batch plan over pending work: one independent task per item, grouped
    /// into priority tiers. Grouping only sets the `priority` field — the
    /// task list keeps insertion order and execution readiness ignores
    /// priority entirely.
    pub fn batch(
        overdue_invoices: &[String],
        pending_revisions: &[String],
        pending_deliverables: &[String],
        pending_feedback: &[String],
    ) -> Self {
        let mut tasks = Vec::new();

        for (i, client) in overdue_invoices.iter().enumerate() {
            tasks.push(
                Task::new(
                    &format!("reminder-{}", i + 1),
                    TaskKind::SendReminder,
                    &format!("Send overdue invoice reminder to {client}"),
                    "send_email",
                    serde_json::json!({"client": client, "template": "billing_reminder"}),
                )
                .with_priority(Priority::Urgent)
                .with_estimate(3),
            );
        }
        for (i, client) in pending_revisions.iter().enumerate() {
            tasks.push(
                Task::new(
                    &format!("revision-{}", i + 1),
                    TaskKind::ProcessRevision,
                    &format!("Process revision request from {client}"),
                    "revise_posts",
                    serde_json::json!({"client": client}),
                )
                .with_priority(Priority::High)
                .with_estimate(45),
            );
        }
        for (i, client) in pending_deliverables.iter().enumerate() {
            tasks.push(
                Task::new(
                    &format!("deliverable-{}", i + 1),
                    TaskKind::ProcessDeliverable,
                    &format!("Prepare pending deliverable for {client}"),
                    "deliver_posts",
                    serde_json::json!({"client": client}),
                )
                .with_priority(Priority::Normal)
                .with_estimate(60),
            );
        }
        for (i, client) in pending_feedback.iter().enumerate() {
            tasks.push(
                Task::new(
                    &format!("feedback-{}", i + 1),
                    TaskKind::CollectFeedback,
                    &format!("Request feedback from {client}"),
                    "request_feedback",
                    serde_json::json!({"client": client}),
                )
                .with_priority(Priority::Low)
                .with_estimate(5),
            );
        }

        Self::new("Process pending work", tasks, false)
    }

    /// First task in list order that is not yet completed and whose
    /// dependencies are all completed. Priority is not consulted.
    ///
    /// Returns `None` when every task is done — or when the remainder can
    /// never become ready (cycle or failed dependency); the model cannot
    /// tell those apart.
    pub fn next_ready_task(&self, completed: &HashSet<String>) -> Option<&Task> {
        self.tasks.iter().find(|t| {
            !completed.contains(&t.id) && t.depends_on.iter().all(|d| completed.contains(d))
        })
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Short unique id, uuid-derived (8 hex chars is plenty within one process).
fn short_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}
