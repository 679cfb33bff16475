//! Execution engine — drives a Plan to completion or failure.
//!
//! Strictly sequential: one task at a time, selected by the list-order
//! ready-first-match rule. The halt policy is deliberately strict — the loop
//! stops at the first task whose retries are exhausted, whether or not the
//! task was required and whether or not unrelated ready tasks remain. True
//! DAG scheduling with branch continuation is a known non-goal.

use postpilot_core::capability::CapabilityRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::plan::Plan;
use crate::retry::RetryEngine;

/// Outcome of one task within a plan execution.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    /// Capability result on success.
    pub result: Option<serde_json::Value>,
    /// Failure detail on failure: last error message, attempts, and the
    /// stopping strategy — for presentation layers to render.
    pub error: Option<String>,
}

/// Summary handed back to the caller — the only value that crosses the
/// engine's boundary. Task failures live here, never as a thrown error.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub plan_id: String,
    pub completed_count: usize,
    pub failed_count: usize,
    pub outcomes: Vec<TaskOutcome>,
}

impl PlanReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }
}

/// Drives plans against the capability registry through the retry engine.
pub struct ExecutionEngine {
    registry: Arc<CapabilityRegistry>,
    retry: RetryEngine,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<CapabilityRegistry>, retry: RetryEngine) -> Self {
        Self { registry, retry }
    }

    /// Access the retry engine (error history, stats).
    pub fn retry_engine(&self) -> &RetryEngine {
        &self.retry
    }

    /// Execute a plan to completion or first permanent failure.
    pub async fn execute_plan(&mut self, plan: &Plan) -> PlanReport {
        tracing::info!(
            "🚀 Executing plan {} ({}): {} task(s), ~{} min",
            plan.id,
            plan.intent,
            plan.task_count(),
            plan.total_estimated_minutes
        );

        let mut completed: HashSet<String> = HashSet::new();
        let mut outcomes: Vec<TaskOutcome> = Vec::new();
        let mut halted_on_failure = false;

        while let Some(task) = plan.next_ready_task(&completed) {
            let max_retries = if task.retry_enabled { task.max_retries } else { 0 };
            let context = format!("plan {} task {}", plan.id, task.id);
            tracing::info!("▶ {context}: {} → '{}'", task.description, task.capability);

            let registry = Arc::clone(&self.registry);
            let capability = task.capability.clone();
            let params = task.parameters.clone();
            let op = move |_attempt: u32| {
                let registry = Arc::clone(&registry);
                let capability = capability.clone();
                let params = params.clone();
                async move { registry.invoke(&capability, &params).await }
            };

            match self.retry.execute_with_retry(&context, max_retries, op).await {
                Ok(result) => {
                    completed.insert(task.id.clone());
                    outcomes.push(TaskOutcome {
                        task_id: task.id.clone(),
                        success: true,
                        result: Some(result),
                        error: None,
                    });
                }
                Err(failure) => {
                    outcomes.push(TaskOutcome {
                        task_id: task.id.clone(),
                        success: false,
                        result: None,
                        error: Some(format!(
                            "{} ({} attempt(s), {})",
                            failure.record.message, failure.attempts, failure.strategy
                        )),
                    });
                    halted_on_failure = true;
                    if task.can_fail {
                        tracing::warn!("⚠️ {context} failed — plan halted");
                    } else {
                        tracing::error!("🛑 {context} failed and is required — plan halted");
                    }
                    // No partial-branch continuation: the first permanent
                    // failure ends the loop even for tolerated tasks.
                    break;
                }
            }
        }

        if !halted_on_failure && completed.len() < plan.task_count() {
            // next_ready_task returned None with work remaining: a cycle or
            // unsatisfiable dependency. Indistinguishable from completion at
            // the model level, so it is only logged here.
            tracing::warn!(
                "⚠️ Plan {} stopped with {}/{} tasks done and none ready (cyclic or unsatisfiable dependencies?)",
                plan.id,
                completed.len(),
                plan.task_count()
            );
        }

        let completed_count = outcomes.iter().filter(|o| o.success).count();
        let failed_count = outcomes.len() - completed_count;
        tracing::info!(
            "🏁 Plan {} finished: {} completed, {} failed",
            plan.id,
            completed_count,
            failed_count
        );

        PlanReport {
            plan_id: plan.id.clone(),
            completed_count,
            failed_count,
            outcomes,
        }
    }
}
