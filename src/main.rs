//! PostPilot CLI — wires the orchestration core together.
//!
//! The capabilities registered here are demo stubs; real providers (post
//! generation, email delivery, CRM) are wired in by the hosting service.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::Mutex;

use postpilot_core::capability::{Capability, CapabilityRegistry};
use postpilot_core::config::PostPilotConfig;
use postpilot_core::error::Result;
use postpilot_orchestrator::{ExecutionEngine, Plan, RetryEngine};
use postpilot_scheduler::{Frequency, ScheduledTask, SchedulerEngine, spawn_scheduler};

#[derive(Parser)]
#[command(name = "postpilot", version, about = "Content-production automation backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler poll loop.
    Run {
        /// Poll interval in seconds (overrides config).
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Schedule a deferred or recurring task.
    Schedule {
        description: String,
        #[arg(long)]
        capability: String,
        /// JSON object passed to the capability.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Minutes from now until the first execution.
        #[arg(long, default_value_t = 0)]
        in_minutes: i64,
        /// once | daily | weekly | biweekly | monthly
        #[arg(long, default_value = "once")]
        frequency: String,
        #[arg(long)]
        max_executions: Option<u32>,
    },
    /// List scheduled tasks.
    Tasks,
    /// Cancel a scheduled task (pre-dispatch only).
    Cancel { id: String },
    /// Build and execute a client onboarding plan.
    Onboard { client: String },
    /// Build and execute a batch plan over pending work.
    Batch {
        #[arg(long)]
        overdue: Vec<String>,
        #[arg(long)]
        revision: Vec<String>,
        #[arg(long)]
        deliverable: Vec<String>,
        #[arg(long)]
        feedback: Vec<String>,
    },
}

/// Stand-in capability: logs the call and reports success.
struct DemoCapability {
    name: &'static str,
}

#[async_trait]
impl Capability for DemoCapability {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        tracing::info!("✨ [{}] invoked with {params}", self.name);
        Ok(serde_json::json!({"capability": self.name, "status": "ok"}))
    }
}

fn demo_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    for name in [
        "create_client",
        "generate_brief",
        "generate_posts",
        "revise_posts",
        "deliver_posts",
        "send_email",
        "request_feedback",
    ] {
        registry.register(Arc::new(DemoCapability { name }));
    }
    registry
}

async fn execute_and_report(config: &PostPilotConfig, plan: Plan) -> anyhow::Result<()> {
    let registry = Arc::new(demo_registry());
    let retry = RetryEngine::new(&config.retry);
    let mut engine = ExecutionEngine::new(registry, retry);
    if plan.requires_confirmation {
        tracing::info!("ℹ️ Plan '{}' requires confirmation — running non-interactively", plan.intent);
    }
    let report = engine.execute_plan(&plan).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = PostPilotConfig::load()?;

    match cli.command {
        Commands::Run { interval } => {
            let interval = interval.unwrap_or(config.scheduler.poll_interval_secs);
            let scheduler = SchedulerEngine::open(&config.scheduler.resolved_db_path())?;
            let registry = Arc::new(demo_registry());

            let execute = move |task: ScheduledTask| {
                let registry = Arc::clone(&registry);
                async move {
                    registry
                        .invoke(&task.capability, &task.parameters)
                        .await
                        .map(|v| v.to_string())
                        .map_err(|e| e.to_string())
                }
            };

            spawn_scheduler(Arc::new(Mutex::new(scheduler)), execute, interval).await;
            Ok(())
        }
        Commands::Schedule {
            description,
            capability,
            params,
            in_minutes,
            frequency,
            max_executions,
        } => {
            let frequency = Frequency::parse(&frequency)
                .ok_or_else(|| anyhow::anyhow!("unknown frequency '{frequency}'"))?;
            let params: serde_json::Value = serde_json::from_str(&params)?;
            let scheduler = SchedulerEngine::open(&config.scheduler.resolved_db_path())?;
            let task = scheduler.schedule_in(
                &description,
                &capability,
                params,
                chrono::Duration::minutes(in_minutes),
                frequency,
                max_executions,
            )?;
            println!("{}", task.id);
            Ok(())
        }
        Commands::Tasks => {
            let scheduler = SchedulerEngine::open(&config.scheduler.resolved_db_path())?;
            for task in scheduler.list_tasks()? {
                println!(
                    "{} [{}] '{}' → {} @ {} ({})",
                    task.id,
                    task.status,
                    task.description,
                    task.capability,
                    task.effective_time(),
                    task.frequency
                );
            }
            Ok(())
        }
        Commands::Cancel { id } => {
            let scheduler = SchedulerEngine::open(&config.scheduler.resolved_db_path())?;
            if scheduler.cancel(&id)? {
                println!("cancelled {id}");
            } else {
                println!("no task with id {id}");
            }
            Ok(())
        }
        Commands::Onboard { client } => {
            execute_and_report(&config, Plan::onboarding(&client)).await
        }
        Commands::Batch {
            overdue,
            revision,
            deliverable,
            feedback,
        } => {
            let plan = Plan::batch(&overdue, &revision, &deliverable, &feedback);
            execute_and_report(&config, plan).await
        }
    }
}
