//! # PostPilot Scheduler
//!
//! Durable deferred/recurring work, independent of in-memory plans.
//! SQLite persistence — survives restarts, supports concurrent pollers via
//! an atomic claim step.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval poll loop)
//!   ├── claim_due_tasks(now)       — atomic pending→running transition
//!   ├── executor callback          — runs the task's capability
//!   └── mark_executed(...)         — advance-or-complete bookkeeping
//! ```

pub mod engine;
pub mod store;
pub mod tasks;

pub use engine::{SchedulerEngine, spawn_scheduler};
pub use store::SchedulerStore;
pub use tasks::{Frequency, ScheduledStatus, ScheduledTask};
