//! ClawDBot job scheduler.
//!
//! Cron-planned background jobs with overlap protection, linear-backoff
//! retries, and an admin-only manual trigger gate. Scheduled and manual runs
//! share one [`OverlapGuard`] keyed by command name, so the same job never
//! runs twice concurrently no matter who started it.

pub mod cron;
pub mod engine;
pub mod guard;
pub mod jobs;
pub mod retry;
pub mod runner;
pub mod trigger;

pub use cron::next_run_from_cron;
pub use engine::{SchedulerEngine, in_maintenance_window};
pub use guard::{OverlapGuard, RunPermit};
pub use jobs::{BotCommand, JobOutcome, TriggerRequest};
pub use retry::RetryPolicy;
pub use runner::JobRunner;
pub use trigger::TriggerGate;
