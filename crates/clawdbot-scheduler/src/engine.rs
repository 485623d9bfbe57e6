//! Scheduler engine.
//!
//! Holds the job table (default crons merged with config overrides), wakes
//! every `check_interval_secs`, and spawns due jobs on independent tasks so
//! a slow job never delays the others. The overlap guard is shared with the
//! manual trigger gate; whoever holds a command's slot, the other path skips.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};

use clawdbot_core::config::SchedulerConfig;
use clawdbot_services::JobRunRecord;

use crate::cron::next_run_from_cron;
use crate::guard::OverlapGuard;
use crate::jobs::BotCommand;
use crate::retry::RetryPolicy;
use crate::runner::JobRunner;

/// System maintenance only runs inside the configured local-hour window.
/// The "local" clock is UTC plus a fixed configured offset.
pub fn in_maintenance_window(config: &SchedulerConfig, now: DateTime<Utc>) -> bool {
    let local_hour = (now.hour() as i32 + config.timezone_offset_hours).rem_euclid(24) as u32;
    let start = config.maintenance_window_start_hour;
    let end = config.maintenance_window_end_hour;
    if start <= end {
        local_hour >= start && local_hour < end
    } else {
        // Overnight window, e.g. 22..2
        local_hour >= start || local_hour < end
    }
}

struct ScheduledJob {
    command: BotCommand,
    cron: String,
    next_run: Option<DateTime<Utc>>,
}

pub struct SchedulerEngine {
    runner: Arc<JobRunner>,
    guard: OverlapGuard,
    retry: RetryPolicy,
    jobs: Vec<ScheduledJob>,
}

impl SchedulerEngine {
    /// Build the job table from defaults plus `scheduler.cron_overrides`.
    pub fn new(runner: Arc<JobRunner>, guard: OverlapGuard) -> Self {
        let config = &runner.config;
        let retry = RetryPolicy::from_batch(&config.batch);
        let now = Utc::now();

        let mut jobs = Vec::new();
        for command in BotCommand::all() {
            let cron = config
                .scheduler
                .cron_overrides
                .get(command.name())
                .cloned()
                .or_else(|| command.default_cron().map(String::from));
            let Some(cron) = cron else { continue };
            let next_run = next_run_from_cron(&cron, now);
            if next_run.is_none() {
                tracing::error!("unschedulable cron '{cron}' for {command}; job disabled");
            }
            jobs.push(ScheduledJob { command, cron, next_run });
        }
        tracing::info!("scheduler loaded {} job(s)", jobs.len());

        Self { runner, guard, retry, jobs }
    }

    /// Commands due at `now`; advances their next-run times.
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<BotCommand> {
        let mut due = Vec::new();
        for job in &mut self.jobs {
            if let Some(at) = job.next_run
                && at <= now
            {
                due.push(job.command);
                job.next_run = next_run_from_cron(&job.cron, now);
            }
        }
        due
    }

    /// Run forever. Intended to be spawned as its own task.
    pub async fn run(mut self) {
        if !self.runner.config.scheduler.enabled || !self.runner.config.enabled {
            tracing::info!("scheduler disabled, not starting");
            return;
        }
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
            self.runner.config.scheduler.check_interval_secs.max(1),
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Utc::now();
            for command in self.take_due(now) {
                self.dispatch(command, now);
            }
        }
    }

    /// Launch one due job, honoring the window and the overlap guard.
    fn dispatch(&self, command: BotCommand, now: DateTime<Utc>) {
        let config = &self.runner.config;

        if command == BotCommand::SystemMaintenance
            && !in_maintenance_window(&config.scheduler, now)
        {
            tracing::debug!("{command} due but outside the maintenance window, skipping");
            return;
        }

        let permit = if config.scheduler.overlap_protection {
            match self.guard.try_acquire(command.name()) {
                Some(p) => Some(p),
                None => {
                    tracing::warn!("{command} still running from a previous trigger, skipping");
                    self.record_skip(command, now);
                    return;
                }
            }
        } else {
            None
        };

        let runner = self.runner.clone();
        let retry = self.retry;
        tokio::spawn(async move {
            let _permit = permit;
            let started = Utc::now();
            let result = retry
                .run(command.name(), || runner.run(command, false))
                .await;

            match &result {
                Ok(outcome) => {
                    if runner.config.security.audit_trail {
                        let record = JobRunRecord {
                            command: command.name().into(),
                            triggered_by: "scheduler".into(),
                            forced: false,
                            preview: false,
                            started_at: started,
                            finished_at: Utc::now(),
                            outcome: outcome.status().into(),
                            processed: outcome.processed,
                            affected: outcome.affected,
                            failures: outcome.failures.len() as u64,
                            detail: outcome.detail.clone(),
                        };
                        if let Err(e) = runner.audit.record_run(&record) {
                            tracing::error!("failed to record run for {command}: {e}");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("{command} failed after retries: {e}");
                    if runner.config.security.audit_trail {
                        let record = JobRunRecord {
                            command: command.name().into(),
                            triggered_by: "scheduler".into(),
                            forced: false,
                            preview: false,
                            started_at: started,
                            finished_at: Utc::now(),
                            outcome: "failed".into(),
                            processed: 0,
                            affected: 0,
                            failures: 1,
                            detail: serde_json::json!({ "error": e.to_string() }),
                        };
                        let _ = runner.audit.record_run(&record);
                    }
                }
            }
        });
    }

    fn record_skip(&self, command: BotCommand, now: DateTime<Utc>) {
        if !self.runner.config.security.audit_trail {
            return;
        }
        let record = JobRunRecord {
            command: command.name().into(),
            triggered_by: "scheduler".into(),
            forced: false,
            preview: false,
            started_at: now,
            finished_at: now,
            outcome: "skipped".into(),
            processed: 0,
            affected: 0,
            failures: 0,
            detail: serde_json::json!({ "reason": "overlap" }),
        };
        if let Err(e) = self.runner.audit.record_run(&record) {
            tracing::error!("failed to record skip for {command}: {e}");
        }
    }
}
