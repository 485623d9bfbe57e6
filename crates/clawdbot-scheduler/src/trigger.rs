//! Manual trigger gate.
//!
//! Admin-only entry point for running a job outside its schedule. Checks run
//! in order: bot enabled, command known, command allow-listed, caller is
//! admin, maintenance window, overlap guard. `force` bypasses the window and
//! the guard but still registers the run as the current holder; `preview`
//! computes the plan without mutating anything.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;

use clawdbot_core::auth::{Actor, Role, authorize};
use clawdbot_core::error::{BotError, Result};
use clawdbot_services::JobRunRecord;

use crate::engine::in_maintenance_window;
use crate::guard::OverlapGuard;
use crate::jobs::{BotCommand, JobOutcome, TriggerRequest};
use crate::retry::RetryPolicy;
use crate::runner::JobRunner;

pub struct TriggerGate {
    runner: Arc<JobRunner>,
    guard: OverlapGuard,
}

impl TriggerGate {
    pub fn new(runner: Arc<JobRunner>, guard: OverlapGuard) -> Self {
        Self { runner, guard }
    }

    /// Validate and execute a manual trigger on behalf of `actor`.
    pub async fn trigger(&self, actor: &Actor, request: &TriggerRequest) -> Result<JobOutcome> {
        let config = &self.runner.config;
        if !config.enabled {
            return Err(BotError::Validation("automation is disabled".into()));
        }

        let command = BotCommand::from_str(&request.command)?;
        if !config
            .security
            .admin_commands
            .iter()
            .any(|c| c == command.name())
        {
            return Err(BotError::Validation(format!(
                "command '{command}' is not in the admin command list"
            )));
        }
        authorize(actor.role, Role::Admin)?;

        let preview = request.preview || (config.debug.dry_run_default && !request.force);

        if command == BotCommand::SystemMaintenance
            && !preview
            && !request.force
            && !in_maintenance_window(&config.scheduler, Utc::now())
        {
            return Err(BotError::Validation(format!(
                "system-maintenance only runs between {:02}:00 and {:02}:00 local; use force to override",
                config.scheduler.maintenance_window_start_hour,
                config.scheduler.maintenance_window_end_hour
            )));
        }

        let _permit = if request.force {
            tracing::warn!("{} forced '{command}' past the overlap guard", actor.id);
            self.guard.acquire_forced(command.name())
        } else {
            self.guard.try_acquire(command.name()).ok_or_else(|| {
                BotError::OverlapSkipped(format!("'{command}' is already running"))
            })?
        };

        // Manual runs get the same timeout/retry policy as scheduled ones;
        // force only bypasses the guard and the window, never the policy.
        let retry = RetryPolicy::from_batch(&config.batch);
        let started = Utc::now();
        let result = retry
            .run(command.name(), || self.runner.run(command, preview))
            .await;

        if config.security.audit_trail {
            let record = match &result {
                Ok(outcome) => JobRunRecord {
                    command: command.name().into(),
                    triggered_by: actor.id.to_string(),
                    forced: request.force,
                    preview,
                    started_at: started,
                    finished_at: Utc::now(),
                    outcome: outcome.status().into(),
                    processed: outcome.processed,
                    affected: outcome.affected,
                    failures: outcome.failures.len() as u64,
                    detail: outcome.detail.clone(),
                },
                Err(e) => JobRunRecord {
                    command: command.name().into(),
                    triggered_by: actor.id.to_string(),
                    forced: request.force,
                    preview,
                    started_at: started,
                    finished_at: Utc::now(),
                    outcome: "failed".into(),
                    processed: 0,
                    affected: 0,
                    failures: 1,
                    detail: serde_json::json!({ "error": e.to_string() }),
                },
            };
            if let Err(e) = self.runner.audit.record_run(&record) {
                tracing::error!("failed to record trigger audit row: {e}");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdbot_core::config::BotConfig;
    use clawdbot_core::store::MemoryStore;
    use clawdbot_services::{AuditDb, MemoryTransport, NotificationService};
    use uuid::Uuid;

    fn gate_with(config: BotConfig) -> TriggerGate {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(NotificationService::new(
            config.notifications.clone(),
            Arc::new(MemoryTransport::default()),
        ));
        let runner = Arc::new(JobRunner::new(
            config,
            store.clone(),
            store,
            Arc::new(AuditDb::open_in_memory().unwrap()),
            notifications,
            vec![],
        ));
        TriggerGate::new(runner, OverlapGuard::new())
    }

    fn admin() -> Actor {
        Actor { id: Uuid::new_v4(), role: Role::Admin }
    }

    fn req(command: &str) -> TriggerRequest {
        TriggerRequest {
            command: command.into(),
            parameters: None,
            force: false,
            preview: false,
        }
    }

    #[tokio::test]
    async fn test_non_admin_rejected() {
        let gate = gate_with(BotConfig::default());
        let agent = Actor { id: Uuid::new_v4(), role: Role::Agent };
        let err = gate.trigger(&agent, &req("status")).await.unwrap_err();
        assert!(matches!(err, BotError::Authorization));
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let gate = gate_with(BotConfig::default());
        let err = gate.trigger(&admin(), &req("wipe-everything")).await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
    }

    #[tokio::test]
    async fn test_command_outside_allowlist_rejected() {
        let mut config = BotConfig::default();
        config.security.admin_commands.retain(|c| c != "analytics");
        let gate = gate_with(config);
        let err = gate.trigger(&admin(), &req("analytics")).await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
    }

    #[tokio::test]
    async fn test_disabled_bot_refuses() {
        let config = BotConfig { enabled: false, ..Default::default() };
        let gate = gate_with(config);
        let err = gate.trigger(&admin(), &req("status")).await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
    }

    #[tokio::test]
    async fn test_trigger_runs_and_audits() {
        let gate = gate_with(BotConfig::default());
        let outcome = gate.trigger(&admin(), &req("status")).await.unwrap();
        assert_eq!(outcome.command, BotCommand::Status);
        let runs = gate.runner.audit.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["command"], "status");
    }

    #[tokio::test]
    async fn test_overlap_rejected_without_force() {
        let gate = gate_with(BotConfig::default());
        let _held = gate.guard.try_acquire("status").unwrap();
        let err = gate.trigger(&admin(), &req("status")).await.unwrap_err();
        assert!(matches!(err, BotError::OverlapSkipped(_)));

        // force goes through anyway
        let mut forced = req("status");
        forced.force = true;
        assert!(gate.trigger(&admin(), &forced).await.is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_default_makes_preview() {
        let mut config = BotConfig::default();
        config.debug.dry_run_default = true;
        let gate = gate_with(config);
        let outcome = gate.trigger(&admin(), &req("property-cleanup")).await.unwrap();
        assert!(outcome.preview);
    }

    #[tokio::test]
    async fn test_manual_run_retries_transient_storage_failure() {
        use std::sync::atomic::{AtomicU32, Ordering};

        use chrono::{DateTime, Utc};
        use clawdbot_core::domain::{Property, PropertyStatus};
        use clawdbot_core::error::Result;
        use clawdbot_core::store::PropertyStore;

        struct FlakyStore {
            inner: MemoryStore,
            calls: AtomicU32,
        }

        impl PropertyStore for FlakyStore {
            fn all(&self) -> Result<Vec<Property>> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(BotError::Storage("transient".into()));
                }
                self.inner.all()
            }
            fn get(&self, id: Uuid) -> Result<Option<Property>> {
                self.inner.get(id)
            }
            fn insert(&self, property: Property) -> Result<()> {
                self.inner.insert(property)
            }
            fn set_status(&self, id: Uuid, status: PropertyStatus) -> Result<()> {
                self.inner.set_status(id, status)
            }
            fn record_suggestion(
                &self,
                id: Uuid,
                suggested_price: Option<i64>,
                ai_description: Option<String>,
            ) -> Result<()> {
                self.inner.record_suggestion(id, suggested_price, ai_description)
            }
            fn created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize> {
                self.inner.created_between(from, to)
            }
        }

        let mut config = BotConfig::default();
        config.batch.retry_delay_secs = 0;
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            calls: AtomicU32::new(0),
        });
        let notifications = Arc::new(NotificationService::new(
            config.notifications.clone(),
            Arc::new(MemoryTransport::default()),
        ));
        let runner = Arc::new(JobRunner::new(
            config,
            flaky.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(AuditDb::open_in_memory().unwrap()),
            notifications,
            vec![],
        ));
        let gate = TriggerGate::new(runner, OverlapGuard::new());

        let outcome = gate.trigger(&admin(), &req("status")).await.unwrap();
        assert_eq!(outcome.command, BotCommand::Status);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_maintenance_window_enforced() {
        let mut config = BotConfig::default();
        // Pin the window so "now" is always outside it: zero-width window
        config.scheduler.maintenance_window_start_hour = 0;
        config.scheduler.maintenance_window_end_hour = 0;
        let gate = gate_with(config);
        let err = gate
            .trigger(&admin(), &req("system-maintenance"))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));

        let mut forced = req("system-maintenance");
        forced.force = true;
        assert!(gate.trigger(&admin(), &forced).await.is_ok());
    }
}
