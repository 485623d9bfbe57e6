//! Command bodies.
//!
//! One entry point, [`JobRunner::run`], shared by scheduled ticks and manual
//! triggers. Preview runs compute the same plan as real runs but never touch
//! the stores; per-item failures are collected, never fatal to the batch.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use clawdbot_core::config::BotConfig;
use clawdbot_core::domain::PropertyStatus;
use clawdbot_core::error::Result;
use clawdbot_core::store::{EnquiryStore, PropertyStore};
use clawdbot_services::{
    AnalyticsRequest, AnalyticsService, AuditDb, MaintenanceService, Notice, NotificationService,
    Period, ReportService, ValidationService,
};

use crate::jobs::{BotCommand, JobOutcome};

/// Everything a job body needs, wired once at startup.
pub struct JobRunner {
    pub config: BotConfig,
    pub properties: Arc<dyn PropertyStore>,
    pub enquiries: Arc<dyn EnquiryStore>,
    pub audit: Arc<AuditDb>,
    pub notifications: Arc<NotificationService>,
    pub analytics: Arc<AnalyticsService>,
    maintenance: MaintenanceService,
    validation: ValidationService,
    reports: ReportService,
    /// Admin user ids that receive generated reports.
    pub admin_recipients: Vec<Uuid>,
}

impl JobRunner {
    pub fn new(
        config: BotConfig,
        properties: Arc<dyn PropertyStore>,
        enquiries: Arc<dyn EnquiryStore>,
        audit: Arc<AuditDb>,
        notifications: Arc<NotificationService>,
        admin_recipients: Vec<Uuid>,
    ) -> Self {
        let maintenance = MaintenanceService::new(config.property.clone());
        let validation = ValidationService::new(config.property.clone());
        let analytics = Arc::new(AnalyticsService::new(config.analytics.clone()));
        Self {
            config,
            properties,
            enquiries,
            audit,
            notifications,
            analytics,
            maintenance,
            validation,
            reports: ReportService::new(),
            admin_recipients,
        }
    }

    /// Execute one command. Errors here are job-level (store down, config
    /// broken); per-item problems land in `outcome.failures`.
    pub async fn run(&self, command: BotCommand, preview: bool) -> Result<JobOutcome> {
        let started = Instant::now();
        let mut outcome = JobOutcome {
            command,
            preview,
            processed: 0,
            affected: 0,
            failures: vec![],
            duration_ms: 0,
            detail: json!({}),
        };

        match command {
            BotCommand::Status => self.run_status(&mut outcome)?,
            BotCommand::DailySummary => self.run_daily_summary(&mut outcome).await?,
            BotCommand::WeeklyReport => self.run_weekly_report(&mut outcome).await?,
            BotCommand::PropertyCleanup => self.run_property_cleanup(&mut outcome)?,
            BotCommand::ExpiryNotifier => self.run_expiry_notifier(&mut outcome).await?,
            BotCommand::SystemMaintenance => self.run_system_maintenance(&mut outcome).await?,
            BotCommand::Analytics => self.run_analytics(&mut outcome)?,
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "{command} finished: {} ({} processed, {} affected, {} failure(s), {}ms)",
            outcome.status(),
            outcome.processed,
            outcome.affected,
            outcome.failures.len(),
            outcome.duration_ms
        );
        Ok(outcome)
    }

    fn run_status(&self, outcome: &mut JobOutcome) -> Result<()> {
        let all = self.properties.all()?;
        let mut by_status = std::collections::HashMap::new();
        for p in &all {
            *by_status.entry(p.status.to_string()).or_insert(0u64) += 1;
        }
        outcome.processed = all.len() as u64;
        outcome.detail = json!({
            "enabled": self.config.enabled,
            "scheduler_enabled": self.config.scheduler.enabled,
            "listings": by_status,
            "enquiries": self.enquiries.all()?.len(),
            "queued_notifications": self.notifications.queued_len(),
            "recent_runs": self.audit.recent_runs(5)?,
        });
        Ok(())
    }

    async fn run_daily_summary(&self, outcome: &mut JobOutcome) -> Result<()> {
        let summary = self
            .reports
            .daily(&*self.properties, &*self.enquiries, &self.audit, Utc::now())?;
        outcome.processed = 1;
        outcome.detail = serde_json::to_value(&summary).unwrap_or_default();
        if !outcome.preview {
            outcome.affected = self
                .deliver_to_admins("Daily summary", &summary.render())
                .await;
        }
        Ok(())
    }

    async fn run_weekly_report(&self, outcome: &mut JobOutcome) -> Result<()> {
        let report = self
            .reports
            .weekly(&*self.properties, &*self.enquiries, &self.audit, Utc::now())?;
        outcome.processed = 1;
        outcome.detail = serde_json::to_value(&report).unwrap_or_default();
        if !outcome.preview {
            outcome.affected = self
                .deliver_to_admins("Weekly report", &report.render())
                .await;
        }
        Ok(())
    }

    fn run_property_cleanup(&self, outcome: &mut JobOutcome) -> Result<()> {
        let all = self.properties.all()?;
        outcome.processed = all.len() as u64;
        let plan = self.maintenance.classify(&all, Utc::now());
        outcome.detail = json!({
            "deactivate": plan.deactivate.len(),
            "purge": plan.purge.len(),
        });
        if outcome.preview {
            outcome.affected = (plan.deactivate.len() + plan.purge.len()) as u64;
            return Ok(());
        }
        let applied = self.maintenance.apply(&plan, &*self.properties)?;
        outcome.affected = applied.deactivated + applied.purged;
        outcome.failures = applied
            .failures
            .iter()
            .map(|(id, e)| format!("{id}: {e}"))
            .collect();
        Ok(())
    }

    async fn run_expiry_notifier(&self, outcome: &mut JobOutcome) -> Result<()> {
        let all = self.properties.all()?;
        outcome.processed = all.len() as u64;
        let plan = self.maintenance.classify(&all, Utc::now());
        outcome.detail = json!({ "warnings": plan.warn.len() });
        if outcome.preview {
            outcome.affected = plan.warn.len() as u64;
            return Ok(());
        }
        for warning in &plan.warn {
            let notice = Notice::new(
                warning.agent_id,
                "Listing expires soon",
                &format!(
                    "Your listing {} expires in {} day(s). Renew it to keep it live.",
                    warning.property_id, warning.days_left
                ),
            );
            self.notifications.notify(notice).await;
            outcome.affected += 1;
        }
        Ok(())
    }

    async fn run_system_maintenance(&self, outcome: &mut JobOutcome) -> Result<()> {
        let all = self.properties.all()?;
        outcome.processed = all.len() as u64;

        let mut suspicious = Vec::new();
        for p in all.iter().filter(|p| p.status == PropertyStatus::Active) {
            let verdict = self.validation.validate(p, &all);
            if verdict.suspicious {
                suspicious.push(json!({
                    "property_id": verdict.property_id,
                    "reasons": verdict.reasons,
                }));
            }
        }
        outcome.affected = suspicious.len() as u64;

        let flushed = if outcome.preview {
            0
        } else {
            self.notifications.flush_queued().await?
        };
        outcome.detail = json!({
            "suspicious": suspicious,
            "notifications_flushed": flushed,
        });
        Ok(())
    }

    fn run_analytics(&self, outcome: &mut JobOutcome) -> Result<()> {
        let request = AnalyticsRequest {
            period: Period::Daily,
            start_date: None,
            end_date: None,
            limit: None,
        };
        let report = self.analytics.query(
            &request,
            &*self.properties,
            &*self.enquiries,
            &self.audit,
        )?;
        outcome.processed = 1;
        outcome.detail = serde_json::to_value(&report).unwrap_or_default();
        Ok(())
    }

    async fn deliver_to_admins(&self, subject: &str, body: &str) -> u64 {
        let mut sent = 0;
        for admin in &self.admin_recipients {
            self.notifications.notify(Notice::new(*admin, subject, body)).await;
            sent += 1;
        }
        sent
    }
}
