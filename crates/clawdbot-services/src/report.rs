//! Daily and weekly report builders.
//!
//! Reports are plain data plus a rendered text body; dispatching them to
//! admins goes through the notification service, and the scheduler decides
//! when they run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use clawdbot_core::domain::{EnquiryStatus, PropertyStatus};
use clawdbot_core::error::Result;
use clawdbot_core::store::{EnquiryStore, PropertyStore};

use crate::audit::AuditDb;

/// Activity snapshot for the last 24 hours.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub new_properties: usize,
    pub new_enquiries: usize,
    pub open_enquiries: usize,
    pub active_listings: usize,
    pub pending_listings: usize,
    pub ai_requests: u64,
    pub ai_tokens: u64,
}

impl DailySummary {
    /// Render the email/notification body.
    pub fn render(&self) -> String {
        format!(
            "Daily summary for {}\n\
             New listings: {}\n\
             New enquiries: {}\n\
             Open enquiries: {}\n\
             Active listings: {}\n\
             Pending listings: {}\n\
             AI requests: {} ({} tokens)",
            self.generated_at.format("%Y-%m-%d"),
            self.new_properties,
            self.new_enquiries,
            self.open_enquiries,
            self.active_listings,
            self.pending_listings,
            self.ai_requests,
            self.ai_tokens,
        )
    }
}

/// Seven-day roll-up with sales outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub new_properties: usize,
    pub new_enquiries: usize,
    pub sold: usize,
    pub rented: usize,
    pub deactivated: usize,
    pub ai_requests: u64,
    pub ai_tokens: u64,
}

impl WeeklyReport {
    pub fn render(&self) -> String {
        format!(
            "Weekly report ({} to {})\n\
             New listings: {}\n\
             New enquiries: {}\n\
             Sold: {}\n\
             Rented: {}\n\
             Deactivated: {}\n\
             AI requests: {} ({} tokens)",
            self.window_start.format("%Y-%m-%d"),
            self.generated_at.format("%Y-%m-%d"),
            self.new_properties,
            self.new_enquiries,
            self.sold,
            self.rented,
            self.deactivated,
            self.ai_requests,
            self.ai_tokens,
        )
    }
}

#[derive(Default)]
pub struct ReportService;

impl ReportService {
    pub fn new() -> Self {
        Self
    }

    pub fn daily(
        &self,
        properties: &dyn PropertyStore,
        enquiries: &dyn EnquiryStore,
        audit: &AuditDb,
        now: DateTime<Utc>,
    ) -> Result<DailySummary> {
        let from = now - Duration::days(1);
        let all = properties.all()?;
        let open = enquiries
            .all()?
            .iter()
            .filter(|e| e.status != EnquiryStatus::Closed)
            .count();
        let (ai_requests, ai_tokens) = audit.ai_usage_between(from, now)?;

        Ok(DailySummary {
            generated_at: now,
            window_start: from,
            new_properties: properties.created_between(from, now)?,
            new_enquiries: enquiries.created_between(from, now)?,
            open_enquiries: open,
            active_listings: count_status(&all, PropertyStatus::Active),
            pending_listings: count_status(&all, PropertyStatus::Pending),
            ai_requests,
            ai_tokens,
        })
    }

    pub fn weekly(
        &self,
        properties: &dyn PropertyStore,
        enquiries: &dyn EnquiryStore,
        audit: &AuditDb,
        now: DateTime<Utc>,
    ) -> Result<WeeklyReport> {
        let from = now - Duration::weeks(1);
        let all = properties.all()?;
        // Status changes this week, approximated by updated_at falling inside
        // the window. Good enough until the store grows a transition log.
        let changed_this_week = |p: &&clawdbot_core::domain::Property, s: PropertyStatus| {
            p.status == s && p.updated_at >= from && p.updated_at < now
        };
        let (ai_requests, ai_tokens) = audit.ai_usage_between(from, now)?;

        Ok(WeeklyReport {
            generated_at: now,
            window_start: from,
            new_properties: properties.created_between(from, now)?,
            new_enquiries: enquiries.created_between(from, now)?,
            sold: all.iter().filter(|p| changed_this_week(p, PropertyStatus::Sold)).count(),
            rented: all.iter().filter(|p| changed_this_week(p, PropertyStatus::Rented)).count(),
            deactivated: all
                .iter()
                .filter(|p| changed_this_week(p, PropertyStatus::Inactive))
                .count(),
            ai_requests,
            ai_tokens,
        })
    }
}

fn count_status(all: &[clawdbot_core::domain::Property], status: PropertyStatus) -> usize {
    all.iter().filter(|p| p.status == status).count()
}
