//! ClawDBot automation services.
//!
//! Stateless-by-construction services used by the scheduler jobs and the
//! gateway: listing validation, lifecycle maintenance, analytics, reports,
//! notifications, AI suggestions, and the SQLite audit trail they all write
//! into.

pub mod analytics;
pub mod audit;
pub mod maintenance;
pub mod notification;
pub mod report;
pub mod suggestion;
pub mod validation;

pub use analytics::{AnalyticsReport, AnalyticsRequest, AnalyticsService, Period};
pub use audit::{AuditDb, JobRunRecord};
pub use maintenance::{MaintenanceOutcome, MaintenancePlan, MaintenanceService};
pub use notification::{
    Channel, ChannelTransport, DispatchOutcome, MemoryTransport, Notice, NotificationService,
};
pub use report::{DailySummary, ReportService, WeeklyReport};
pub use suggestion::{AiProvider, OpenAiProvider, StaticProvider, SuggestionService};
pub use validation::{ValidationService, ValidationVerdict};
