//! Job catalogue: the commands the bot knows how to run.
//!
//! Scheduled runs and manual triggers name the same commands; the string
//! form here is the name that appears in configs, trigger payloads, and the
//! audit trail.

use serde::{Deserialize, Serialize};

use clawdbot_core::error::BotError;

/// Everything the bot can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BotCommand {
    Status,
    DailySummary,
    WeeklyReport,
    PropertyCleanup,
    ExpiryNotifier,
    SystemMaintenance,
    Analytics,
}

impl BotCommand {
    pub fn all() -> [BotCommand; 7] {
        [
            Self::Status,
            Self::DailySummary,
            Self::WeeklyReport,
            Self::PropertyCleanup,
            Self::ExpiryNotifier,
            Self::SystemMaintenance,
            Self::Analytics,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::DailySummary => "daily-summary",
            Self::WeeklyReport => "weekly-report",
            Self::PropertyCleanup => "property-cleanup",
            Self::ExpiryNotifier => "expiry-notifier",
            Self::SystemMaintenance => "system-maintenance",
            Self::Analytics => "analytics",
        }
    }

    /// Default schedule, overridable via `scheduler.cron_overrides`.
    /// `status` has no schedule: it only runs on demand.
    pub fn default_cron(&self) -> Option<&'static str> {
        match self {
            Self::Status => None,
            Self::DailySummary => Some("0 7 * * *"),
            Self::WeeklyReport => Some("0 8 * * 1"),
            Self::PropertyCleanup => Some("30 2 * * *"),
            Self::ExpiryNotifier => Some("0 9 * * *"),
            Self::SystemMaintenance => Some("0 3 * * *"),
            Self::Analytics => Some("0 * * * *"),
        }
    }

    /// Whether this command mutates listings. Status/report/analytics runs
    /// are read-only regardless of preview.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::PropertyCleanup | Self::SystemMaintenance)
    }
}

impl std::fmt::Display for BotCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for BotCommand {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| BotError::Validation(format!("unknown command '{s}'")))
    }
}

/// Manual trigger payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub command: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    /// Bypass the overlap guard and the maintenance window.
    #[serde(default)]
    pub force: bool,
    /// Compute what the run would do without mutating anything.
    #[serde(default)]
    pub preview: bool,
}

/// Result of one executed command.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub command: BotCommand,
    pub preview: bool,
    /// Items examined.
    pub processed: u64,
    /// Items changed (or that would change, in preview).
    pub affected: u64,
    /// Per-item failure descriptions.
    pub failures: Vec<String>,
    pub duration_ms: u64,
    pub detail: serde_json::Value,
}

impl JobOutcome {
    pub fn status(&self) -> &'static str {
        if !self.failures.is_empty() && self.affected == 0 && self.processed > 0 {
            "failed"
        } else if !self.failures.is_empty() {
            "partial"
        } else {
            "ok"
        }
    }
}
