//! ClawDBot configuration system.
//!
//! One immutable `BotConfig` is loaded at startup and handed to every service
//! at construction. There are no ambient lookups: if a knob exists, it is a
//! field here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Master switch — when false the scheduler and trigger gate refuse work.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub property: PropertyConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

fn bool_true() -> bool { true }
fn default_log_level() -> String { "info".into() }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
            gateway: GatewayConfig::default(),
            queue: QueueConfig::default(),
            notifications: NotificationsConfig::default(),
            scheduler: SchedulerConfig::default(),
            batch: BatchConfig::default(),
            property: PropertyConfig::default(),
            analytics: AnalyticsConfig::default(),
            ai: AiConfig::default(),
            security: SecurityConfig::default(),
            storage: StorageConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load config from `CLAWDBOT_CONFIG` or the default path.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CLAWDBOT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("loading config from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| BotError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BotError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BotError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path (~/.clawdbot/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the ClawDBot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clawdbot")
    }
}

/// HTTP gateway bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 4460 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Queue connection + named queues. The queue runtime itself is an external
/// collaborator; these names are handed to the injected dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_connection")]
    pub connection: String,
    #[serde(default = "default_notifications_queue")]
    pub notifications_queue: String,
    #[serde(default = "default_reports_queue")]
    pub reports_queue: String,
    #[serde(default = "default_maintenance_queue")]
    pub maintenance_queue: String,
}

fn default_queue_connection() -> String { "local".into() }
fn default_notifications_queue() -> String { "clawdbot-notifications".into() }
fn default_reports_queue() -> String { "clawdbot-reports".into() }
fn default_maintenance_queue() -> String { "clawdbot-maintenance".into() }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connection: default_queue_connection(),
            notifications_queue: default_notifications_queue(),
            reports_queue: default_reports_queue(),
            maintenance_queue: default_maintenance_queue(),
        }
    }
}

/// Per-channel notification toggles + rate budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "bool_true")]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default = "bool_true")]
    pub database: bool,
    /// Per-recipient budget within one minute.
    #[serde(default = "default_per_minute")]
    pub max_per_recipient_per_minute: u32,
    /// Per-recipient budget within one hour.
    #[serde(default = "default_per_hour")]
    pub max_per_recipient_per_hour: u32,
    /// What to do when a recipient's budget is exhausted: "queue" or "drop".
    #[serde(default = "default_overflow_policy")]
    pub overflow_policy: String,
}

fn default_per_minute() -> u32 { 10 }
fn default_per_hour() -> u32 { 100 }
fn default_overflow_policy() -> String { "queue".into() }

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            email: true,
            sms: false,
            push: false,
            database: true,
            max_per_recipient_per_minute: default_per_minute(),
            max_per_recipient_per_hour: default_per_hour(),
            overflow_policy: default_overflow_policy(),
        }
    }
}

/// Scheduler behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// How often the engine checks for due jobs.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Skip a trigger when the previous run of the same job is still going.
    #[serde(default = "bool_true")]
    pub overlap_protection: bool,
    /// System maintenance only runs inside this local-hour window.
    #[serde(default = "default_window_start")]
    pub maintenance_window_start_hour: u32,
    #[serde(default = "default_window_end")]
    pub maintenance_window_end_hour: u32,
    /// Fixed UTC offset in hours for "local time" decisions.
    #[serde(default)]
    pub timezone_offset_hours: i32,
    /// Cron expression overrides, keyed by command name.
    #[serde(default)]
    pub cron_overrides: std::collections::HashMap<String, String>,
}

fn default_check_interval() -> u64 { 30 }
fn default_window_start() -> u32 { 2 }
fn default_window_end() -> u32 { 4 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_check_interval(),
            overlap_protection: true,
            maintenance_window_start_hour: default_window_start(),
            maintenance_window_end_hour: default_window_end(),
            timezone_offset_hours: 0,
            cron_overrides: Default::default(),
        }
    }
}

/// Batch processing limits shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    /// Bounded timeout for any single external call (AI provider, channel).
    #[serde(default = "default_batch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retries; grows linearly per attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_batch_size() -> usize { 100 }
fn default_batch_timeout() -> u64 { 300 }
fn default_memory_limit() -> u64 { 256 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> u64 { 60 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            timeout_secs: default_batch_timeout(),
            memory_limit_mb: default_memory_limit(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Property-management thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConfig {
    /// Days before expiry at which warnings go out.
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: Vec<i64>,
    /// Days without activity before an active listing is deactivated.
    #[serde(default = "default_inactive_days")]
    pub inactive_days: i64,
    /// Days after deactivation before a listing is purged.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: i64,
    #[serde(default = "bool_true")]
    pub validation_enabled: bool,
    #[serde(default = "bool_true")]
    pub suspicious_detection: bool,
}

fn default_expiry_warning_days() -> Vec<i64> { vec![7, 3] }
fn default_inactive_days() -> i64 { 30 }
fn default_cleanup_days() -> i64 { 90 }

impl Default for PropertyConfig {
    fn default() -> Self {
        Self {
            expiry_warning_days: default_expiry_warning_days(),
            inactive_days: default_inactive_days(),
            cleanup_days: default_cleanup_days(),
            validation_enabled: true,
            suspicious_detection: true,
        }
    }
}

/// Analytics retention + caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_export_formats")]
    pub export_formats: Vec<String>,
}

fn default_retention_days() -> i64 { 365 }
fn default_cache_ttl() -> u64 { 3600 }
fn default_export_formats() -> Vec<String> {
    vec!["json".into(), "csv".into()]
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            cache_ttl_secs: default_cache_ttl(),
            export_formats: default_export_formats(),
        }
    }
}

/// AI provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
}

fn default_ai_provider() -> String { "openai".into() }
fn default_ai_model() -> String { "gpt-4o-mini".into() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.7 }

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_ai_provider(),
            model: default_ai_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key: String::new(),
            endpoint: String::new(),
        }
    }
}

/// Security settings: command allow-list, rate ceilings, IP allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Commands an admin may trigger manually. Exact matches only.
    #[serde(default = "default_admin_commands")]
    pub admin_commands: Vec<String>,
    /// Requests per minute for the auth route class (register/login).
    #[serde(default = "default_auth_rate")]
    pub auth_rate_per_minute: u32,
    /// Requests per minute for AI route class.
    #[serde(default = "default_ai_rate")]
    pub ai_rate_per_minute: u32,
    /// Requests per minute for other versioned API routes.
    #[serde(default = "default_api_rate")]
    pub api_rate_per_minute: u32,
    /// Requests per minute for everything else.
    #[serde(default = "default_general_rate")]
    pub general_rate_per_minute: u32,
    /// Non-empty: only these IPs may hit the trigger endpoint.
    #[serde(default)]
    pub ip_allowlist: Vec<String>,
    #[serde(default = "bool_true")]
    pub audit_trail: bool,
}

fn default_admin_commands() -> Vec<String> {
    vec![
        "status",
        "daily-summary",
        "weekly-report",
        "property-cleanup",
        "expiry-notifier",
        "system-maintenance",
        "analytics",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_auth_rate() -> u32 { 5 }
fn default_ai_rate() -> u32 { 20 }
fn default_api_rate() -> u32 { 60 }
fn default_general_rate() -> u32 { 100 }

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            admin_commands: default_admin_commands(),
            auth_rate_per_minute: default_auth_rate(),
            ai_rate_per_minute: default_ai_rate(),
            api_rate_per_minute: default_api_rate(),
            general_rate_per_minute: default_general_rate(),
            ip_allowlist: vec![],
            audit_trail: true,
        }
    }
}

/// Storage paths for logs, reports, cache, and scratch space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// SQLite file holding the AI-request audit trail and job-run history.
    #[serde(default = "default_audit_db")]
    pub audit_db: String,
}

impl StorageConfig {
    /// Audit database path with `~` expanded.
    pub fn audit_db_path(&self) -> PathBuf {
        expand_home(&self.audit_db)
    }
}

/// Expand a leading `~/` against the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn default_logs_dir() -> String { "~/.clawdbot/logs".into() }
fn default_reports_dir() -> String { "~/.clawdbot/reports".into() }
fn default_cache_dir() -> String { "~/.clawdbot/cache".into() }
fn default_temp_dir() -> String { "~/.clawdbot/tmp".into() }
fn default_audit_db() -> String { "~/.clawdbot/audit.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            reports_dir: default_reports_dir(),
            cache_dir: default_cache_dir(),
            temp_dir: default_temp_dir(),
            audit_db: default_audit_db(),
        }
    }
}

/// Debug flags.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DebugConfig {
    #[serde(default)]
    pub verbose: bool,
    /// When true, every trigger defaults to preview unless explicitly forced.
    #[serde(default)]
    pub dry_run_default: bool,
    /// Render notification emails without sending them.
    #[serde(default)]
    pub preview_email: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert!(config.enabled);
        assert_eq!(config.security.auth_rate_per_minute, 5);
        assert_eq!(config.security.ai_rate_per_minute, 20);
        assert_eq!(config.property.expiry_warning_days, vec![7, 3]);
        assert_eq!(config.analytics.cache_ttl_secs, 3600);
        assert_eq!(config.batch.max_retries, 3);
        assert_eq!(config.batch.retry_delay_secs, 60);
        assert_eq!(config.security.admin_commands.len(), 7);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            log_level = "debug"

            [scheduler]
            enabled = false
            maintenance_window_start_hour = 1
            maintenance_window_end_hour = 5

            [property]
            inactive_days = 14
            cleanup_days = 60
        "#;

        let config: BotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.maintenance_window_start_hour, 1);
        assert_eq!(config.property.inactive_days, 14);
        // Untouched sections keep defaults
        assert_eq!(config.notifications.max_per_recipient_per_minute, 10);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: BotConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.port, 4460);
        assert_eq!(config.batch.timeout_secs, 300);
        assert!(config.security.audit_trail);
    }

    #[test]
    fn test_home_dir() {
        let home = BotConfig::home_dir();
        assert!(home.to_string_lossy().contains("clawdbot"));
    }
}
