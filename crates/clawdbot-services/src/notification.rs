//! Notification dispatch with per-recipient rate budgets.
//!
//! Delivery providers (SMTP, SMS gateways, push) are external collaborators
//! behind the [`ChannelTransport`] seam. A recipient over budget never causes
//! a caller error: the notice is queued or dropped per configured policy.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use clawdbot_core::config::NotificationsConfig;
use clawdbot_core::error::Result;

/// Delivery channels understood by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
    Database,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::Database => "database",
        };
        write!(f, "{s}")
    }
}

/// One notice to deliver.
#[derive(Debug, Clone)]
pub struct Notice {
    pub recipient: Uuid,
    pub subject: String,
    pub body: String,
}

impl Notice {
    pub fn new(recipient: Uuid, subject: &str, body: &str) -> Self {
        Self {
            recipient,
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

/// Seam to the real delivery providers.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn deliver(&self, channel: Channel, notice: &Notice) -> Result<()>;
}

/// Transport double that records every delivery. Also the default for local
/// development runs where no provider is configured.
#[derive(Default)]
pub struct MemoryTransport {
    pub sent: Mutex<Vec<(Channel, Notice)>>,
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn deliver(&self, channel: Channel, notice: &Notice) -> Result<()> {
        tracing::debug!("delivering via {channel}: {}", notice.subject);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((channel, notice.clone()));
        }
        Ok(())
    }
}

/// What happened to a notice.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// Delivered on at least one channel.
    Sent,
    /// Recipient over budget, notice parked for a later flush.
    Queued,
    /// Recipient over budget and policy says drop.
    Dropped,
}

/// A single channel delivery never waits longer than this; a hung provider
/// is logged and the remaining channels still get the notice.
const DELIVER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Once the budget map reaches this size, stale windows are swept before the
/// next entry is added.
const BUDGET_SWEEP_THRESHOLD: usize = 1024;

/// Fixed-window budget: N per minute, M per hour, per recipient.
struct BudgetWindows {
    minute_start: DateTime<Utc>,
    minute_count: u32,
    hour_start: DateTime<Utc>,
    hour_count: u32,
}

pub struct NotificationService {
    config: NotificationsConfig,
    transport: std::sync::Arc<dyn ChannelTransport>,
    budgets: Mutex<HashMap<Uuid, BudgetWindows>>,
    queued: Mutex<VecDeque<Notice>>,
}

impl NotificationService {
    pub fn new(
        config: NotificationsConfig,
        transport: std::sync::Arc<dyn ChannelTransport>,
    ) -> Self {
        Self {
            config,
            transport,
            budgets: Mutex::new(HashMap::new()),
            queued: Mutex::new(VecDeque::new()),
        }
    }

    fn enabled_channels(&self) -> Vec<Channel> {
        let mut out = Vec::new();
        if self.config.email {
            out.push(Channel::Email);
        }
        if self.config.sms {
            out.push(Channel::Sms);
        }
        if self.config.push {
            out.push(Channel::Push);
        }
        if self.config.database {
            out.push(Channel::Database);
        }
        out
    }

    /// Consume one budget slot for the recipient, or report exhaustion.
    fn try_consume_budget(&self, recipient: Uuid, now: DateTime<Utc>) -> bool {
        let Ok(mut budgets) = self.budgets.lock() else {
            return false;
        };
        if budgets.len() >= BUDGET_SWEEP_THRESHOLD {
            budgets.retain(|_, w| now - w.hour_start < Duration::hours(1));
        }
        let w = budgets.entry(recipient).or_insert_with(|| BudgetWindows {
            minute_start: now,
            minute_count: 0,
            hour_start: now,
            hour_count: 0,
        });
        if now - w.minute_start >= Duration::minutes(1) {
            w.minute_start = now;
            w.minute_count = 0;
        }
        if now - w.hour_start >= Duration::hours(1) {
            w.hour_start = now;
            w.hour_count = 0;
        }
        if w.minute_count >= self.config.max_per_recipient_per_minute
            || w.hour_count >= self.config.max_per_recipient_per_hour
        {
            return false;
        }
        w.minute_count += 1;
        w.hour_count += 1;
        true
    }

    /// Dispatch a notice to every enabled channel.
    ///
    /// A single channel failing is logged and the other channels still get
    /// the notice; budget exhaustion queues or drops per policy.
    pub async fn notify(&self, notice: Notice) -> DispatchOutcome {
        self.notify_at(notice, Utc::now()).await
    }

    /// Like [`Self::notify`], with an explicit clock for tests.
    pub async fn notify_at(&self, notice: Notice, now: DateTime<Utc>) -> DispatchOutcome {
        if !self.try_consume_budget(notice.recipient, now) {
            return if self.config.overflow_policy == "drop" {
                tracing::warn!(
                    "notification budget exhausted for {}, dropping '{}'",
                    notice.recipient,
                    notice.subject
                );
                DispatchOutcome::Dropped
            } else {
                tracing::info!(
                    "notification budget exhausted for {}, queueing '{}'",
                    notice.recipient,
                    notice.subject
                );
                if let Ok(mut q) = self.queued.lock() {
                    q.push_back(notice);
                }
                DispatchOutcome::Queued
            };
        }

        for channel in self.enabled_channels() {
            match tokio::time::timeout(DELIVER_TIMEOUT, self.transport.deliver(channel, &notice))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("delivery via {channel} failed for '{}': {e}", notice.subject);
                }
                Err(_) => {
                    tracing::warn!("delivery via {channel} timed out for '{}'", notice.subject);
                }
            }
        }
        DispatchOutcome::Sent
    }

    /// Re-attempt queued notices whose recipients have budget again.
    /// Called from the scheduler's maintenance tick.
    pub async fn flush_queued(&self) -> Result<usize> {
        let drained: Vec<Notice> = {
            let Ok(mut q) = self.queued.lock() else {
                return Ok(0);
            };
            q.drain(..).collect()
        };
        let mut sent = 0;
        for notice in drained {
            if matches!(self.notify(notice).await, DispatchOutcome::Sent) {
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub fn queued_len(&self) -> usize {
        self.queued.lock().map(|q| q.len()).unwrap_or(0)
    }
}
