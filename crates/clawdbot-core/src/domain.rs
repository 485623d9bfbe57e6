//! Domain records for the automation layer.
//!
//! Persistence of these entities is owned by the marketplace's ORM layer;
//! ClawDBot only reads and writes them through the `store` traits. The listing
//! lifecycle lives here so every service agrees on which transitions are
//! legal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Listing lifecycle.
///
/// `active → pending → {sold, rented}` by agent action;
/// `active → inactive → purged` by maintenance. Terminal states accept no
/// automated transition; only explicit admin action revives a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Active,
    Pending,
    Sold,
    Rented,
    Inactive,
    Purged,
}

impl PropertyStatus {
    /// Terminal states never change under automation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sold | Self::Rented | Self::Purged)
    }

    /// Whether automation may move a listing from `self` to `to`.
    /// Admin overrides are checked separately (see [`Self::admin_may_revive`]).
    pub fn automation_may_transition(&self, to: PropertyStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (Self::Active, Self::Inactive) | (Self::Inactive, Self::Purged)
        )
    }

    /// Only `pending` and `inactive` listings can be revived, and only by an
    /// explicit admin action.
    pub fn admin_may_revive(&self) -> bool {
        matches!(self, Self::Pending | Self::Inactive)
    }
}

impl std::fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Sold => "sold",
            Self::Rented => "rented",
            Self::Inactive => "inactive",
            Self::Purged => "purged",
        };
        write!(f, "{s}")
    }
}

/// A property listing, as the automation layer sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    /// Owning agent.
    pub agent_id: Uuid,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub category: String,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time the listing saw any activity (view, enquiry, edit).
    pub last_activity_at: DateTime<Utc>,
    /// When the listing expires, if the agent set a horizon.
    pub expires_at: Option<DateTime<Utc>>,
    /// Soft-deleted rows are excluded from public listing.
    pub deleted: bool,
    /// AI-assist fields, filled by the suggestion service.
    pub suggested_price: Option<i64>,
    pub ai_description: Option<String>,
}

impl Property {
    /// New active listing with all timestamps at `now`.
    pub fn new(agent_id: Uuid, title: &str, price: i64, category: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id,
            title: title.to_string(),
            description: String::new(),
            price,
            category: category.to_string(),
            status: PropertyStatus::Active,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            expires_at: None,
            deleted: false,
            suggested_price: None,
            ai_description: None,
        }
    }

    /// Days since the listing last saw activity.
    pub fn idle_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity_at).num_days()
    }
}

/// Enquiry status: created `new`, worked by the agent, eventually `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnquiryStatus {
    New,
    Contacted,
    Closed,
}

/// A user enquiry on a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enquiry {
    pub id: Uuid,
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub status: EnquiryStatus,
    /// Optional AI-generated summary of the thread.
    pub ai_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Enquiry {
    pub fn new(property_id: Uuid, user_id: Uuid, message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            property_id,
            user_id,
            message: message.to_string(),
            status: EnquiryStatus::New,
            ai_summary: None,
            created_at: Utc::now(),
        }
    }
}

/// What kind of AI assist was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiRequestKind {
    Price,
    Description,
    Market,
    Enquiry,
}

impl std::fmt::Display for AiRequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Price => "price",
            Self::Description => "description",
            Self::Market => "market",
            Self::Enquiry => "enquiry",
        };
        write!(f, "{s}")
    }
}

/// Audit record of one AI invocation. Immutable once written, except the
/// output/error fields which are set on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRequest {
    pub id: Uuid,
    pub kind: AiRequestKind,
    /// Who asked (user or agent id).
    pub requested_by: Uuid,
    /// Opaque input payload.
    pub input: serde_json::Value,
    /// Opaque output payload, set on completion.
    pub output: Option<serde_json::Value>,
    pub token_cost: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AiRequest {
    pub fn begin(kind: AiRequestKind, requested_by: Uuid, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            requested_by,
            input,
            output: None,
            token_cost: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_reject_automation() {
        for s in [PropertyStatus::Sold, PropertyStatus::Rented, PropertyStatus::Purged] {
            assert!(s.is_terminal());
            assert!(!s.automation_may_transition(PropertyStatus::Active));
            assert!(!s.automation_may_transition(PropertyStatus::Inactive));
        }
    }

    #[test]
    fn test_maintenance_path() {
        assert!(PropertyStatus::Active.automation_may_transition(PropertyStatus::Inactive));
        assert!(PropertyStatus::Inactive.automation_may_transition(PropertyStatus::Purged));
        // No shortcut from active straight to purged
        assert!(!PropertyStatus::Active.automation_may_transition(PropertyStatus::Purged));
    }

    #[test]
    fn test_admin_revive_scope() {
        assert!(PropertyStatus::Pending.admin_may_revive());
        assert!(PropertyStatus::Inactive.admin_may_revive());
        assert!(!PropertyStatus::Purged.admin_may_revive());
        assert!(!PropertyStatus::Sold.admin_may_revive());
    }

    #[test]
    fn test_idle_days() {
        let mut p = Property::new(Uuid::new_v4(), "flat", 1000, "apartment");
        p.last_activity_at = Utc::now() - chrono::Duration::days(31);
        assert_eq!(p.idle_days(Utc::now()), 31);
    }
}
