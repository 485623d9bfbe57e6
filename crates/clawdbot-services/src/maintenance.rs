//! Maintenance classification — warn / deactivate / purge buckets.
//!
//! Classification is pure; applying the plan goes through the property store
//! and re-checks transition legality, so a terminal listing can never be
//! touched even if the snapshot it was classified from is stale.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use clawdbot_core::config::PropertyConfig;
use clawdbot_core::domain::{Property, PropertyStatus};
use clawdbot_core::error::Result;
use clawdbot_core::store::PropertyStore;

/// A listing close to its expiry horizon.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExpiryWarning {
    pub property_id: Uuid,
    pub agent_id: Uuid,
    pub days_left: i64,
}

/// What a maintenance pass intends to do. Computing the plan never mutates
/// anything — preview mode stops here.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MaintenancePlan {
    pub warn: Vec<ExpiryWarning>,
    pub deactivate: Vec<Uuid>,
    pub purge: Vec<Uuid>,
}

impl MaintenancePlan {
    pub fn is_empty(&self) -> bool {
        self.warn.is_empty() && self.deactivate.is_empty() && self.purge.is_empty()
    }
}

pub struct MaintenanceService {
    config: PropertyConfig,
}

impl MaintenanceService {
    pub fn new(config: PropertyConfig) -> Self {
        Self { config }
    }

    /// Classify listings into warn/deactivate/purge buckets.
    ///
    /// Terminal listings (`sold`, `rented`, `purged`) are never classified:
    /// the buckets only ever move a listing further down the lifecycle.
    pub fn classify(&self, properties: &[Property], now: DateTime<Utc>) -> MaintenancePlan {
        let mut plan = MaintenancePlan::default();

        for p in properties {
            if p.deleted || p.status.is_terminal() {
                continue;
            }

            match p.status {
                PropertyStatus::Active => {
                    if let Some(expires) = p.expires_at {
                        let days_left = (expires - now).num_days();
                        if self.config.expiry_warning_days.contains(&days_left) {
                            plan.warn.push(ExpiryWarning {
                                property_id: p.id,
                                agent_id: p.agent_id,
                                days_left,
                            });
                        }
                        if days_left < 0 {
                            plan.deactivate.push(p.id);
                            continue;
                        }
                    }
                    if p.idle_days(now) >= self.config.inactive_days {
                        plan.deactivate.push(p.id);
                    }
                }
                PropertyStatus::Inactive => {
                    let dormant_days = (now - p.updated_at).num_days();
                    if dormant_days >= self.config.cleanup_days {
                        plan.purge.push(p.id);
                    }
                }
                // Pending listings wait for the agent; automation leaves them.
                PropertyStatus::Pending => {}
                _ => {}
            }
        }

        plan
    }

    /// Apply a plan through the store. Each item is independent — a failure
    /// is recorded and the rest of the batch continues.
    pub fn apply(
        &self,
        plan: &MaintenancePlan,
        store: &dyn PropertyStore,
    ) -> Result<MaintenanceOutcome> {
        let mut outcome = MaintenanceOutcome::default();

        for id in &plan.deactivate {
            match transition(store, *id, PropertyStatus::Inactive) {
                Ok(true) => outcome.deactivated += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => outcome.failures.push((*id, e.to_string())),
            }
        }
        for id in &plan.purge {
            match transition(store, *id, PropertyStatus::Purged) {
                Ok(true) => outcome.purged += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => outcome.failures.push((*id, e.to_string())),
            }
        }

        if !outcome.failures.is_empty() {
            tracing::warn!(
                "maintenance pass finished with {} item failure(s)",
                outcome.failures.len()
            );
        }
        Ok(outcome)
    }
}

/// Per-item results of an applied plan.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct MaintenanceOutcome {
    pub deactivated: u64,
    pub purged: u64,
    /// Items whose current status no longer allowed the transition.
    pub skipped: u64,
    pub failures: Vec<(Uuid, String)>,
}

/// Re-read the listing and only write the status if the transition is still
/// legal. Returns Ok(false) when the transition was skipped.
fn transition(store: &dyn PropertyStore, id: Uuid, to: PropertyStatus) -> Result<bool> {
    let Some(current) = store.get(id)? else {
        return Ok(false);
    };
    if !current.status.automation_may_transition(to) {
        tracing::debug!(
            "skipping {id}: {} -> {to} not allowed for automation",
            current.status
        );
        return Ok(false);
    }
    store.set_status(id, to)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdbot_core::store::MemoryStore;

    fn svc() -> MaintenanceService {
        MaintenanceService::new(PropertyConfig::default())
    }

    fn idle_listing(days_idle: i64) -> Property {
        let mut p = Property::new(Uuid::new_v4(), "flat", 1000, "apartment");
        p.last_activity_at = Utc::now() - chrono::Duration::days(days_idle);
        p
    }

    #[test]
    fn test_idle_active_goes_to_deactivate_bucket() {
        let fresh = idle_listing(2);
        let stale = idle_listing(31);
        let plan = svc().classify(&[fresh.clone(), stale.clone()], Utc::now());
        assert_eq!(plan.deactivate, vec![stale.id]);
        assert!(plan.purge.is_empty());
    }

    #[test]
    fn test_dormant_inactive_goes_to_purge_bucket() {
        let mut p = idle_listing(200);
        p.status = PropertyStatus::Inactive;
        p.updated_at = Utc::now() - chrono::Duration::days(91);
        let plan = svc().classify(&[p.clone()], Utc::now());
        assert_eq!(plan.purge, vec![p.id]);
        assert!(plan.deactivate.is_empty());
    }

    #[test]
    fn test_terminal_listings_never_classified() {
        for status in [PropertyStatus::Sold, PropertyStatus::Rented, PropertyStatus::Purged] {
            let mut p = idle_listing(400);
            p.status = status;
            p.updated_at = Utc::now() - chrono::Duration::days(400);
            let plan = svc().classify(&[p], Utc::now());
            assert!(plan.is_empty(), "{status} was classified");
        }
    }

    #[test]
    fn test_expiry_warning_on_threshold_days() {
        let now = Utc::now();
        let mut warn7 = idle_listing(0);
        warn7.expires_at = Some(now + chrono::Duration::days(7) + chrono::Duration::hours(1));
        let mut warn5 = idle_listing(0);
        warn5.expires_at = Some(now + chrono::Duration::days(5) + chrono::Duration::hours(1));

        let plan = svc().classify(&[warn7.clone(), warn5], now);
        assert_eq!(plan.warn.len(), 1);
        assert_eq!(plan.warn[0].property_id, warn7.id);
        assert_eq!(plan.warn[0].days_left, 7);
    }

    #[test]
    fn test_expired_listing_deactivated() {
        let now = Utc::now();
        let mut p = idle_listing(0);
        p.expires_at = Some(now - chrono::Duration::days(1));
        let plan = svc().classify(&[p.clone()], now);
        assert_eq!(plan.deactivate, vec![p.id]);
    }

    #[test]
    fn test_apply_respects_stale_snapshot() {
        let store = MemoryStore::new();
        let p = idle_listing(31);
        let id = p.id;
        store.insert(p).unwrap();

        let plan = svc().classify(&PropertyStore::all(&store).unwrap(), Utc::now());
        assert_eq!(plan.deactivate, vec![id]);

        // Listing sells between classification and apply
        store.set_status(id, PropertyStatus::Sold).unwrap();
        let outcome = svc().apply(&plan, &store).unwrap();
        assert_eq!(outcome.deactivated, 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.get(id).unwrap().unwrap().status, PropertyStatus::Sold);
    }

    #[test]
    fn test_purged_never_revived_by_apply() {
        let store = MemoryStore::new();
        let mut p = idle_listing(31);
        p.status = PropertyStatus::Purged;
        let id = p.id;
        store.insert(p).unwrap();

        // A hostile plan cannot move a purged listing anywhere
        let plan = MaintenancePlan {
            deactivate: vec![id],
            ..Default::default()
        };
        let outcome = svc().apply(&plan, &store).unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.get(id).unwrap().unwrap().status, PropertyStatus::Purged);
    }

    #[test]
    fn test_one_bad_item_does_not_abort_batch() {
        let store = MemoryStore::new();
        let good = idle_listing(31);
        let good_id = good.id;
        store.insert(good).unwrap();

        let plan = MaintenancePlan {
            // Unknown id is skipped, not fatal
            deactivate: vec![Uuid::new_v4(), good_id],
            ..Default::default()
        };
        let outcome = svc().apply(&plan, &store).unwrap();
        assert_eq!(outcome.deactivated, 1);
        assert_eq!(
            store.get(good_id).unwrap().unwrap().status,
            PropertyStatus::Inactive
        );
    }
}
