//! Analytics aggregation with a TTL result cache.
//!
//! Counts come from the injected stores and the AI audit trail; recomputation
//! is bounded by caching each resolved period for `cache_ttl_secs`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use clawdbot_core::config::AnalyticsConfig;
use clawdbot_core::domain::PropertyStatus;
use clawdbot_core::error::{BotError, Result};
use clawdbot_core::store::{EnquiryStore, PropertyStore};

use crate::audit::AuditDb;

pub const MAX_LIMIT: u32 = 1000;

/// Requested aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

/// Analytics query. `start_date`/`end_date` are required iff `period=custom`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRequest {
    pub period: Period,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AnalyticsRequest {
    /// Validate and resolve to a concrete `[from, to)` window.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        if let Some(limit) = self.limit
            && !(1..=MAX_LIMIT).contains(&limit)
        {
            return Err(BotError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        // Fixed periods anchor at the top of the next hour: stable cache
        // keys, bounded staleness, and the current moment is always inside
        // the window.
        let anchor = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now)
            + Duration::hours(1);

        match self.period {
            Period::Daily => Ok((anchor - Duration::days(1), anchor)),
            Period::Weekly => Ok((anchor - Duration::weeks(1), anchor)),
            Period::Monthly => Ok((anchor - Duration::days(30), anchor)),
            Period::Custom => {
                let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
                    return Err(BotError::Validation(
                        "custom period requires start_date and end_date".into(),
                    ));
                };
                if start > end {
                    return Err(BotError::Validation(
                        "start_date must not be after end_date".into(),
                    ));
                }
                let from = start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
                // End date is inclusive
                let to = (end + Duration::days(1))
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default()
                    .and_utc();
                Ok((from, to))
            }
        }
    }
}

/// Aggregated counts for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub new_properties: usize,
    pub new_enquiries: usize,
    pub listings_by_status: HashMap<String, usize>,
    pub top_categories: Vec<(String, usize)>,
    pub ai_requests: u64,
    pub ai_tokens: u64,
}

pub struct AnalyticsService {
    config: AnalyticsConfig,
    cache: Mutex<HashMap<String, (Instant, AnalyticsReport)>>,
}

impl AnalyticsService {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run a query. Results are cached per resolved window key.
    pub fn query(
        &self,
        request: &AnalyticsRequest,
        properties: &dyn PropertyStore,
        enquiries: &dyn EnquiryStore,
        audit: &AuditDb,
    ) -> Result<AnalyticsReport> {
        let now = Utc::now();
        let (from, to) = request.resolve(now)?;
        let key = format!("{}..{}", from.timestamp(), to.timestamp());
        let ttl = std::time::Duration::from_secs(self.config.cache_ttl_secs);

        if let Ok(cache) = self.cache.lock()
            && let Some((at, report)) = cache.get(&key)
            && at.elapsed() < ttl
        {
            tracing::debug!("analytics cache hit for {key}");
            return Ok(report.clone());
        }

        let report = self.compute(from, to, request.limit, properties, enquiries, audit)?;
        if let Ok(mut cache) = self.cache.lock() {
            // Window keys roll over every hour; drop entries past their TTL
            // so the cache never accumulates dead windows.
            cache.retain(|_, (at, _)| at.elapsed() < ttl);
            cache.insert(key, (Instant::now(), report.clone()));
        }
        Ok(report)
    }

    fn compute(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<u32>,
        properties: &dyn PropertyStore,
        enquiries: &dyn EnquiryStore,
        audit: &AuditDb,
    ) -> Result<AnalyticsReport> {
        let all = properties.all()?;

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut categories: HashMap<String, usize> = HashMap::new();
        for p in &all {
            *by_status.entry(p.status.to_string()).or_default() += 1;
            if p.status == PropertyStatus::Active {
                *categories.entry(p.category.clone()).or_default() += 1;
            }
        }
        let mut top: Vec<(String, usize)> = categories.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(limit.unwrap_or(10) as usize);

        let (ai_requests, ai_tokens) = audit.ai_usage_between(from, to)?;

        Ok(AnalyticsReport {
            from,
            to,
            new_properties: properties.created_between(from, to)?,
            new_enquiries: enquiries.created_between(from, to)?,
            listings_by_status: by_status,
            top_categories: top,
            ai_requests,
            ai_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdbot_core::domain::{Enquiry, Property};
    use clawdbot_core::store::MemoryStore;
    use uuid::Uuid;

    #[test]
    fn test_custom_period_requires_ordered_dates() {
        let req = AnalyticsRequest {
            period: Period::Custom,
            start_date: NaiveDate::from_ymd_opt(2026, 8, 10),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 1),
            limit: None,
        };
        assert!(matches!(
            req.resolve(Utc::now()),
            Err(BotError::Validation(_))
        ));
    }

    #[test]
    fn test_custom_period_requires_dates() {
        let req = AnalyticsRequest {
            period: Period::Custom,
            start_date: None,
            end_date: None,
            limit: None,
        };
        assert!(req.resolve(Utc::now()).is_err());
    }

    #[test]
    fn test_fixed_periods_need_no_dates() {
        for period in [Period::Daily, Period::Weekly, Period::Monthly] {
            let req = AnalyticsRequest {
                period,
                start_date: None,
                end_date: None,
                limit: None,
            };
            let (from, to) = req.resolve(Utc::now()).unwrap();
            assert!(from < to);
        }
    }

    #[test]
    fn test_limit_bounds() {
        for (limit, ok) in [(0, false), (1, true), (1000, true), (1001, false)] {
            let req = AnalyticsRequest {
                period: Period::Daily,
                start_date: None,
                end_date: None,
                limit: Some(limit),
            };
            assert_eq!(req.resolve(Utc::now()).is_ok(), ok, "limit={limit}");
        }
    }

    #[test]
    fn test_expired_cache_entries_purged() {
        let store = MemoryStore::new();
        let audit = AuditDb::open_in_memory().unwrap();
        let svc = AnalyticsService::new(AnalyticsConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        });

        let custom = |day: u32| AnalyticsRequest {
            period: Period::Custom,
            start_date: NaiveDate::from_ymd_opt(2026, 1, day),
            end_date: NaiveDate::from_ymd_opt(2026, 1, day),
            limit: None,
        };
        svc.query(&custom(1), &store, &store, &audit).unwrap();
        svc.query(&custom(2), &store, &store, &audit).unwrap();
        // Zero TTL: the first window is gone by the time the second lands
        assert_eq!(svc.cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_query_counts_and_cache() {
        let store = MemoryStore::new();
        let audit = AuditDb::open_in_memory().unwrap();
        PropertyStore::insert(
            &store,
            Property::new(Uuid::new_v4(), "flat", 1000, "apartment"),
        )
        .unwrap();
        EnquiryStore::insert(
            &store,
            Enquiry::new(Uuid::new_v4(), Uuid::new_v4(), "is this free?"),
        )
        .unwrap();

        let svc = AnalyticsService::new(AnalyticsConfig::default());
        let req = AnalyticsRequest {
            period: Period::Daily,
            start_date: None,
            end_date: None,
            limit: None,
        };
        let report = svc.query(&req, &store, &store, &audit).unwrap();
        assert_eq!(report.new_properties, 1);
        assert_eq!(report.new_enquiries, 1);
        assert_eq!(report.listings_by_status.get("active"), Some(&1));

        // Insert more data; the cached result is served until the TTL lapses
        PropertyStore::insert(
            &store,
            Property::new(Uuid::new_v4(), "house", 2000, "house"),
        )
        .unwrap();
        let cached = svc.query(&req, &store, &store, &audit).unwrap();
        assert_eq!(cached.new_properties, 1);
    }
}
