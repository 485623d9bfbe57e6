//! Persistence seams.
//!
//! The marketplace database belongs to an external ORM layer. Jobs and
//! services only touch these traits, which keeps every batch testable with
//! the in-memory double below.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Enquiry, Property, PropertyStatus};
use crate::error::{BotError, Result};

/// Read/write access to property listings.
pub trait PropertyStore: Send + Sync {
    /// All non-deleted listings.
    fn all(&self) -> Result<Vec<Property>>;
    fn get(&self, id: Uuid) -> Result<Option<Property>>;
    fn insert(&self, property: Property) -> Result<()>;
    /// Raw status write — transition legality is the caller's job.
    fn set_status(&self, id: Uuid, status: PropertyStatus) -> Result<()>;
    /// Store AI-assist results on the listing.
    fn record_suggestion(
        &self,
        id: Uuid,
        suggested_price: Option<i64>,
        ai_description: Option<String>,
    ) -> Result<()>;
    /// Count of listings created in `[from, to)`.
    fn created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize>;
}

/// Read/write access to enquiries.
pub trait EnquiryStore: Send + Sync {
    fn all(&self) -> Result<Vec<Enquiry>>;
    fn insert(&self, enquiry: Enquiry) -> Result<()>;
    fn set_summary(&self, id: Uuid, summary: &str) -> Result<()>;
    fn created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize>;
}

/// In-memory store — test double and the default for local development runs.
#[derive(Default)]
pub struct MemoryStore {
    properties: Mutex<HashMap<Uuid, Property>>,
    enquiries: Mutex<HashMap<Uuid, Enquiry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn props(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Property>>> {
        self.properties
            .lock()
            .map_err(|_| BotError::Storage("property store lock poisoned".into()))
    }

    fn enqs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Enquiry>>> {
        self.enquiries
            .lock()
            .map_err(|_| BotError::Storage("enquiry store lock poisoned".into()))
    }
}

impl PropertyStore for MemoryStore {
    fn all(&self) -> Result<Vec<Property>> {
        let mut out: Vec<Property> =
            self.props()?.values().filter(|p| !p.deleted).cloned().collect();
        out.sort_by_key(|p| p.created_at);
        Ok(out)
    }

    fn get(&self, id: Uuid) -> Result<Option<Property>> {
        Ok(self.props()?.get(&id).cloned())
    }

    fn insert(&self, property: Property) -> Result<()> {
        self.props()?.insert(property.id, property);
        Ok(())
    }

    fn set_status(&self, id: Uuid, status: PropertyStatus) -> Result<()> {
        let mut props = self.props()?;
        let p = props
            .get_mut(&id)
            .ok_or_else(|| BotError::Storage(format!("no property {id}")))?;
        p.status = status;
        p.updated_at = Utc::now();
        Ok(())
    }

    fn record_suggestion(
        &self,
        id: Uuid,
        suggested_price: Option<i64>,
        ai_description: Option<String>,
    ) -> Result<()> {
        let mut props = self.props()?;
        let p = props
            .get_mut(&id)
            .ok_or_else(|| BotError::Storage(format!("no property {id}")))?;
        if suggested_price.is_some() {
            p.suggested_price = suggested_price;
        }
        if ai_description.is_some() {
            p.ai_description = ai_description;
        }
        p.updated_at = Utc::now();
        Ok(())
    }

    fn created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize> {
        Ok(self
            .props()?
            .values()
            .filter(|p| !p.deleted && p.created_at >= from && p.created_at < to)
            .count())
    }
}

impl EnquiryStore for MemoryStore {
    fn all(&self) -> Result<Vec<Enquiry>> {
        let mut out: Vec<Enquiry> = self.enqs()?.values().cloned().collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }

    fn insert(&self, enquiry: Enquiry) -> Result<()> {
        self.enqs()?.insert(enquiry.id, enquiry);
        Ok(())
    }

    fn set_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        let mut enqs = self.enqs()?;
        let e = enqs
            .get_mut(&id)
            .ok_or_else(|| BotError::Storage(format!("no enquiry {id}")))?;
        e.ai_summary = Some(summary.to_string());
        Ok(())
    }

    fn created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize> {
        Ok(self
            .enqs()?
            .values()
            .filter(|e| e.created_at >= from && e.created_at < to)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_deleted_hidden_from_all() {
        let store = MemoryStore::new();
        let mut p = Property::new(Uuid::new_v4(), "visible", 100, "flat");
        let mut hidden = Property::new(Uuid::new_v4(), "hidden", 100, "flat");
        hidden.deleted = true;
        p.deleted = false;
        PropertyStore::insert(&store, p).unwrap();
        PropertyStore::insert(&store, hidden.clone()).unwrap();

        let all = PropertyStore::all(&store).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "visible");
        // Direct get still works for admin paths
        assert!(store.get(hidden.id).unwrap().is_some());
    }

    #[test]
    fn test_set_status_unknown_id() {
        let store = MemoryStore::new();
        let err = store
            .set_status(Uuid::new_v4(), PropertyStatus::Inactive)
            .unwrap_err();
        assert!(matches!(err, BotError::Storage(_)));
    }

    #[test]
    fn test_created_between_counts() {
        let store = MemoryStore::new();
        let mut old = Property::new(Uuid::new_v4(), "old", 1, "flat");
        old.created_at = Utc::now() - chrono::Duration::days(10);
        PropertyStore::insert(&store, old).unwrap();
        PropertyStore::insert(&store, Property::new(Uuid::new_v4(), "new", 1, "flat")).unwrap();

        let from = Utc::now() - chrono::Duration::days(1);
        let n = PropertyStore::created_between(&store, from, Utc::now() + chrono::Duration::days(1))
            .unwrap();
        assert_eq!(n, 1);
    }
}
