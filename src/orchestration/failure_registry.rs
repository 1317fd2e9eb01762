//! # Failed Object Registry
//!
//! Bounded, expiring map from object identifier to the last recorded failure.
//! Each conductor owns one. The registry is informational: conductors never
//! consult it before dispatching, so a fresh descriptor for a failed object is
//! always attempted again.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::FailureRegistryConfig;
use crate::services::Severity;

/// Failure information kept per object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub target_id: String,
    pub severity: Severity,
    /// When the object first failed since its record was created
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
    /// Service that raised the most recent failure
    pub service_name: Option<String>,
    pub message: String,
    pub failure_count: u32,
}

#[derive(Debug)]
pub struct FailedObjectRegistry {
    records: DashMap<String, FailureRecord>,
    max_entries: usize,
    expiry: Duration,
}

impl FailedObjectRegistry {
    pub fn new(config: &FailureRegistryConfig) -> Self {
        Self {
            records: DashMap::new(),
            max_entries: config.max_entries.max(1),
            expiry: Duration::from_secs(config.expiry_seconds),
        }
    }

    /// Record a failure. Repeated failures keep `first_failed_at` and bump the count.
    pub fn put(
        &self,
        target_id: &str,
        severity: Severity,
        service_name: Option<&str>,
        message: &str,
    ) {
        self.purge_expired();
        let now = Utc::now();

        match self.records.entry(target_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.severity = severity;
                existing.last_failed_at = now;
                existing.service_name = service_name.map(str::to_string);
                existing.message = message.to_string();
                existing.failure_count += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(FailureRecord {
                    target_id: target_id.to_string(),
                    severity,
                    first_failed_at: now,
                    last_failed_at: now,
                    service_name: service_name.map(str::to_string),
                    message: message.to_string(),
                    failure_count: 1,
                });
            }
        }

        // Concurrent inserts can overshoot; every inserter trims back down
        while self.records.len() > self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    pub fn get(&self, target_id: &str) -> Option<FailureRecord> {
        let record = self.records.get(target_id)?.value().clone();
        if self.is_expired(&record) {
            self.records.remove(target_id);
            return None;
        }
        Some(record)
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.get(target_id).is_some()
    }

    pub fn remove(&self, target_id: &str) -> Option<FailureRecord> {
        self.records.remove(target_id).map(|(_, record)| record)
    }

    pub fn size(&self) -> usize {
        self.purge_expired();
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Identifiers with a live failure record, sorted
    pub fn failed_ids(&self) -> Vec<String> {
        self.purge_expired();
        let mut ids: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    fn is_expired(&self, record: &FailureRecord) -> bool {
        let age = Utc::now()
            .signed_duration_since(record.last_failed_at)
            .to_std()
            .unwrap_or_default();
        age > self.expiry
    }

    fn purge_expired(&self) {
        let before = self.records.len();
        self.records.retain(|_, record| !self.is_expired(record));
        let purged = before.saturating_sub(self.records.len());
        if purged > 0 {
            debug!(purged = purged, "Purged expired failure records");
        }
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .records
            .iter()
            .min_by_key(|r| r.value().last_failed_at)
            .map(|r| r.key().clone());
        match oldest {
            Some(key) => {
                debug!(target_id = %key, "Failure registry at capacity, evicting oldest record");
                self.records.remove(&key);
                true
            }
            None => false,
        }
    }
}
