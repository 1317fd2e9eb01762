//! # Task Descriptor
//!
//! A descriptor names one repository object and the ordered list of services
//! to run against it. Conductors deduplicate descriptors by `target_id`.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::services::ServiceRef;

/// Unit of work handed to a conductor
#[derive(Clone)]
pub struct TaskDescriptor {
    id: Uuid,
    target_id: String,
    source_namespace: String,
    action: String,
    explicit_task_type: Option<String>,
    applicable_services: Vec<ServiceRef>,
    timestamp: DateTime<Utc>,
    attempt: u32,
}

impl TaskDescriptor {
    pub fn new(
        target_id: impl Into<String>,
        source_namespace: impl Into<String>,
        action: impl Into<String>,
        applicable_services: Vec<ServiceRef>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.into(),
            source_namespace: source_namespace.into(),
            action: action.into(),
            explicit_task_type: None,
            applicable_services,
            timestamp: Utc::now(),
            attempt: 1,
        }
    }

    pub fn with_explicit_task_type(mut self, task_type: Option<String>) -> Self {
        self.explicit_task_type = task_type;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Unique id of this descriptor instance (not used for deduplication)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identity for deduplication purposes
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn source_namespace(&self) -> &str {
        &self.source_namespace
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn explicit_task_type(&self) -> Option<&str> {
        self.explicit_task_type.as_deref()
    }

    pub fn applicable_services(&self) -> &[ServiceRef] {
        &self.applicable_services
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 1 for the first execution, incremented on each recoverable retry
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn service_names(&self) -> Vec<String> {
        self.applicable_services
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Drop the services before `index`; used when a retry resumes mid-pipeline.
    pub(crate) fn narrow_from(&mut self, index: usize) {
        let index = index.min(self.applicable_services.len());
        self.applicable_services.drain(..index);
    }

    pub(crate) fn next_attempt(&mut self) {
        self.attempt += 1;
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("target_id", &self.target_id)
            .field("source_namespace", &self.source_namespace)
            .field("action", &self.action)
            .field("explicit_task_type", &self.explicit_task_type)
            .field("applicable_services", &self.service_names())
            .field("timestamp", &self.timestamp)
            .field("attempt", &self.attempt)
            .finish()
    }
}
