//! # Operations Manager
//!
//! Administrative surface over the conductors and the catch-up reconciler:
//! the calls a thin admin CLI or HTTP endpoint would make. Conductors are
//! addressed by identifier.

use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::{ConductorError, Result};
use crate::logging::{log_catch_up_operation, log_conductor_operation, log_error};
use crate::orchestration::catch_up::CatchUpService;
use crate::orchestration::conductor::{ConductorStatus, MessageConductor};

pub struct OperationsManager {
    conductors: Vec<Arc<dyn MessageConductor>>,
    catch_up: Arc<CatchUpService>,
}

impl OperationsManager {
    pub fn new(conductors: Vec<Arc<dyn MessageConductor>>, catch_up: Arc<CatchUpService>) -> Self {
        Self {
            conductors,
            catch_up,
        }
    }

    pub fn conductor_names(&self) -> Vec<&str> {
        self.conductors.iter().map(|c| c.identifier()).collect()
    }

    pub fn conductor(&self, name: &str) -> Result<&Arc<dyn MessageConductor>> {
        self.conductors
            .iter()
            .find(|c| c.identifier() == name)
            .ok_or_else(|| ConductorError::UnknownConductor(name.to_string()))
    }

    pub fn pause(&self, name: &str) -> Result<()> {
        let conductor = self.conductor(name)?;
        conductor.pause();
        log_conductor_operation("pause", name, &conductor.state().to_string(), None);
        Ok(())
    }

    pub fn resume(&self, name: &str) -> Result<()> {
        let conductor = self.conductor(name)?;
        conductor.resume();
        log_conductor_operation("resume", name, &conductor.state().to_string(), None);
        Ok(())
    }

    /// Cancel in-flight work on one conductor; its queue is kept
    pub async fn abort(&self, name: &str) -> Result<()> {
        let conductor = self.conductor(name)?;
        conductor.abort().await;
        let details = format!("queue_size={}", conductor.queue_size());
        log_conductor_operation("abort", name, &conductor.state().to_string(), Some(&details));
        Ok(())
    }

    pub fn pause_all(&self) {
        for conductor in &self.conductors {
            conductor.pause();
        }
        info!("🔧 OPERATIONS: All conductors paused");
    }

    pub fn resume_all(&self) {
        for conductor in &self.conductors {
            conductor.resume();
        }
        info!("🔧 OPERATIONS: All conductors resumed");
    }

    /// Forget recorded failures, returning how many records were removed
    pub fn clear_failed(&self, name: &str) -> Result<usize> {
        let cleared = self.conductor(name)?.clear_failed();
        let details = format!("cleared={cleared}");
        log_conductor_operation("clear_failed", name, "ok", Some(&details));
        Ok(cleared)
    }

    pub fn failed_ids(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.conductor(name)?.failures().failed_ids())
    }

    /// Drop pending descriptors, returning how many were dropped
    pub fn flush_queue(&self, name: &str) -> Result<usize> {
        let flushed = self.conductor(name)?.flush_pending();
        let details = format!("flushed={flushed}");
        log_conductor_operation("flush_queue", name, "ok", Some(&details));
        Ok(flushed)
    }

    pub fn status(&self, name: &str) -> Result<ConductorStatus> {
        Ok(self.conductor(name)?.status())
    }

    /// Start a catch-up pass, optionally limited to output older than an
    /// RFC 3339 timestamp. Returns false if a pass is already running.
    pub fn activate_catch_up(&self, prior_to: Option<&str>) -> Result<bool> {
        let result = match prior_to {
            Some(timestamp) => self.catch_up.activate_prior_to(timestamp),
            None => Ok(self.catch_up.activate()),
        };
        match &result {
            Ok(true) => log_catch_up_operation("activate", prior_to, "started"),
            Ok(false) => log_catch_up_operation("activate", prior_to, "already_active"),
            Err(e) => log_error("catch_up", "activate", &e.to_string(), prior_to),
        }
        result
    }

    pub fn deactivate_catch_up(&self) -> bool {
        let was_active = self.catch_up.deactivate();
        log_catch_up_operation(
            "deactivate",
            None,
            if was_active { "stopping" } else { "inactive" },
        );
        was_active
    }

    /// Everything an operator needs at a glance, as JSON
    pub fn status_report(&self) -> serde_json::Value {
        let conductors: Vec<ConductorStatus> =
            self.conductors.iter().map(|c| c.status()).collect();
        json!({
            "conductors": conductors,
            "catch_up": {
                "active": self.catch_up.is_active(),
            },
            "generated_at": chrono::Utc::now().to_rfc3339(),
        })
    }
}

impl std::fmt::Debug for OperationsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationsManager")
            .field("conductors", &self.conductor_names())
            .field("catch_up_active", &self.catch_up.is_active())
            .finish()
    }
}
