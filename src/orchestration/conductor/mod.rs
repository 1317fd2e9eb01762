//! # Message Conductors
//!
//! A conductor owns one bounded worker pool, one pending queue, one set of
//! locked (in-flight) identifiers and one collision list. It accepts
//! [`TaskDescriptor`]s, never runs two descriptors for the same object at
//! once, and applies the severity-tiered failure policy.
//!
//! ## Key Components
//!
//! - [`MessageConductor`] - contract used by the director, catch-up and operators
//! - [`services_conductor::ServicesConductor`] - the worker-pool implementation
//! - [`work_queue`] - queue / locked set / collision bookkeeping
//! - [`metrics`] - per-conductor counters

pub mod metrics;
pub mod services_conductor;
pub mod work_queue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::orchestration::descriptor::TaskDescriptor;
use crate::orchestration::failure_registry::FailedObjectRegistry;

pub use metrics::{ConductorMetrics, MetricsSnapshot};
pub use services_conductor::ServicesConductor;
pub use work_queue::Enqueued;

/// Lifecycle state of a conductor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConductorState {
    /// Dispatching queued work
    Ready = 0,
    /// Accepting work but not dispatching it
    Paused = 1,
    /// Torn down; rejects new work
    ShuttingDown = 2,
}

impl From<u8> for ConductorState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConductorState::Ready,
            1 => ConductorState::Paused,
            _ => ConductorState::ShuttingDown,
        }
    }
}

impl fmt::Display for ConductorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConductorState::Ready => write!(f, "READY"),
            ConductorState::Paused => write!(f, "PAUSED"),
            ConductorState::ShuttingDown => write!(f, "SHUTTING_DOWN"),
        }
    }
}

/// Read-only snapshot for operators and health reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConductorStatus {
    pub identifier: String,
    pub state: ConductorState,
    pub max_workers: usize,
    pub queue_size: usize,
    pub locked_count: usize,
    pub collision_count: usize,
    pub failure_count: usize,
    pub idle: bool,
    pub metrics: MetricsSnapshot,
}

#[async_trait]
pub trait MessageConductor: Send + Sync {
    /// Name used for routing, logging and operator lookup
    fn identifier(&self) -> &str;

    /// Queue a descriptor without blocking. A descriptor whose target is
    /// already queued or in flight becomes a collision instead.
    fn add(&self, descriptor: TaskDescriptor) -> Result<Enqueued>;

    /// Stop dispatching new work. In-flight work continues.
    fn pause(&self);

    /// Resume dispatching after a pause
    fn resume(&self);

    /// Cancel every in-flight execution and restart the worker pool.
    /// Queued descriptors are kept.
    async fn abort(&self);

    /// Terminate the worker pool and discard all pending work
    async fn shutdown_now(&self);

    /// Empty the pending queue, collision list, locked set and failure registry.
    /// Executions already running keep their object exclusive until they end.
    fn clear_state(&self);

    /// Discard the pending queue only, returning how many descriptors were dropped
    fn flush_pending(&self) -> usize;

    fn state(&self) -> ConductorState;

    fn failures(&self) -> &FailedObjectRegistry;

    fn queue_size(&self) -> usize;

    fn locked_count(&self) -> usize;

    fn collision_count(&self) -> usize;

    fn status(&self) -> ConductorStatus;

    fn failure_count(&self) -> usize {
        self.failures().size()
    }

    /// Remove every failure record, returning how many were cleared
    fn clear_failed(&self) -> usize {
        let cleared = self.failures().size();
        self.failures().clear();
        cleared
    }

    fn is_ready(&self) -> bool {
        self.state() == ConductorState::Ready
    }

    fn is_paused(&self) -> bool {
        self.state() == ConductorState::Paused
    }

    /// No queued work and no collisions waiting
    fn is_empty(&self) -> bool {
        self.queue_size() == 0 && self.collision_count() == 0
    }

    /// Nothing queued, nothing waiting and nothing in flight
    fn is_idle(&self) -> bool {
        self.is_empty() && self.locked_count() == 0
    }
}
