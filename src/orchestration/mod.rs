//! # Orchestration
//!
//! Execution side of the engine: task descriptors, the conductors that run
//! them, the failure registry each conductor owns, the catch-up reconciler,
//! operator controls and system bootstrap.

pub mod bootstrap;
pub mod catch_up;
pub mod conductor;
pub mod descriptor;
pub mod failure_registry;
pub mod operations;

pub use bootstrap::EnhancementSystem;
pub use catch_up::{parse_prior_to, CatchUpReport, CatchUpService, CatchUpStopReason};
pub use conductor::{
    ConductorState, ConductorStatus, Enqueued, MessageConductor, MetricsSnapshot,
    ServicesConductor,
};
pub use descriptor::TaskDescriptor;
pub use failure_registry::{FailedObjectRegistry, FailureRecord};
pub use operations::OperationsManager;
