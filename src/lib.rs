#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Conductor Core
//!
//! Message-driven enhancement engine for a digital object repository.
//!
//! ## Overview
//!
//! Repository change events and explicit requests arrive as
//! [`messaging::EnhancementMessage`]s. The [`messaging::MessageDirector`]
//! routes each message through per-conductor filters; every accepting filter
//! turns it into a [`orchestration::TaskDescriptor`] and hands it to its
//! conductor. A conductor runs the descriptor's service pipeline on a bounded
//! worker pool, never executing two descriptors for the same object at once,
//! and reacts to failures according to their declared severity.
//!
//! ## Module Organization
//!
//! - [`services`] - the enhancement service contract and failure severities
//! - [`messaging`] - inbound messages, filters and the director
//! - [`orchestration`] - conductors, failure registry, catch-up, operations, bootstrap
//! - [`config`] - layered configuration loading
//! - [`logging`] - structured logging setup
//! - [`error`] - engine errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor_core::config::ConfigManager;
//! use conductor_core::messaging::{EnhancementMessage, RepositoryAction};
//! use conductor_core::orchestration::EnhancementSystem;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! conductor_core::logging::init_structured_logging();
//!
//! let config = ConfigManager::load()?;
//! let system = EnhancementSystem::bootstrap(config, Vec::new(), HashMap::new())?;
//!
//! let event = EnhancementMessage::repository_event("uuid:1234", RepositoryAction::ModifyDatastream);
//! system.submit(&event);
//!
//! println!("{}", system.operations().status_report());
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod orchestration;
pub mod services;

pub use config::{ConfigManager, EnhancementConfig};
pub use error::{ConductorError, Result};
pub use messaging::{EnhancementMessage, MessageDirector};
pub use orchestration::{
    ConductorState, EnhancementSystem, MessageConductor, ServicesConductor, TaskDescriptor,
};
pub use services::{
    EnhancementError, EnhancementResult, ObjectEnhancementService, ServiceRef, ServiceStack,
    Severity,
};
