//! # Enhancement Service Contract
//!
//! Enhancement services are supplied by the embedding application
//! (thumbnailing, technical metadata, index document building, ...). The
//! conductors only ever see them through [`ObjectEnhancementService`].
//!
//! Services must be stateless with respect to a single execution: the same
//! [`ServiceRef`] is shared by every worker of a conductor.

pub mod errors;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::orchestration::descriptor::TaskDescriptor;
pub use errors::{EnhancementError, EnhancementResult, Severity};

/// Shared handle to a service implementation
pub type ServiceRef = Arc<dyn ObjectEnhancementService>;

#[async_trait]
pub trait ObjectEnhancementService: Send + Sync {
    /// Stable name, used for explicit service requests and failure records
    fn name(&self) -> &str;

    /// Inactive services are skipped by the message filters and catch-up
    fn is_active(&self) -> bool {
        true
    }

    /// Cheap rejection based on descriptor content only. Must not do I/O.
    fn prefilter_message(&self, descriptor: &TaskDescriptor) -> bool;

    /// Whether the service applies to the object in its current state.
    async fn is_applicable(&self, descriptor: &TaskDescriptor) -> EnhancementResult<bool>;

    /// Perform the enhancement.
    ///
    /// `cancel` fires when the owning conductor is aborted; long running work
    /// should check it between blocking calls.
    async fn execute(
        &self,
        descriptor: &TaskDescriptor,
        cancel: CancellationToken,
    ) -> EnhancementResult<()>;

    /// Whether the derivative this service produces is out of date
    async fn is_stale(&self, target_id: &str) -> EnhancementResult<bool> {
        let _ = target_id;
        Ok(false)
    }

    /// Objects still lacking this service's output, at most `max_results`
    async fn find_candidate_objects(&self, max_results: usize) -> EnhancementResult<Vec<String>> {
        let _ = max_results;
        Ok(Vec::new())
    }

    /// Objects whose output was produced before `prior_to`, at most `max_results`
    async fn find_stale_candidate_objects(
        &self,
        max_results: usize,
        prior_to: DateTime<Utc>,
    ) -> EnhancementResult<Vec<String>> {
        let _ = (max_results, prior_to);
        Ok(Vec::new())
    }
}

/// Ordered list of services making up one pipeline
#[derive(Clone, Default)]
pub struct ServiceStack {
    services: Vec<ServiceRef>,
}

impl ServiceStack {
    pub fn new(services: Vec<ServiceRef>) -> Self {
        Self { services }
    }

    /// Active services in pipeline order
    pub fn active(&self) -> Vec<ServiceRef> {
        self.services
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<ServiceRef> {
        self.services.iter().find(|s| s.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRef> {
        self.services.iter()
    }
}

impl std::fmt::Debug for ServiceStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.services.iter().map(|s| s.name()))
            .finish()
    }
}
