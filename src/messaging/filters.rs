//! # Message Filters
//!
//! A filter decides whether a message concerns its conductor and, if so,
//! turns it into a [`TaskDescriptor`]. Filters only inspect message content
//! (namespace, action, explicit service name); they never do I/O and never
//! mutate the message.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::message::{EnhancementMessage, IndexingActionType, RepositoryAction, ServiceAction};
use crate::constants::namespaces;
use crate::orchestration::conductor::MessageConductor;
use crate::orchestration::descriptor::TaskDescriptor;
use crate::services::{ServiceRef, ServiceStack};

pub trait MessageFilter: Send + Sync {
    /// Conductor receiving descriptors for accepted messages
    fn conductor(&self) -> &Arc<dyn MessageConductor>;

    /// Whether the message concerns this filter's conductor
    fn filter(&self, message: &EnhancementMessage) -> bool;

    /// Descriptor for an accepted message, or `None` if nothing would run
    fn to_descriptor(&self, message: &EnhancementMessage) -> Option<TaskDescriptor>;
}

/// Routes enhancement requests and repository change events to the
/// enhancement conductor
pub struct ServicesQueueMessageFilter {
    conductor: Arc<dyn MessageConductor>,
    services: ServiceStack,
}

impl ServicesQueueMessageFilter {
    pub fn new(conductor: Arc<dyn MessageConductor>, services: ServiceStack) -> Self {
        Self {
            conductor,
            services,
        }
    }

    /// Active services the message asks for, in pipeline order
    fn requested_services(&self, message: &EnhancementMessage) -> Vec<ServiceRef> {
        if message.is_namespace(namespaces::SERVICES) {
            match message.action.parse::<ServiceAction>() {
                Ok(ServiceAction::ApplyService) => {
                    return message
                        .service_name
                        .as_deref()
                        .and_then(|name| self.services.find(name))
                        .filter(|service| service.is_active())
                        .into_iter()
                        .collect();
                }
                Ok(ServiceAction::ApplyServiceStack) => {
                    // An explicit name narrows the stack to that service
                    if let Some(name) = message.service_name.as_deref() {
                        return self
                            .services
                            .active()
                            .into_iter()
                            .filter(|s| s.name() == name)
                            .collect();
                    }
                    return self.services.active();
                }
                Err(_) => return Vec::new(),
            }
        }

        if message.is_namespace(namespaces::REPOSITORY) {
            return match message.action.parse::<RepositoryAction>() {
                Ok(action) if action.triggers_enhancement() => self.services.active(),
                _ => Vec::new(),
            };
        }

        Vec::new()
    }
}

impl MessageFilter for ServicesQueueMessageFilter {
    fn conductor(&self) -> &Arc<dyn MessageConductor> {
        &self.conductor
    }

    fn filter(&self, message: &EnhancementMessage) -> bool {
        let accepted = !self.requested_services(message).is_empty();
        if !accepted {
            debug!(
                message_id = %message.message_id,
                namespace = %message.namespace,
                action = %message.action,
                "Services filter rejected message"
            );
        }
        accepted
    }

    fn to_descriptor(&self, message: &EnhancementMessage) -> Option<TaskDescriptor> {
        let services = self.requested_services(message);
        if services.is_empty() {
            return None;
        }
        Some(
            TaskDescriptor::new(
                message.target_id.clone(),
                message.namespace.clone(),
                message.action.clone(),
                services,
            )
            .with_explicit_task_type(message.service_name.clone())
            .with_timestamp(message.timestamp),
        )
    }
}

/// Routes search index requests, and repository events that change index
/// content, to the index update conductor
pub struct SolrUpdateMessageFilter {
    conductor: Arc<dyn MessageConductor>,
    handlers: HashMap<IndexingActionType, ServiceRef>,
}

impl SolrUpdateMessageFilter {
    pub fn new(
        conductor: Arc<dyn MessageConductor>,
        handlers: HashMap<IndexingActionType, ServiceRef>,
    ) -> Self {
        Self {
            conductor,
            handlers,
        }
    }

    fn indexing_action(message: &EnhancementMessage) -> Option<IndexingActionType> {
        if message.is_namespace(namespaces::SOLR_UPDATE) {
            return message.action.parse().ok();
        }
        if message.is_namespace(namespaces::REPOSITORY) {
            return message
                .action
                .parse::<RepositoryAction>()
                .ok()
                .and_then(|action| action.indexing_action());
        }
        None
    }

    fn handler_for(&self, message: &EnhancementMessage) -> Option<(IndexingActionType, ServiceRef)> {
        let action = Self::indexing_action(message)?;
        let handler = self.handlers.get(&action).filter(|h| h.is_active())?;
        Some((action, Arc::clone(handler)))
    }
}

impl MessageFilter for SolrUpdateMessageFilter {
    fn conductor(&self) -> &Arc<dyn MessageConductor> {
        &self.conductor
    }

    fn filter(&self, message: &EnhancementMessage) -> bool {
        self.handler_for(message).is_some()
    }

    fn to_descriptor(&self, message: &EnhancementMessage) -> Option<TaskDescriptor> {
        let (action, handler) = self.handler_for(message)?;
        Some(
            TaskDescriptor::new(
                message.target_id.clone(),
                namespaces::SOLR_UPDATE,
                action.as_str(),
                vec![handler],
            )
            .with_explicit_task_type(message.service_name.clone())
            .with_timestamp(message.timestamp),
        )
    }
}
