//! # Message Director
//!
//! Routes each inbound message to every conductor whose filter accepts it.
//! Routing runs synchronously on the caller's task; conductor `add` never
//! blocks, so the director is safe to call from a message listener.

use tracing::{debug, warn};

use super::filters::MessageFilter;
use super::message::EnhancementMessage;

/// Ordered list of filters, each owning a reference to its conductor
#[derive(Default)]
pub struct MessageDirector {
    filters: Vec<Box<dyn MessageFilter>>,
}

impl MessageDirector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter; filters are evaluated in registration order
    pub fn register(&mut self, filter: Box<dyn MessageFilter>) {
        debug!(
            conductor = %filter.conductor().identifier(),
            position = self.filters.len(),
            "🧭 DIRECTOR: Filter registered"
        );
        self.filters.push(filter);
    }

    pub fn with_filter(mut self, filter: Box<dyn MessageFilter>) -> Self {
        self.register(filter);
        self
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Route a message. Returns how many conductors accepted a descriptor.
    pub fn direct(&self, message: Option<&EnhancementMessage>) -> usize {
        let Some(message) = message else {
            return 0;
        };

        let mut routed = 0;
        for filter in &self.filters {
            if !filter.filter(message) {
                continue;
            }
            let Some(descriptor) = filter.to_descriptor(message) else {
                continue;
            };

            let conductor = filter.conductor();
            match conductor.add(descriptor) {
                Ok(outcome) => {
                    routed += 1;
                    debug!(
                        message_id = %message.message_id,
                        target_id = %message.target_id,
                        conductor = %conductor.identifier(),
                        outcome = ?outcome,
                        "🧭 DIRECTOR: Message routed"
                    );
                }
                Err(e) => {
                    warn!(
                        message_id = %message.message_id,
                        target_id = %message.target_id,
                        conductor = %conductor.identifier(),
                        error = %e,
                        "🧭 DIRECTOR: Conductor refused descriptor"
                    );
                }
            }
        }

        if routed == 0 {
            debug!(
                message_id = %message.message_id,
                namespace = %message.namespace,
                action = %message.action,
                "🧭 DIRECTOR: No conductor accepted message"
            );
        }
        routed
    }
}

impl std::fmt::Debug for MessageDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.conductor().identifier()))
            .finish()
    }
}
