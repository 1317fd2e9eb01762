//! # Messaging Module
//!
//! Inbound message shape, per-conductor filters and the director that fans
//! messages out to conductors. Transport (how messages arrive) is left to the
//! embedding application.

pub mod director;
pub mod filters;
pub mod message;

pub use director::MessageDirector;
pub use filters::{MessageFilter, ServicesQueueMessageFilter, SolrUpdateMessageFilter};
pub use message::{
    EnhancementMessage, IndexingActionType, RepositoryAction, ServiceAction, UnknownAction,
};
