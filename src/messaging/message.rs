//! # Inbound Enhancement Messages
//!
//! The raw event shape the director routes. How messages arrive (JMS, a
//! queue table, a webhook) is the embedding application's concern; by the
//! time a message reaches the director it is one of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::namespaces;

/// "Something happened to repository object X"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementMessage {
    /// Message id for log correlation
    pub message_id: Uuid,
    /// Repository object identifier
    pub target_id: String,
    /// Message category, see [`crate::constants::namespaces`]
    pub namespace: String,
    /// Action name within the namespace
    pub action: String,
    /// Explicit service (or task type) override
    pub service_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EnhancementMessage {
    pub fn new(
        target_id: impl Into<String>,
        namespace: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            target_id: target_id.into(),
            namespace: namespace.into(),
            action: action.into(),
            service_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Request to run one named service against an object
    pub fn apply_service(target_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self::new(
            target_id,
            namespaces::SERVICES,
            ServiceAction::ApplyService.as_str(),
        )
        .with_service_name(service_name)
    }

    /// Request to run the whole service stack against an object
    pub fn apply_service_stack(target_id: impl Into<String>) -> Self {
        Self::new(
            target_id,
            namespaces::SERVICES,
            ServiceAction::ApplyServiceStack.as_str(),
        )
    }

    /// Repository change event
    pub fn repository_event(target_id: impl Into<String>, action: RepositoryAction) -> Self {
        Self::new(target_id, namespaces::REPOSITORY, action.as_str())
    }

    /// Search index request
    pub fn solr_update(target_id: impl Into<String>, action: IndexingActionType) -> Self {
        Self::new(target_id, namespaces::SOLR_UPDATE, action.as_str())
    }

    pub fn is_namespace(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }
}

/// Error produced when an action name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

macro_rules! action_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownAction;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownAction(other.to_string())),
                }
            }
        }
    };
}

action_enum! {
    /// Actions in the services namespace
    ServiceAction {
        ApplyServiceStack => "APPLY_SERVICE_STACK",
        ApplyService => "APPLY_SERVICE",
    }
}

action_enum! {
    /// Change events emitted by the repository
    RepositoryAction {
        Ingest => "ingest",
        ModifyDatastream => "modifyDatastream",
        AddDatastream => "addDatastream",
        AddRelationship => "addRelationship",
        PurgeObject => "purgeObject",
    }
}

action_enum! {
    /// Search index update actions
    IndexingActionType {
        Add => "ADD",
        Delete => "DELETE",
        UpdateStatus => "UPDATE_STATUS",
        Reindex => "REINDEX",
    }
}

impl RepositoryAction {
    /// Events after which enhancements should be (re)applied
    pub fn triggers_enhancement(&self) -> bool {
        !matches!(self, RepositoryAction::PurgeObject)
    }

    /// Index action implied by a repository event, if any
    pub fn indexing_action(&self) -> Option<IndexingActionType> {
        match self {
            RepositoryAction::Ingest => None,
            RepositoryAction::ModifyDatastream
            | RepositoryAction::AddDatastream
            | RepositoryAction::AddRelationship => Some(IndexingActionType::Add),
            RepositoryAction::PurgeObject => Some(IndexingActionType::Delete),
        }
    }
}
