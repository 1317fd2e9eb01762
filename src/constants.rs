//! # System Constants
//!
//! Message namespaces, conductor identifiers and the default tuning values
//! shared by the configuration layer and the conductors.

/// Message namespaces understood by the built-in filters
pub mod namespaces {
    /// Events emitted by the repository when objects change
    pub const REPOSITORY: &str = "fedora";
    /// Explicit requests to run enhancement services
    pub const SERVICES: &str = "services";
    /// Requests against the search index
    pub const SOLR_UPDATE: &str = "solr-update";
}

/// Well-known conductor names
pub mod conductors {
    pub const SERVICES: &str = "services";
    pub const SOLR_UPDATE: &str = "solr-update";
}

/// Default values used when configuration omits a setting
pub mod defaults {
    pub const MAX_WORKERS: usize = 3;
    pub const SOLR_UPDATE_MAX_WORKERS: usize = 2;
    /// Delay before a recoverable failure is retried
    pub const RECOVERABLE_RETRY_DELAY_MS: u64 = 30_000;
    pub const FAILURE_REGISTRY_MAX_ENTRIES: usize = 10_000;
    /// One day
    pub const FAILURE_EXPIRY_SECONDS: u64 = 86_400;
    pub const CATCH_UP_PAGE_SIZE: usize = 50;
    pub const CATCH_UP_INTERVAL_SECONDS: u64 = 60;
}
