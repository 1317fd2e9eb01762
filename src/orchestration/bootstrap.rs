//! # Enhancement System Bootstrap
//!
//! Wires the whole engine from configuration plus the services supplied by
//! the embedding application:
//!
//! - the services conductor, fed by [`ServicesQueueMessageFilter`]
//! - the solr-update conductor, fed by [`SolrUpdateMessageFilter`]
//! - the [`MessageDirector`] holding both filters in that order
//! - the [`CatchUpService`] watching the services conductor
//! - the [`OperationsManager`] over all of the above
//!
//! ```rust,no_run
//! use conductor_core::config::ConfigManager;
//! use conductor_core::orchestration::EnhancementSystem;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let system = EnhancementSystem::bootstrap(config, Vec::new(), HashMap::new())?;
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigManager;
use crate::constants::conductors;
use crate::error::Result;
use crate::messaging::{
    EnhancementMessage, IndexingActionType, MessageDirector, ServicesQueueMessageFilter,
    SolrUpdateMessageFilter,
};
use crate::orchestration::catch_up::CatchUpService;
use crate::orchestration::conductor::{MessageConductor, ServicesConductor};
use crate::orchestration::operations::OperationsManager;
use crate::services::{ServiceRef, ServiceStack};

/// Running engine handle
pub struct EnhancementSystem {
    config_manager: Arc<ConfigManager>,
    services_conductor: Arc<ServicesConductor>,
    solr_update_conductor: Arc<ServicesConductor>,
    director: Arc<MessageDirector>,
    catch_up: Arc<CatchUpService>,
    operations: OperationsManager,
    schedule: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl EnhancementSystem {
    /// Build and start every component. Must be called within a tokio runtime.
    pub fn bootstrap(
        config_manager: Arc<ConfigManager>,
        services: Vec<ServiceRef>,
        indexing_actions: HashMap<IndexingActionType, ServiceRef>,
    ) -> Result<Self> {
        let config = config_manager.config().clone();
        config.validate()?;

        let services = ServiceStack::new(services);
        info!(
            environment = %config_manager.environment(),
            services = ?services,
            indexing_actions = indexing_actions.len(),
            "🚀 BOOTSTRAP: Starting enhancement system"
        );

        let services_conductor = Arc::new(ServicesConductor::new(
            conductors::SERVICES,
            config.services_conductor.clone(),
            &config.failure_registry,
        ));
        let solr_update_conductor = Arc::new(ServicesConductor::new(
            conductors::SOLR_UPDATE,
            config.solr_update_conductor.clone(),
            &config.failure_registry,
        ));

        let services_handle: Arc<dyn MessageConductor> = services_conductor.clone();
        let solr_handle: Arc<dyn MessageConductor> = solr_update_conductor.clone();

        let director = Arc::new(
            MessageDirector::new()
                .with_filter(Box::new(ServicesQueueMessageFilter::new(
                    Arc::clone(&services_handle),
                    services.clone(),
                )))
                .with_filter(Box::new(SolrUpdateMessageFilter::new(
                    Arc::clone(&solr_handle),
                    indexing_actions,
                ))),
        );

        let catch_up = Arc::new(CatchUpService::new(
            config.catch_up.clone(),
            Arc::clone(&director),
            services,
            vec![Arc::clone(&services_handle)],
        ));

        let operations = OperationsManager::new(
            vec![services_handle, solr_handle],
            Arc::clone(&catch_up),
        );

        services_conductor.start()?;
        solr_update_conductor.start()?;

        let schedule = if config.catch_up.enabled {
            let token = CancellationToken::new();
            let handle = catch_up.spawn_schedule(token.clone());
            Some((token, handle))
        } else {
            None
        };

        info!("🚀 BOOTSTRAP: Enhancement system started");

        Ok(Self {
            config_manager,
            services_conductor,
            solr_update_conductor,
            director,
            catch_up,
            operations,
            schedule: Mutex::new(schedule),
        })
    }

    /// Route one inbound message, returning how many conductors accepted it
    pub fn submit(&self, message: &EnhancementMessage) -> usize {
        self.director.direct(Some(message))
    }

    pub fn director(&self) -> &Arc<MessageDirector> {
        &self.director
    }

    pub fn services_conductor(&self) -> &Arc<ServicesConductor> {
        &self.services_conductor
    }

    pub fn solr_update_conductor(&self) -> &Arc<ServicesConductor> {
        &self.solr_update_conductor
    }

    pub fn catch_up(&self) -> &Arc<CatchUpService> {
        &self.catch_up
    }

    pub fn operations(&self) -> &OperationsManager {
        &self.operations
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// Stop the catch-up schedule and tear down both conductors
    pub async fn shutdown(&self) {
        let schedule = self.schedule.lock().take();
        if let Some((token, handle)) = schedule {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "🛑 SHUTDOWN: Catch-up schedule ended abnormally");
            }
        }
        self.catch_up.deactivate();

        self.services_conductor.shutdown_now().await;
        self.solr_update_conductor.shutdown_now().await;
        info!("🛑 SHUTDOWN: Enhancement system stopped");
    }
}

impl std::fmt::Debug for EnhancementSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnhancementSystem")
            .field("environment", &self.config_manager.environment())
            .field("services_conductor", &self.services_conductor)
            .field("solr_update_conductor", &self.solr_update_conductor)
            .field("director", &self.director)
            .finish()
    }
}
