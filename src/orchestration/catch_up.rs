//! # Catch-Up Reconciler
//!
//! Re-derives work from the state of the repository instead of from delivered
//! events. A pass asks every active service for candidate objects (missing
//! output, or output older than a cutoff) one page at a time and feeds each
//! candidate back through the [`MessageDirector`] as an `APPLY_SERVICE`
//! request.
//!
//! At most one pass runs at a time. A pass ends when every finder is
//! exhausted, when a watched conductor still has queued work, or when
//! [`CatchUpService::deactivate`] is called.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CatchUpConfig;
use crate::error::{ConductorError, Result};
use crate::messaging::{EnhancementMessage, MessageDirector};
use crate::orchestration::conductor::MessageConductor;
use crate::services::ServiceStack;

/// Why a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpStopReason {
    /// Every finder returned an empty page
    Exhausted,
    /// A watched conductor still had queued work
    Backpressure,
    /// `deactivate` was called
    Deactivated,
}

/// Summary of one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchUpReport {
    pub prior_to: Option<DateTime<Utc>>,
    pub pages: usize,
    pub candidates_submitted: usize,
    pub stop_reason: CatchUpStopReason,
}

/// Clears the active flag when a pass ends, including by panic
struct ActivePass<'a>(&'a AtomicBool);

impl Drop for ActivePass<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CatchUpService {
    config: CatchUpConfig,
    director: Arc<MessageDirector>,
    services: ServiceStack,
    /// Conductors whose backlog throttles the pass
    watched: Vec<Arc<dyn MessageConductor>>,
    active: AtomicBool,
    stop_requested: AtomicBool,
}

/// Parse a strict RFC 3339 cutoff, e.g. `2024-01-31T12:00:00Z`
pub fn parse_prior_to(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| ConductorError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

impl CatchUpService {
    pub fn new(
        config: CatchUpConfig,
        director: Arc<MessageDirector>,
        services: ServiceStack,
        watched: Vec<Arc<dyn MessageConductor>>,
    ) -> Self {
        Self {
            config,
            director,
            services,
            watched,
            active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start a pass for missing output in the background.
    /// Returns false if a pass is already running.
    pub fn activate(self: &Arc<Self>) -> bool {
        self.spawn_pass(None)
    }

    /// Start a pass for output produced before `prior_to` in the background.
    /// The timestamp is validated before anything else happens.
    pub fn activate_prior_to(self: &Arc<Self>, prior_to: &str) -> Result<bool> {
        let cutoff = parse_prior_to(prior_to)?;
        Ok(self.spawn_pass(Some(cutoff)))
    }

    /// Ask the running pass to stop after its current page.
    /// Returns whether a pass was running.
    pub fn deactivate(&self) -> bool {
        let active = self.is_active();
        if active {
            self.stop_requested.store(true, Ordering::Release);
            info!("🔁 CATCH-UP: Deactivation requested");
        }
        active
    }

    /// Run a pass on the current task and wait for it to finish
    pub async fn run_pass(&self, prior_to: Option<DateTime<Utc>>) -> Result<CatchUpReport> {
        if !self.try_begin() {
            return Err(ConductorError::CatchUpAlreadyActive);
        }
        let _pass = ActivePass(&self.active);
        Ok(self.execute_pass(prior_to).await)
    }

    /// Run a pass every `interval_seconds` while all watched conductors are
    /// idle, until `cancel` fires
    pub fn spawn_schedule(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = service.config.interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_seconds = period.as_secs(),
                "🔁 CATCH-UP: Schedule started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !service.watched.iter().all(|c| c.is_idle()) {
                    debug!("🔁 CATCH-UP: Conductors busy, skipping scheduled pass");
                    continue;
                }

                match service.run_pass(None).await {
                    Ok(report) => debug!(
                        submitted = report.candidates_submitted,
                        stop_reason = ?report.stop_reason,
                        "🔁 CATCH-UP: Scheduled pass finished"
                    ),
                    Err(e) => debug!(error = %e, "🔁 CATCH-UP: Scheduled pass skipped"),
                }
            }

            service.deactivate();
            info!("🔁 CATCH-UP: Schedule stopped");
        })
    }

    fn try_begin(&self) -> bool {
        let acquired = self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if acquired {
            self.stop_requested.store(false, Ordering::Release);
        }
        acquired
    }

    fn spawn_pass(self: &Arc<Self>, prior_to: Option<DateTime<Utc>>) -> bool {
        if !self.try_begin() {
            info!("🔁 CATCH-UP: Pass already active, activation ignored");
            return false;
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let _pass = ActivePass(&service.active);
            service.execute_pass(prior_to).await;
        });
        true
    }

    fn backlog(&self) -> bool {
        self.watched.iter().any(|c| !c.is_empty())
    }

    async fn execute_pass(&self, prior_to: Option<DateTime<Utc>>) -> CatchUpReport {
        let mut report = CatchUpReport {
            prior_to,
            pages: 0,
            candidates_submitted: 0,
            stop_reason: CatchUpStopReason::Exhausted,
        };

        info!(prior_to = ?prior_to, "🔁 CATCH-UP: Pass started");

        'services: for service in self.services.active() {
            let mut seen: HashSet<String> = HashSet::new();

            loop {
                if self.stop_requested.load(Ordering::Acquire) {
                    report.stop_reason = CatchUpStopReason::Deactivated;
                    break 'services;
                }
                if self.backlog() {
                    report.stop_reason = CatchUpStopReason::Backpressure;
                    break 'services;
                }

                let page = match prior_to {
                    Some(cutoff) => {
                        service
                            .find_stale_candidate_objects(self.config.page_size, cutoff)
                            .await
                    }
                    None => service.find_candidate_objects(self.config.page_size).await,
                };

                let candidates = match page {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(
                            service = %service.name(),
                            error = %e,
                            "🔁 CATCH-UP: Candidate lookup failed, skipping service"
                        );
                        break;
                    }
                };

                // A finder that only repeats candidates already submitted is done
                let fresh: Vec<String> = candidates
                    .into_iter()
                    .filter(|id| seen.insert(id.clone()))
                    .collect();
                if fresh.is_empty() {
                    break;
                }

                report.pages += 1;
                for target_id in &fresh {
                    let message = EnhancementMessage::apply_service(target_id, service.name());
                    self.director.direct(Some(&message));
                }
                report.candidates_submitted += fresh.len();

                debug!(
                    service = %service.name(),
                    page_len = fresh.len(),
                    "🔁 CATCH-UP: Page submitted"
                );
            }
        }

        info!(
            pages = report.pages,
            submitted = report.candidates_submitted,
            stop_reason = ?report.stop_reason,
            "🔁 CATCH-UP: Pass finished"
        );
        report
    }
}

impl std::fmt::Debug for CatchUpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchUpService")
            .field("config", &self.config)
            .field("services", &self.services)
            .field("active", &self.is_active())
            .finish()
    }
}
