//! Shared fixtures for the integration tests: scriptable services and a
//! condition-based wait helper.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use conductor_core::config::{ConductorConfig, FailureRegistryConfig};
use conductor_core::orchestration::{ServicesConductor, TaskDescriptor};
use conductor_core::services::{
    EnhancementError, EnhancementResult, ObjectEnhancementService, ServiceRef, Severity,
};

/// Upper bound for any condition a test waits on
pub const WAIT: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds or [`WAIT`] elapses
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Let workers run long enough to do something they should not
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub fn conductor_config(max_workers: usize) -> ConductorConfig {
    ConductorConfig {
        max_workers,
        recoverable_retry_delay_ms: 20,
        start_paused: false,
    }
}

/// Conductor with a running worker pool
pub fn started_conductor(identifier: &str, max_workers: usize) -> Arc<ServicesConductor> {
    let conductor = Arc::new(ServicesConductor::new(
        identifier,
        conductor_config(max_workers),
        &FailureRegistryConfig::default(),
    ));
    conductor.start().unwrap();
    conductor
}

pub fn descriptor(target_id: &str, services: &[ServiceRef]) -> TaskDescriptor {
    TaskDescriptor::new(target_id, "services", "APPLY_SERVICE_STACK", services.to_vec())
}

/// Removes an object from the in-flight set however execution ends
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    target_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.target_id);
    }
}

/// Blocks every execution until [`GatedService::open`] is called.
/// Detects two concurrent executions for the same object.
pub struct GatedService {
    name: String,
    gate: Semaphore,
    started: AtomicUsize,
    executions: Mutex<HashMap<String, usize>>,
    in_flight: Mutex<HashSet<String>>,
    overlap: AtomicBool,
}

impl GatedService {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            executions: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            overlap: AtomicBool::new(false),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(10_000);
    }

    /// Executions entered, finished or not
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn executions(&self, target_id: &str) -> usize {
        self.executions.lock().get(target_id).copied().unwrap_or(0)
    }

    pub fn total_executions(&self) -> usize {
        self.executions.lock().values().sum()
    }

    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectEnhancementService for GatedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn prefilter_message(&self, _descriptor: &TaskDescriptor) -> bool {
        true
    }

    async fn is_applicable(&self, _descriptor: &TaskDescriptor) -> EnhancementResult<bool> {
        Ok(true)
    }

    async fn execute(
        &self,
        descriptor: &TaskDescriptor,
        cancel: CancellationToken,
    ) -> EnhancementResult<()> {
        let target_id = descriptor.target_id().to_string();
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.in_flight.lock().insert(target_id.clone()) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            target_id: target_id.clone(),
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(EnhancementError::recoverable("cancelled"));
            }
            permit = self.gate.acquire() => drop(permit),
        }
        tokio::task::yield_now().await;

        *self.executions.lock().entry(target_id).or_insert(0) += 1;
        Ok(())
    }
}

/// Service whose behavior is fixed up front: optional prefilter or
/// applicability rejection, and a number of failures before succeeding
pub struct ScriptedService {
    name: String,
    prefilter: bool,
    applicable: bool,
    severity: Severity,
    failures_remaining: AtomicUsize,
    calls: AtomicUsize,
    successes: AtomicUsize,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl ScriptedService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefilter: true,
            applicable: true,
            severity: Severity::Unrecoverable,
            failures_remaining: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Fail the first `times` executions with `severity`
    pub fn failing(mut self, severity: Severity, times: usize) -> Self {
        self.severity = severity;
        self.failures_remaining = AtomicUsize::new(times);
        self
    }

    pub fn rejected_by_prefilter(mut self) -> Self {
        self.prefilter = false;
        self
    }

    pub fn not_applicable(mut self) -> Self {
        self.applicable = false;
        self
    }

    /// Append `name:target` to `log` on every execution
    pub fn logging_to(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectEnhancementService for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn prefilter_message(&self, _descriptor: &TaskDescriptor) -> bool {
        self.prefilter
    }

    async fn is_applicable(&self, _descriptor: &TaskDescriptor) -> EnhancementResult<bool> {
        Ok(self.applicable)
    }

    async fn execute(
        &self,
        descriptor: &TaskDescriptor,
        _cancel: CancellationToken,
    ) -> EnhancementResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock()
                .push(format!("{}:{}", self.name, descriptor.target_id()));
        }

        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(EnhancementError::new(self.severity, "scripted failure"));
        }

        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Service backed by an in-memory "repository": objects lacking output are
/// catch-up candidates until executed
pub struct CandidateService {
    name: String,
    active: bool,
    missing: Mutex<BTreeSet<String>>,
    produced_at: Mutex<BTreeMap<String, DateTime<Utc>>>,
    processed: Mutex<Vec<String>>,
    finder_calls: AtomicUsize,
    stale_cutoffs: Mutex<Vec<DateTime<Utc>>>,
    finder_gate: Option<Semaphore>,
}

impl CandidateService {
    pub fn new<'a>(name: &str, missing: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            missing: Mutex::new(missing.into_iter().map(str::to_string).collect()),
            produced_at: Mutex::new(BTreeMap::new()),
            processed: Mutex::new(Vec::new()),
            finder_calls: AtomicUsize::new(0),
            stale_cutoffs: Mutex::new(Vec::new()),
            finder_gate: None,
        }
    }

    /// Objects whose output exists and was produced at the given time
    pub fn with_output(self, entries: &[(&str, DateTime<Utc>)]) -> Self {
        {
            let mut produced = self.produced_at.lock();
            for (target_id, at) in entries {
                produced.insert(target_id.to_string(), *at);
            }
        }
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Make every finder call wait for [`CandidateService::release_finder`]
    pub fn with_finder_gate(mut self) -> Self {
        self.finder_gate = Some(Semaphore::new(0));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn release_finder(&self) {
        if let Some(gate) = &self.finder_gate {
            gate.add_permits(10_000);
        }
    }

    pub fn processed(&self) -> Vec<String> {
        self.processed.lock().clone()
    }

    pub fn missing_count(&self) -> usize {
        self.missing.lock().len()
    }

    pub fn finder_calls(&self) -> usize {
        self.finder_calls.load(Ordering::SeqCst)
    }

    pub fn stale_cutoffs(&self) -> Vec<DateTime<Utc>> {
        self.stale_cutoffs.lock().clone()
    }

    async fn pass_gate(&self) {
        self.finder_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.finder_gate {
            let permit = gate.acquire().await;
            drop(permit);
        }
    }
}

#[async_trait]
impl ObjectEnhancementService for CandidateService {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn prefilter_message(&self, _descriptor: &TaskDescriptor) -> bool {
        true
    }

    async fn is_applicable(&self, _descriptor: &TaskDescriptor) -> EnhancementResult<bool> {
        Ok(true)
    }

    async fn execute(
        &self,
        descriptor: &TaskDescriptor,
        _cancel: CancellationToken,
    ) -> EnhancementResult<()> {
        let target_id = descriptor.target_id().to_string();
        self.missing.lock().remove(&target_id);
        self.produced_at.lock().insert(target_id.clone(), Utc::now());
        self.processed.lock().push(target_id);
        Ok(())
    }

    async fn is_stale(&self, target_id: &str) -> EnhancementResult<bool> {
        Ok(!self.produced_at.lock().contains_key(target_id))
    }

    async fn find_candidate_objects(&self, max_results: usize) -> EnhancementResult<Vec<String>> {
        self.pass_gate().await;
        Ok(self
            .missing
            .lock()
            .iter()
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn find_stale_candidate_objects(
        &self,
        max_results: usize,
        prior_to: DateTime<Utc>,
    ) -> EnhancementResult<Vec<String>> {
        self.pass_gate().await;
        self.stale_cutoffs.lock().push(prior_to);
        Ok(self
            .produced_at
            .lock()
            .iter()
            .filter(|(_, at)| **at < prior_to)
            .map(|(target_id, _)| target_id.clone())
            .take(max_results)
            .collect())
    }
}
