//! # Services Conductor
//!
//! Bounded worker pool executing service pipelines for queued descriptors.
//!
//! Each worker loops: wait until the conductor is ready and a descriptor is
//! dispatchable, lock the descriptor's object, run its services in order, then
//! route the outcome through the severity policy:
//!
//! | Severity        | Effect                                                        |
//! |-----------------|---------------------------------------------------------------|
//! | success         | failure record cleared, next collision promoted               |
//! | `Recoverable`   | re-queued from the failing service after the retry delay      |
//! | `Unrecoverable` | failure recorded, remaining services abandoned                |
//! | `Fatal`         | failure recorded and the conductor paused                     |
//! | `Unclassified`  | handled like `Unrecoverable`; panics in services land here    |
//!
//! The same engine backs both the enhancement conductor and the search
//! index conductor; they differ only in the filter that feeds them.
//!
//! ```rust
//! use conductor_core::config::{ConductorConfig, FailureRegistryConfig};
//! use conductor_core::orchestration::{MessageConductor, ServicesConductor, TaskDescriptor};
//!
//! # tokio_test::block_on(async {
//! let conductor = ServicesConductor::new(
//!     "services",
//!     ConductorConfig::default(),
//!     &FailureRegistryConfig::default(),
//! );
//! conductor.start().unwrap();
//!
//! let descriptor = TaskDescriptor::new("uuid:1", "services", "APPLY_SERVICE_STACK", Vec::new());
//! conductor.add(descriptor).unwrap();
//!
//! conductor.shutdown_now().await;
//! assert_eq!(conductor.queue_size(), 0);
//! # });
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::metrics::{ConductorMetrics, MetricsSnapshot};
use super::work_queue::{Dispatch, Enqueued, WorkQueue};
use super::{ConductorState, ConductorStatus, MessageConductor};
use crate::config::{ConductorConfig, FailureRegistryConfig};
use crate::error::{ConductorError, Result};
use crate::orchestration::descriptor::TaskDescriptor;
use crate::orchestration::failure_registry::FailedObjectRegistry;
use crate::services::{EnhancementError, Severity};

/// How a pipeline run ended
#[derive(Debug)]
enum PipelineOutcome {
    /// Every service was skipped or succeeded
    Completed { executed: u64 },
    /// The service at `index` failed; `executed` services before it succeeded
    Failed {
        index: usize,
        executed: u64,
        error: EnhancementError,
    },
}

/// One set of worker tasks sharing a cancellation token
struct WorkerGeneration {
    generation: u64,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// State shared between the conductor handle and its workers
struct ConductorInner {
    identifier: String,
    config: ConductorConfig,
    state: AtomicU8,
    queue: Mutex<WorkQueue>,
    wake: Notify,
    failures: FailedObjectRegistry,
    metrics: ConductorMetrics,
}

pub struct ServicesConductor {
    inner: Arc<ConductorInner>,
    workers: Mutex<Option<WorkerGeneration>>,
    next_generation: Mutex<u64>,
}

impl ServicesConductor {
    /// Create a conductor. Workers are not running until [`ServicesConductor::start`].
    pub fn new(
        identifier: impl Into<String>,
        config: ConductorConfig,
        failure_config: &FailureRegistryConfig,
    ) -> Self {
        let initial_state = if config.start_paused {
            ConductorState::Paused
        } else {
            ConductorState::Ready
        };

        Self {
            inner: Arc::new(ConductorInner {
                identifier: identifier.into(),
                state: AtomicU8::new(initial_state as u8),
                queue: Mutex::new(WorkQueue::new()),
                wake: Notify::new(),
                failures: FailedObjectRegistry::new(failure_config),
                metrics: ConductorMetrics::new(),
                config,
            }),
            workers: Mutex::new(None),
            next_generation: Mutex::new(0),
        }
    }

    /// Spawn the worker pool on the current tokio runtime. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.state() == ConductorState::ShuttingDown {
            warn!(
                conductor = %self.inner.identifier,
                "🎼 CONDUCTOR: Refusing start request, conductor is shutting down"
            );
            return Err(ConductorError::InvalidState(format!(
                "conductor {} cannot start after shutdown",
                self.inner.identifier
            )));
        }
        self.spawn_generation();
        Ok(())
    }

    pub fn max_workers(&self) -> usize {
        self.inner.config.max_workers
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Whether the worker pool is running
    pub fn is_started(&self) -> bool {
        self.workers.lock().is_some()
    }

    fn spawn_generation(&self) {
        let mut slot = self.workers.lock();
        if slot.is_some() {
            return;
        }

        let generation = {
            let mut next = self.next_generation.lock();
            *next += 1;
            *next
        };
        let cancel = CancellationToken::new();
        let handles = (0..self.inner.config.max_workers)
            .map(|worker_index| {
                let inner = Arc::clone(&self.inner);
                let cancel = cancel.clone();
                let span = info_span!(
                    "conductor_worker",
                    conductor = %self.inner.identifier,
                    generation,
                    worker_index
                );
                tokio::spawn(inner.worker_loop(cancel).instrument(span))
            })
            .collect();

        info!(
            conductor = %self.inner.identifier,
            generation,
            workers = self.inner.config.max_workers,
            "🏊 POOL: Worker pool started"
        );

        *slot = Some(WorkerGeneration {
            generation,
            cancel,
            handles,
        });
    }

    /// Cancel and join the current worker generation, if any
    async fn stop_generation(&self) -> Option<u64> {
        let generation = self.workers.lock().take()?;
        generation.cancel.cancel();
        for handle in &generation.handles {
            handle.abort();
        }
        for handle in generation.handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(
                        conductor = %self.inner.identifier,
                        error = %e,
                        "🏊 POOL: Worker task ended abnormally"
                    );
                }
            }
        }
        Some(generation.generation)
    }
}

impl ConductorInner {
    fn state(&self) -> ConductorState {
        ConductorState::from(self.state.load(Ordering::Acquire))
    }

    /// Move between states unless the conductor is shutting down
    fn transition(&self, from: ConductorState, to: ConductorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn pause(&self) -> bool {
        self.transition(ConductorState::Ready, ConductorState::Paused)
    }

    async fn worker_loop(self: Arc<Self>, cancel: CancellationToken) {
        debug!("Worker started");
        loop {
            let descriptor = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                descriptor = self.next_descriptor() => descriptor,
            };

            let outcome = tokio::select! {
                biased;
                // The descriptor stays locked; abort releases it after joining workers
                _ = cancel.cancelled() => break,
                outcome = self.run_pipeline(&descriptor, cancel.clone()) => outcome,
            };

            self.handle_outcome(descriptor, outcome);
        }
        debug!("Worker stopped");
    }

    /// Wait until the conductor is ready and a descriptor can be dispatched
    async fn next_descriptor(&self) -> TaskDescriptor {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before inspecting the queue so a concurrent wake is not lost
            notified.as_mut().enable();

            let dispatch = if self.state() == ConductorState::Ready {
                self.queue.lock().next_dispatch(Instant::now())
            } else {
                Dispatch::Idle
            };

            match dispatch {
                Dispatch::Ready(descriptor) => return descriptor,
                Dispatch::WaitUntil(at) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(tokio::time::Instant::from_std(at)) => {}
                    }
                }
                Dispatch::Idle => notified.await,
            }
        }
    }

    async fn run_pipeline(
        &self,
        descriptor: &TaskDescriptor,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let mut executed = 0;

        for (index, service) in descriptor.applicable_services().iter().enumerate() {
            let step = AssertUnwindSafe(async {
                if !service.prefilter_message(descriptor) {
                    debug!(
                        target_id = %descriptor.target_id(),
                        service = %service.name(),
                        "Service rejected descriptor in prefilter"
                    );
                    return Ok(false);
                }
                if !service.is_applicable(descriptor).await? {
                    debug!(
                        target_id = %descriptor.target_id(),
                        service = %service.name(),
                        "Service not applicable"
                    );
                    return Ok(false);
                }
                service.execute(descriptor, cancel.clone()).await?;
                Ok::<_, EnhancementError>(true)
            })
            .catch_unwind()
            .await;

            let result = match step {
                Ok(result) => result,
                Err(panic) => Err(EnhancementError::unclassified(format!(
                    "service panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };

            match result {
                Ok(true) => executed += 1,
                Ok(false) => {}
                Err(error) => {
                    return PipelineOutcome::Failed {
                        index,
                        executed,
                        error: error.for_service(service.name()),
                    }
                }
            }
        }

        PipelineOutcome::Completed { executed }
    }

    fn handle_outcome(&self, mut descriptor: TaskDescriptor, outcome: PipelineOutcome) {
        match outcome {
            PipelineOutcome::Completed { executed } => {
                self.metrics.record_completed(executed);
                self.failures.remove(descriptor.target_id());
                self.queue.lock().complete(&descriptor);
                debug!(
                    conductor = %self.identifier,
                    target_id = %descriptor.target_id(),
                    services_executed = executed,
                    attempt = descriptor.attempt(),
                    "✅ CONDUCTOR: Pipeline completed"
                );
            }
            PipelineOutcome::Failed {
                index,
                executed,
                error,
            } => {
                self.metrics.record_services_completed(executed);
                self.metrics.record_failure(error.severity);
                if error.severity.is_recorded() {
                    self.record_failure(&descriptor, &error);
                }

                match error.severity {
                    Severity::Recoverable => {
                        descriptor.narrow_from(index);
                        descriptor.next_attempt();
                        let delay = self.config.recoverable_retry_delay();
                        warn!(
                            conductor = %self.identifier,
                            target_id = %descriptor.target_id(),
                            attempt = descriptor.attempt(),
                            retry_delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "🔄 CONDUCTOR: Recoverable failure, re-queueing"
                        );
                        let target_id = descriptor.target_id().to_string();
                        if !self.queue.lock().retry(descriptor, Instant::now() + delay) {
                            debug!(
                                conductor = %self.identifier,
                                target_id = %target_id,
                                "🧹 CONDUCTOR: Descriptor cleared while running, not re-queued"
                            );
                        }
                    }
                    Severity::Fatal => {
                        if self.pause() {
                            error!(
                                conductor = %self.identifier,
                                target_id = %descriptor.target_id(),
                                error = %error,
                                "🛑 CONDUCTOR: Fatal failure, conductor paused until resumed"
                            );
                        }
                        self.queue.lock().complete(&descriptor);
                    }
                    Severity::Unrecoverable | Severity::Unclassified => {
                        error!(
                            conductor = %self.identifier,
                            target_id = %descriptor.target_id(),
                            severity = %error.severity,
                            error = %error,
                            "❌ CONDUCTOR: Descriptor failed"
                        );
                        self.queue.lock().complete(&descriptor);
                    }
                }
            }
        }
        self.wake.notify_waiters();
    }

    fn record_failure(&self, descriptor: &TaskDescriptor, error: &EnhancementError) {
        self.failures.put(
            descriptor.target_id(),
            error.severity,
            error.service.as_deref(),
            &error.message,
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl MessageConductor for ServicesConductor {
    fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    fn add(&self, descriptor: TaskDescriptor) -> Result<Enqueued> {
        if self.state() == ConductorState::ShuttingDown {
            return Err(ConductorError::ShuttingDown {
                conductor: self.inner.identifier.clone(),
            });
        }

        let target_id = descriptor.target_id().to_string();
        let enqueued = self.inner.queue.lock().enqueue(descriptor);
        self.inner
            .metrics
            .record_added(enqueued == Enqueued::Collision);

        debug!(
            conductor = %self.inner.identifier,
            target_id = %target_id,
            outcome = ?enqueued,
            "📥 CONDUCTOR: Descriptor added"
        );

        if enqueued == Enqueued::Queued {
            self.inner.wake.notify_waiters();
        }
        Ok(enqueued)
    }

    fn pause(&self) {
        if self.inner.pause() {
            info!(conductor = %self.inner.identifier, "⏸️ CONDUCTOR: Paused");
        }
    }

    fn resume(&self) {
        if self
            .inner
            .transition(ConductorState::Paused, ConductorState::Ready)
        {
            info!(conductor = %self.inner.identifier, "▶️ CONDUCTOR: Resumed");
            self.inner.wake.notify_waiters();
        }
    }

    async fn abort(&self) {
        let stopped = self.stop_generation().await;
        let released = self.inner.queue.lock().release_all_locked();
        self.inner.metrics.record_aborted(released.len() as u64);

        warn!(
            conductor = %self.inner.identifier,
            generation = ?stopped,
            aborted = released.len(),
            queue_size = self.queue_size(),
            "🛑 CONDUCTOR: In-flight work aborted"
        );

        if stopped.is_some() && self.state() != ConductorState::ShuttingDown {
            self.spawn_generation();
        }
        self.inner.wake.notify_waiters();
    }

    async fn shutdown_now(&self) {
        self.inner
            .state
            .store(ConductorState::ShuttingDown as u8, Ordering::Release);
        self.stop_generation().await;

        let discarded = {
            let mut queue = self.inner.queue.lock();
            let discarded = queue.pending_len() + queue.collisions_len();
            queue.reset();
            discarded
        };
        self.inner.wake.notify_waiters();

        info!(
            conductor = %self.inner.identifier,
            discarded,
            "🏁 CONDUCTOR: Shut down"
        );
    }

    fn clear_state(&self) {
        self.inner.queue.lock().clear();
        self.inner.failures.clear();
        info!(conductor = %self.inner.identifier, "🧹 CONDUCTOR: State cleared");
    }

    fn flush_pending(&self) -> usize {
        let flushed = self.inner.queue.lock().flush_pending();
        info!(
            conductor = %self.inner.identifier,
            flushed,
            "🧹 CONDUCTOR: Pending queue flushed"
        );
        flushed
    }

    fn state(&self) -> ConductorState {
        self.inner.state()
    }

    fn failures(&self) -> &FailedObjectRegistry {
        &self.inner.failures
    }

    fn queue_size(&self) -> usize {
        self.inner.queue.lock().pending_len()
    }

    fn locked_count(&self) -> usize {
        self.inner.queue.lock().locked_len()
    }

    fn collision_count(&self) -> usize {
        self.inner.queue.lock().collisions_len()
    }

    fn status(&self) -> ConductorStatus {
        let (queue_size, locked_count, collision_count) = {
            let queue = self.inner.queue.lock();
            (queue.pending_len(), queue.locked_len(), queue.collisions_len())
        };

        ConductorStatus {
            identifier: self.inner.identifier.clone(),
            state: self.state(),
            max_workers: self.inner.config.max_workers,
            queue_size,
            locked_count,
            collision_count,
            failure_count: self.inner.failures.size(),
            idle: queue_size == 0 && locked_count == 0 && collision_count == 0,
            metrics: self.inner.metrics.snapshot(),
        }
    }
}

impl std::fmt::Debug for ServicesConductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesConductor")
            .field("identifier", &self.inner.identifier)
            .field("state", &self.state())
            .field("max_workers", &self.inner.config.max_workers)
            .finish()
    }
}

impl Drop for ServicesConductor {
    fn drop(&mut self) {
        if let Some(generation) = self.workers.get_mut().take() {
            generation.cancel.cancel();
            for handle in generation.handles {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{EnhancementResult, ObjectEnhancementService, ServiceRef};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingService {
        calls: AtomicUsize,
        applicable: bool,
    }

    #[async_trait]
    impl ObjectEnhancementService for CountingService {
        fn name(&self) -> &str {
            "counting"
        }

        fn prefilter_message(&self, _descriptor: &TaskDescriptor) -> bool {
            true
        }

        async fn is_applicable(&self, _descriptor: &TaskDescriptor) -> EnhancementResult<bool> {
            Ok(self.applicable)
        }

        async fn execute(
            &self,
            _descriptor: &TaskDescriptor,
            _cancel: CancellationToken,
        ) -> EnhancementResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingService;

    #[async_trait]
    impl ObjectEnhancementService for PanickingService {
        fn name(&self) -> &str {
            "panicking"
        }

        fn prefilter_message(&self, _descriptor: &TaskDescriptor) -> bool {
            true
        }

        async fn is_applicable(&self, _descriptor: &TaskDescriptor) -> EnhancementResult<bool> {
            Ok(true)
        }

        async fn execute(
            &self,
            _descriptor: &TaskDescriptor,
            _cancel: CancellationToken,
        ) -> EnhancementResult<()> {
            panic!("boom");
        }
    }

    fn conductor(workers: usize) -> ServicesConductor {
        let config = ConductorConfig {
            max_workers: workers,
            recoverable_retry_delay_ms: 10,
            start_paused: false,
        };
        ServicesConductor::new("test", config, &FailureRegistryConfig::default())
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inapplicable_service_is_skipped_but_descriptor_completes() {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            applicable: false,
        });
        let conductor = conductor(1);
        conductor.start().unwrap();

        let services: Vec<ServiceRef> = vec![service.clone()];
        conductor
            .add(TaskDescriptor::new("obj-1", "services", "APPLY_SERVICE_STACK", services))
            .unwrap();

        wait_for(|| conductor.metrics().descriptors_completed == 1).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(conductor.metrics().services_completed, 0);
        assert!(conductor.is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_service_is_recorded_as_unclassified() {
        let conductor = conductor(1);
        conductor.start().unwrap();

        let services: Vec<ServiceRef> = vec![Arc::new(PanickingService)];
        conductor
            .add(TaskDescriptor::new("obj-1", "services", "APPLY_SERVICE_STACK", services))
            .unwrap();

        wait_for(|| conductor.failure_count() == 1).await;
        let record = conductor.failures().get("obj-1").unwrap();
        assert_eq!(record.severity, Severity::Unclassified);
        assert_eq!(record.service_name.as_deref(), Some("panicking"));
        assert!(record.message.contains("boom"));
        assert!(conductor.is_ready());
        wait_for(|| conductor.is_idle()).await;
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_rejected() {
        let conductor = conductor(2);
        conductor.start().unwrap();
        conductor.shutdown_now().await;

        let result = conductor.add(TaskDescriptor::new(
            "obj-1",
            "services",
            "APPLY_SERVICE_STACK",
            Vec::new(),
        ));
        assert!(matches!(result, Err(ConductorError::ShuttingDown { .. })));
        assert_eq!(conductor.state(), ConductorState::ShuttingDown);
        assert!(!conductor.is_started());
        assert!(matches!(conductor.start(), Err(ConductorError::InvalidState(_))));
        assert!(!conductor.is_started());
    }

    #[tokio::test]
    async fn test_pause_and_resume_transitions() {
        let conductor = conductor(1);
        assert!(conductor.is_ready());
        conductor.pause();
        assert!(conductor.is_paused());
        conductor.resume();
        assert!(conductor.is_ready());

        conductor.shutdown_now().await;
        conductor.resume();
        assert_eq!(conductor.state(), ConductorState::ShuttingDown);
    }

    #[tokio::test]
    async fn test_start_paused_config() {
        let config = ConductorConfig {
            start_paused: true,
            ..ConductorConfig::default()
        };
        let conductor = ServicesConductor::new("paused", config, &FailureRegistryConfig::default());
        assert!(conductor.is_paused());
    }
}
