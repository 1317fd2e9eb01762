//! Catch-up reconciliation: candidate paging, backpressure, mutual
//! exclusion, deactivation and cutoff handling.

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use conductor_core::config::CatchUpConfig;
use conductor_core::messaging::{MessageDirector, ServicesQueueMessageFilter};
use conductor_core::orchestration::{
    parse_prior_to, CatchUpService, CatchUpStopReason, MessageConductor, ServicesConductor,
};
use conductor_core::services::{ServiceRef, ServiceStack};
use conductor_core::ConductorError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn catch_up_config(page_size: usize) -> CatchUpConfig {
    CatchUpConfig {
        enabled: true,
        page_size,
        interval_seconds: 1,
    }
}

/// Catch-up service feeding `conductor` through a services filter.
/// With `throttled`, the conductor's backlog stops a pass.
fn catch_up_for(
    conductor: &Arc<ServicesConductor>,
    services: Vec<ServiceRef>,
    page_size: usize,
    throttled: bool,
) -> Arc<CatchUpService> {
    let handle: Arc<dyn MessageConductor> = conductor.clone();
    let stack = ServiceStack::new(services);
    let director = Arc::new(
        MessageDirector::new().with_filter(Box::new(ServicesQueueMessageFilter::new(
            Arc::clone(&handle),
            stack.clone(),
        ))),
    );
    let watched = if throttled { vec![handle] } else { Vec::new() };
    Arc::new(CatchUpService::new(
        catch_up_config(page_size),
        director,
        stack,
        watched,
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pass_submits_every_candidate_until_exhausted() {
    let candidates = CandidateService::new("techmd", ["a", "b", "c"]).shared();
    let conductor = started_conductor("services", 2);
    conductor.pause();
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 10, false);

    let report = catch_up.run_pass(None).await.unwrap();
    assert_eq!(report.candidates_submitted, 3);
    assert_eq!(report.pages, 1);
    assert_eq!(report.stop_reason, CatchUpStopReason::Exhausted);
    assert_eq!(conductor.queue_size(), 3);
    assert!(!catch_up.is_active());

    conductor.resume();
    assert!(wait_until(|| candidates.missing_count() == 0 && conductor.is_idle()).await);
    let mut processed = candidates.processed();
    processed.sort();
    assert_eq!(processed, vec!["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backlog_stops_pass() {
    let ids: Vec<String> = (0..25).map(|i| format!("obj-{i:02}")).collect();
    let candidates = CandidateService::new("techmd", ids.iter().map(String::as_str)).shared();
    let conductor = started_conductor("services", 2);
    conductor.pause();
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 10, true);

    let report = catch_up.run_pass(None).await.unwrap();
    assert_eq!(report.stop_reason, CatchUpStopReason::Backpressure);
    assert_eq!(report.pages, 1);
    assert_eq!(report.candidates_submitted, 10);
    assert_eq!(conductor.queue_size(), 10);

    // nothing more is added while the backlog remains
    let report = catch_up.run_pass(None).await.unwrap();
    assert_eq!(report.candidates_submitted, 0);
    assert_eq!(report.stop_reason, CatchUpStopReason::Backpressure);
    assert_eq!(conductor.queue_size(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_only_one_pass_at_a_time() {
    let candidates = CandidateService::new("techmd", ["a"])
        .with_finder_gate()
        .shared();
    let conductor = started_conductor("services", 1);
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 10, false);

    assert!(catch_up.activate());
    assert!(wait_until(|| candidates.finder_calls() == 1).await);
    assert!(catch_up.is_active());

    assert!(!catch_up.activate());
    assert!(!catch_up.activate_prior_to("2024-01-01T00:00:00Z").unwrap());
    assert!(matches!(
        catch_up.run_pass(None).await,
        Err(ConductorError::CatchUpAlreadyActive)
    ));

    candidates.release_finder();
    assert!(wait_until(|| !catch_up.is_active()).await);
    assert!(wait_until(|| candidates.processed() == vec!["a".to_string()]).await);

    // a finished pass frees the slot
    assert!(catch_up.activate());
    assert!(wait_until(|| !catch_up.is_active()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deactivate_stops_after_current_page() {
    let candidates = CandidateService::new("techmd", ["a", "b", "c", "d"])
        .with_finder_gate()
        .shared();
    let conductor = started_conductor("services", 1);
    conductor.pause();
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 2, false);

    let running = Arc::clone(&catch_up);
    let pass = tokio::spawn(async move { running.run_pass(None).await });

    assert!(wait_until(|| candidates.finder_calls() == 1).await);
    assert!(catch_up.deactivate());
    candidates.release_finder();

    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.stop_reason, CatchUpStopReason::Deactivated);
    assert_eq!(report.pages, 1);
    assert_eq!(report.candidates_submitted, 2);
    assert_eq!(candidates.finder_calls(), 1);
    assert!(!catch_up.is_active());
    assert!(!catch_up.deactivate());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_cutoff_fails_fast() {
    let candidates = CandidateService::new("techmd", ["a"]).shared();
    let conductor = started_conductor("services", 1);
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 10, false);

    for value in ["last tuesday", "2024-01-01", "2024-01-01T25:00:00Z"] {
        let err = catch_up.activate_prior_to(value).unwrap_err();
        assert!(matches!(err, ConductorError::InvalidTimestamp { .. }));
    }
    assert!(!catch_up.is_active());
    assert_eq!(candidates.finder_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cutoff_selects_stale_output() {
    let old = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
    let recent = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let candidates = CandidateService::new("techmd", std::iter::empty())
        .with_output(&[("old", old), ("recent", recent)])
        .shared();
    let conductor = started_conductor("services", 1);
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 10, false);

    let cutoff = parse_prior_to("2024-01-01T00:00:00Z").unwrap();
    let report = catch_up.run_pass(Some(cutoff)).await.unwrap();
    assert_eq!(report.prior_to, Some(cutoff));
    assert_eq!(report.candidates_submitted, 1);
    assert_eq!(candidates.stale_cutoffs()[0], cutoff);

    assert!(wait_until(|| candidates.processed() == vec!["old".to_string()]).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inactive_services_are_not_consulted() {
    let candidates = CandidateService::new("techmd", ["a"]).inactive().shared();
    let conductor = started_conductor("services", 1);
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 10, false);

    let report = catch_up.run_pass(None).await.unwrap();
    assert_eq!(report.candidates_submitted, 0);
    assert_eq!(candidates.finder_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_schedule_drains_candidates_over_several_passes() {
    let candidates = CandidateService::new("techmd", ["a", "b", "c", "d", "e"]).shared();
    let conductor = started_conductor("services", 2);
    let catch_up = catch_up_for(&conductor, vec![candidates.clone() as ServiceRef], 2, true);

    let token = CancellationToken::new();
    let schedule = catch_up.spawn_schedule(token.clone());

    assert!(wait_until(|| candidates.missing_count() == 0 && conductor.is_idle()).await);
    let mut processed = candidates.processed();
    processed.sort();
    processed.dedup();
    assert_eq!(processed.len(), 5);

    token.cancel();
    schedule.await.unwrap();
    assert!(!catch_up.is_active());
}
