//! Session behaviour when the evaluation service misbehaves.
//!
//! Tests verify:
//! - Transient network errors surface as `Retrying` and polling recovers
//! - An unknown id is fetched exactly once
//! - Slow responses are bounded by the request timeout and the poll budget
//! - Non-retryable errors other than not-found fail the session
//! - Responses overtaken by a newer fetch are never applied

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use playback::client::{EvaluationClient, SubmissionRequest};
use playback::config::{PlaybackConfig, PollPolicy};
use playback::controller::PlaybackStage;
use playback::error::{PlaybackError, PlaybackResult};
use playback::record::{Candidate, EvaluationId, EvaluationRecord};
use playback::sample::{sample_evaluation, SAMPLE_JOB_DESCRIPTION};
use playback::session::{submit_and_watch, Session, SessionOutcome, SessionStatus};
use tokio_util::sync::CancellationToken;

mock! {
    pub Service {}

    #[async_trait]
    impl EvaluationClient for Service {
        async fn submit(&self, request: &SubmissionRequest) -> PlaybackResult<EvaluationId>;
        async fn fetch(&self, id: &EvaluationId) -> PlaybackResult<EvaluationRecord>;
    }
}

/// Log output for failing runs; `RUST_LOG=playback=debug` shows every tick.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(budget_ms: u64) -> PlaybackConfig {
    let mut config = PlaybackConfig::default();
    config.timings.seed = Some(3);
    config.polling = PollPolicy {
        budget_ms,
        ..PollPolicy::default()
    };
    config
}

// ── Transient failures ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn network_errors_retry_then_complete() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = MockService::new();
    let counter = Arc::clone(&calls);
    service.expect_fetch().times(3).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Err(PlaybackError::network("connection reset by peer")),
            _ => Ok(sample_evaluation()),
        }
    });

    let (session, rx) = Session::new(Arc::new(service), EvaluationId::from("abc"), config(60_000));
    let handle = tokio::spawn(session.run());

    // Second failure lands at 3s.
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    match &rx.borrow().status {
        SessionStatus::Retrying { code, attempts, .. } => {
            assert_eq!(code, "NETWORK_FAILURE");
            assert_eq!(*attempts, 2);
        }
        other => panic!("expected retrying, got {other:?}"),
    }
    assert_eq!(rx.borrow().playback.stage, PlaybackStage::Idle);

    let report = handle.await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.snapshot.playback.winner, Some(Candidate::B));

    // Playback only starts with the first good record at 6s.
    let parsing = &report.transitions[0];
    assert_eq!(parsing.to, PlaybackStage::Parsing);
    assert_eq!(parsing.elapsed_ms, 6_000);
}

#[tokio::test(start_paused = true)]
async fn malformed_records_are_retried() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = MockService::new();
    let counter = Arc::clone(&calls);
    service.expect_fetch().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(PlaybackError::malformed("expected an object"))
        } else {
            Ok(sample_evaluation())
        }
    });

    let (session, _rx) = Session::new(Arc::new(service), EvaluationId::from("abc"), config(60_000));
    let report = session.run().await;
    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ── Terminal failures ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn not_found_fetches_once() {
    init_tracing();
    let mut service = MockService::new();
    service
        .expect_fetch()
        .withf(|id| id.as_str() == "ghost")
        .times(1)
        .returning(|id| Err(PlaybackError::not_found(id.as_str())));

    let (session, _rx) = Session::new(Arc::new(service), EvaluationId::from("ghost"), config(60_000));
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::NotFound);
    assert_eq!(
        report.snapshot.status,
        SessionStatus::NotFound {
            message: "Evaluation not found: ghost".to_string()
        }
    );
    assert_eq!(report.snapshot.fetches, 1);
    assert_eq!(report.pending_timers, 0);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_fails_session() {
    init_tracing();
    let mut service = MockService::new();
    service
        .expect_fetch()
        .times(1)
        .returning(|_| Err(PlaybackError::config("base_url cannot carry a path")));

    let (session, _rx) = Session::new(Arc::new(service), EvaluationId::from("abc"), config(60_000));
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::Failed);
    assert!(matches!(report.snapshot.status, SessionStatus::Failed { .. }));
    assert_eq!(report.pending_timers, 0);
}

// ── Slow service ────────────────────────────────────────────────────────────

/// Answers every fetch after `delay`.
struct SlowService {
    delay: Duration,
    started: AtomicUsize,
}

#[async_trait]
impl EvaluationClient for SlowService {
    async fn submit(&self, _request: &SubmissionRequest) -> PlaybackResult<EvaluationId> {
        Err(PlaybackError::invalid_submission("read-only"))
    }

    async fn fetch(&self, _id: &EvaluationId) -> PlaybackResult<EvaluationRecord> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(sample_evaluation())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_fetches_time_out_until_budget() {
    init_tracing();
    let service = Arc::new(SlowService {
        delay: Duration::from_secs(60),
        started: AtomicUsize::new(0),
    });
    let (session, _rx) = Session::new(service.clone(), EvaluationId::from("abc"), config(20_000));
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::TimedOut);
    assert_eq!(report.snapshot.status, SessionStatus::TimedOut);
    assert_eq!(report.snapshot.playback.stage, PlaybackStage::Idle);
    assert_eq!(report.pending_timers, 0);
    // 10s request timeout: the fetches issued at 0s and 3s both expired.
    assert!(report.snapshot.fetches >= 2, "{}", report.snapshot.fetches);
    // Never more than two fetches outstanding at once, so the 6s and 9s ticks
    // were skipped.
    assert!(service.started.load(Ordering::SeqCst) < 7);
}

// ── Submit then watch ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn submit_and_watch_follows_created_id() {
    init_tracing();
    let mut service = MockService::new();
    service
        .expect_submit()
        .withf(|request| request.profile_id_candidate_a == "jane-doe")
        .times(1)
        .returning(|_| Ok(EvaluationId::from("67c37dcde83f769118fe9276")));
    service
        .expect_fetch()
        .withf(|id| id.as_str() == "67c37dcde83f769118fe9276")
        .returning(|_| Ok(sample_evaluation()));

    let request = SubmissionRequest::from_urls(
        "Staff Engineer",
        "https://www.linkedin.com/in/jane-doe/",
        "https://www.linkedin.com/in/john-roe",
    )
    .unwrap();
    let (id, report) = submit_and_watch(
        Arc::new(service),
        &request,
        config(60_000),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(id.as_str(), "67c37dcde83f769118fe9276");
    assert_eq!(report.outcome, SessionOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn refused_submission_never_polls() {
    init_tracing();
    let mut service = MockService::new();
    service
        .expect_submit()
        .returning(|_| Err(PlaybackError::invalid_submission("profile not found")));
    service.expect_fetch().never();

    let request = SubmissionRequest::from_urls(
        "Staff Engineer",
        "https://x.io/in/a",
        "https://x.io/in/b",
    )
    .unwrap();
    let err = submit_and_watch(
        Arc::new(service),
        &request,
        config(60_000),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_SUBMISSION");
}

// ── Out-of-order responses ──────────────────────────────────────────────────

/// Serves queued `(delay, record)` pairs in call order; the last one repeats.
struct ReorderingService {
    queue: Mutex<VecDeque<(Duration, EvaluationRecord)>>,
}

impl ReorderingService {
    fn new(responses: Vec<(Duration, EvaluationRecord)>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl EvaluationClient for ReorderingService {
    async fn submit(&self, _request: &SubmissionRequest) -> PlaybackResult<EvaluationId> {
        Err(PlaybackError::invalid_submission("read-only"))
    }

    async fn fetch(&self, _id: &EvaluationId) -> PlaybackResult<EvaluationRecord> {
        let (delay, record) = {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            }
        };
        tokio::time::sleep(delay).await;
        Ok(record)
    }
}

fn partial(job: &str) -> EvaluationRecord {
    EvaluationRecord::new()
        .with_job_description(job)
        .with_iteration(0, ["Candidate A has led two platform migrations"])
}

#[tokio::test(start_paused = true)]
async fn late_partial_never_overwrites_decided_record() {
    init_tracing();
    // First fetch answers at 3.1s, after the second (issued at 3s) has
    // already delivered the decided record.
    let service = Arc::new(ReorderingService::new(vec![
        (Duration::from_millis(3_100), partial("superseded")),
        (Duration::ZERO, sample_evaluation()),
    ]));
    let (session, _rx) = Session::new(service, EvaluationId::from("abc"), config(60_000));
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.snapshot.fetches, 2);
    assert_eq!(report.snapshot.playback.node_count, 18);
    assert_eq!(report.snapshot.playback.winner, Some(Candidate::B));
    assert_eq!(
        report.snapshot.playback.job_description.as_deref(),
        Some(SAMPLE_JOB_DESCRIPTION)
    );
}

#[tokio::test(start_paused = true)]
async fn late_response_older_than_applied_one_is_dropped() {
    init_tracing();
    let service = Arc::new(ReorderingService::new(vec![
        (Duration::from_millis(5_000), partial("older")),
        (Duration::ZERO, partial("newer")),
    ]));
    let cancel = CancellationToken::new();
    let (session, rx) = Session::new(service, EvaluationId::from("abc"), config(60_000));
    let handle = tokio::spawn(session.with_cancellation(cancel.clone()).run());

    // The fetch issued at 3s answers at once; the one issued at 0s lands at 5s.
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(rx.borrow().playback.job_description.as_deref(), Some("newer"));
    assert_eq!(rx.borrow().fetches, 1);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(rx.borrow().fetches, 2);
    assert_eq!(rx.borrow().playback.job_description.as_deref(), Some("newer"));

    cancel.cancel();
    let report = handle.await.unwrap();
    assert_eq!(report.outcome, SessionOutcome::Cancelled);
}
