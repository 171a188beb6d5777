//! End-to-end playback scenarios on a paused tokio clock.
//!
//! Sessions run against the in-memory client, so every stage delay, reveal
//! tick and poll interval is observed at its exact virtual time.

use std::sync::Arc;
use std::time::Duration;

use playback::client::{EvaluationClient, InMemoryEvaluationClient, SubmissionRequest};
use playback::config::{PlaybackConfig, PlaybackTimings, PollPolicy};
use playback::controller::{PlaybackController, PlaybackStage};
use playback::record::{Candidate, EvaluationId, EvaluationRecord, VoteTally};
use playback::sample::{sample_evaluation, staged_sample, SAMPLE_EVALUATION_ID};
use playback::session::{Session, SessionOutcome, SessionStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(budget_ms: u64) -> PlaybackConfig {
    PlaybackConfig {
        timings: PlaybackTimings {
            seed: Some(11),
            ..PlaybackTimings::default()
        },
        polling: PollPolicy {
            budget_ms,
            ..PollPolicy::default()
        },
        ..PlaybackConfig::default()
    }
}

fn frontend_partial() -> EvaluationRecord {
    EvaluationRecord::new().with_iteration(
        0,
        [
            "Candidate A has five years of React in production",
            "Candidate B shows strong TypeScript skills",
            "Candidate A demonstrates UI/UX expertise",
        ],
    )
}

fn stage_times(report: &playback::SessionReport) -> Vec<(PlaybackStage, u64)> {
    report
        .transitions
        .iter()
        .map(|t| (t.to, t.elapsed_ms))
        .collect()
}

// ── Scenario A: partial record, normal pacing ───────────────────────────────

#[tokio::test(start_paused = true)]
async fn scenario_a_partial_record_plays_at_normal_speed() {
    let client = Arc::new(InMemoryEvaluationClient::new());
    client.set_demo_script(vec![Ok(frontend_partial())]);

    let request = SubmissionRequest::from_urls(
        "Frontend Engineer",
        "https://www.linkedin.com/in/candidate-a/",
        "https://www.linkedin.com/in/candidate-b?trk=share",
    )
    .unwrap();
    let id = client.submit(&request).await.unwrap();
    assert!(!id.as_str().is_empty());
    assert_eq!(client.submissions()[0].profile_id_candidate_b, "candidate-b");

    let (session, _rx) = Session::new(client.clone(), id.clone(), config(15_000));
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::TimedOut);
    assert_eq!(report.pending_timers, 0);
    assert_eq!(report.snapshot.playback.node_count, 3 + 3 + 1);
    assert!(!report.snapshot.playback.fast_forward);

    // 7 nodes at one per 500ms: index 6 reached six ticks after the reveal.
    assert_eq!(
        stage_times(&report),
        vec![
            (PlaybackStage::Parsing, 0),
            (PlaybackStage::Analyzing, 2_000),
            (PlaybackStage::RevealingTree, 4_000),
            (PlaybackStage::Voting, 7_000),
            (PlaybackStage::Complete, 10_000),
        ]
    );
    // Simulated vote: 15 ticks of 200ms.
    assert_eq!(report.snapshot.playback.votes.total(), 15);
    assert!(report.snapshot.playback.simulated_votes);
    // Polls at 0, 3, 6, 9 and 12s; the 15s tick hits the budget.
    assert_eq!(client.fetch_count(id.as_str()), 5);
}

// ── Scenario B: decided record fast-forwards ────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scenario_b_decided_record_snaps_forward() {
    let mut controller = PlaybackController::new(config(60_000).timings);
    let record = sample_evaluation();
    controller.on_record(&record, Instant::now());

    assert_eq!(controller.stage(), PlaybackStage::RevealingTree);
    assert_eq!(controller.node_count(), 18);
    assert_eq!(controller.reveal_index(), (0.7_f64 * 18.0).floor() as usize);
    assert!(controller.is_fast_forward());
}

#[tokio::test(start_paused = true)]
async fn scenario_b_session_completes_with_real_votes() {
    let client = Arc::new(InMemoryEvaluationClient::new());
    client.insert(SAMPLE_EVALUATION_ID, sample_evaluation());

    let (session, rx) = Session::new(
        client.clone(),
        EvaluationId::from(SAMPLE_EVALUATION_ID),
        config(60_000),
    );
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.snapshot.status, SessionStatus::Completed);
    assert_eq!(report.snapshot.playback.votes, VoteTally::new(3, 5));
    assert_eq!(report.snapshot.playback.winner, Some(Candidate::B));
    assert_eq!(report.snapshot.playback.reveal_index, 17);
    assert!(!report.snapshot.playback.simulated_votes);
    assert_eq!(report.pending_timers, 0);

    // 12 → 14 → 16 → 17 at 150ms per tick, then straight through Voting.
    assert_eq!(
        stage_times(&report),
        vec![
            (PlaybackStage::Parsing, 0),
            (PlaybackStage::Analyzing, 0),
            (PlaybackStage::RevealingTree, 0),
            (PlaybackStage::Voting, 450),
            (PlaybackStage::Complete, 450),
        ]
    );
    // Terminal on the first fetch: no further polling.
    assert_eq!(client.fetch_count(SAMPLE_EVALUATION_ID), 1);
    assert_eq!(rx.borrow().playback.stage, PlaybackStage::Complete);
}

// ── Scenario C: unknown id ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scenario_c_unknown_id_stops_everything() {
    let client = Arc::new(InMemoryEvaluationClient::with_sample());
    let (session, rx) = Session::new(client, EvaluationId::from("does-not-exist"), config(60_000));
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::NotFound);
    assert_eq!(report.pending_timers, 0);
    assert_eq!(report.snapshot.playback.stage, PlaybackStage::Idle);
    assert!(report.transitions.is_empty());
    assert!(matches!(rx.borrow().status, SessionStatus::NotFound { .. }));
}

// ── Growing record ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn staged_sample_grows_then_settles() {
    let client = Arc::new(InMemoryEvaluationClient::with_sample());
    let (session, _rx) = Session::new(
        client.clone(),
        EvaluationId::from("eval-demo"),
        config(120_000),
    );
    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.snapshot.playback.node_count, 18);
    assert_eq!(report.snapshot.playback.reveal_index, 17);
    assert_eq!(report.snapshot.playback.winner, Some(Candidate::B));
    assert_eq!(report.snapshot.playback.votes, VoteTally::new(3, 5));
    assert_eq!(client.fetch_count("eval-demo"), staged_sample().len());

    // The decided version arrives at 9s, mid-reveal, and speeds up the rest.
    let times = stage_times(&report);
    assert_eq!(times[2], (PlaybackStage::RevealingTree, 4_000));
    assert_eq!(times[3].0, PlaybackStage::Voting);
    assert!(times[3].1 > 9_000 && times[3].1 <= 9_450, "{times:?}");
}

// ── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancellation_tears_down_timers() {
    let client = Arc::new(InMemoryEvaluationClient::new());
    client.insert("slow", frontend_partial());

    let cancel = CancellationToken::new();
    let (session, _rx) = Session::new(client, EvaluationId::from("slow"), config(600_000));
    let handle = tokio::spawn(session.with_cancellation(cancel.clone()).run());

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    cancel.cancel();
    let report = handle.await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.snapshot.status, SessionStatus::Cancelled);
    assert_eq!(report.snapshot.playback.stage, PlaybackStage::RevealingTree);
    assert_eq!(report.pending_timers, 0);
}
