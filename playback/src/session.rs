//! One polling and playback session for a single evaluation id.
//!
//! The session is the only async piece. It runs a single-task event loop that
//! multiplexes cancellation, fetch completions and the earliest timer deadline
//! with `tokio::select!`, and publishes a [`SessionSnapshot`] on a
//! `tokio::sync::watch` channel after every state change.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::EvaluationClient;
use crate::config::PlaybackConfig;
use crate::controller::{PlaybackController, PlaybackSnapshot, TransitionRecord};
use crate::error::{PlaybackError, PlaybackResult};
use crate::polling::{FetchTicket, PollOutcome, PollVerdict, PollingScheduler};
use crate::record::{EvaluationId, EvaluationRecord};

type FetchFuture = BoxFuture<'static, (FetchTicket, PlaybackResult<EvaluationRecord>)>;

/// Connection status shown next to the playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// First fetch outstanding.
    Connecting,
    Polling,
    /// Last fetch failed with a transient error.
    Retrying { code: String, message: String, attempts: u32 },
    /// Record is decided; playback may still be animating.
    Settled,
    Completed,
    NotFound { message: String },
    Failed { message: String },
    TimedOut,
    Cancelled,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// A decided record was played back to `Complete`.
    Completed,
    NotFound,
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub evaluation_id: EvaluationId,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub fetches: u32,
    pub playback: PlaybackSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub snapshot: SessionSnapshot,
    pub transitions: Vec<TransitionRecord>,
    /// Timers still armed after teardown; always zero.
    pub pending_timers: usize,
}

pub struct Session<C: ?Sized> {
    client: Arc<C>,
    id: EvaluationId,
    config: PlaybackConfig,
    controller: PlaybackController,
    scheduler: PollingScheduler,
    cancel: CancellationToken,
    status: SessionStatus,
    last_fetch_at: Option<DateTime<Utc>>,
    fetches: u32,
    tx: watch::Sender<SessionSnapshot>,
}

impl<C> Session<C>
where
    C: EvaluationClient + ?Sized + 'static,
{
    /// Create a session and the receiver its snapshots are published on.
    pub fn new(
        client: Arc<C>,
        id: EvaluationId,
        config: PlaybackConfig,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let controller = PlaybackController::new(config.timings.clone());
        let scheduler = PollingScheduler::new(config.polling.clone());
        let initial = SessionSnapshot {
            evaluation_id: id.clone(),
            status: SessionStatus::Connecting,
            last_fetch_at: None,
            fetches: 0,
            playback: controller.snapshot(),
        };
        let (tx, rx) = watch::channel(initial);
        let session = Self {
            client,
            id,
            config,
            controller,
            scheduler,
            cancel: CancellationToken::new(),
            status: SessionStatus::Connecting,
            last_fetch_at: None,
            fetches: 0,
            tx,
        };
        (session, rx)
    }

    /// Stop the session when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until playback completes, polling fails terminally, the budget runs
    /// out or the session is cancelled. All timers are cancelled on return.
    pub async fn run(mut self) -> SessionReport {
        info!(evaluation_id = %self.id, "Session started");
        let mut in_flight: FuturesUnordered<FetchFuture> = FuturesUnordered::new();
        let ticket = self.scheduler.start(Instant::now());
        in_flight.push(self.fetch(ticket));

        let outcome = loop {
            if let Some(outcome) = self.settled_outcome() {
                break outcome;
            }

            let deadline = earliest(self.controller.next_deadline(), self.scheduler.next_deadline());

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.scheduler.finish(PollOutcome::Cancelled, Instant::now());
                    break SessionOutcome::Cancelled;
                }

                Some((ticket, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.on_fetch(ticket, result);
                }

                _ = sleep_until(deadline) => {
                    let now = Instant::now();
                    self.controller.fire_due(now);
                    if let Some(ticket) = self.scheduler.fire_due(now) {
                        in_flight.push(self.fetch(ticket));
                    }
                }
            }

            self.publish();
        };

        // Outstanding fetches are dropped with the stream.
        drop(in_flight);
        self.teardown(outcome)
    }

    fn fetch(&self, ticket: FetchTicket) -> FetchFuture {
        let client = Arc::clone(&self.client);
        let id = self.id.clone();
        let timeout = self.config.api.request_timeout();
        Box::pin(async move {
            let result = match tokio::time::timeout(timeout, client.fetch(&id)).await {
                Ok(result) => result,
                Err(_) => Err(PlaybackError::network(format!(
                    "fetch timed out after {}ms",
                    timeout.as_millis()
                ))),
            };
            (ticket, result)
        })
    }

    fn on_fetch(&mut self, ticket: FetchTicket, result: PlaybackResult<EvaluationRecord>) {
        let now = Instant::now();
        self.fetches += 1;
        self.last_fetch_at = Some(Utc::now());
        debug!(
            evaluation_id = %self.id,
            seq = ticket.seq,
            latency_ms = now.saturating_duration_since(ticket.issued_at).as_millis() as u64,
            "Fetch completed"
        );

        match self.scheduler.on_response(ticket, result, now) {
            PollVerdict::Apply(record) => {
                self.status = if record.is_terminal() {
                    SessionStatus::Settled
                } else {
                    SessionStatus::Polling
                };
                self.controller.on_record(&record, now);
            }
            PollVerdict::Stale => {}
            PollVerdict::Retry(err) => {
                self.status = SessionStatus::Retrying {
                    code: err.code().to_string(),
                    message: err.to_string(),
                    attempts: self.scheduler.consecutive_failures(),
                };
            }
            PollVerdict::Stop(err) => {
                warn!(evaluation_id = %self.id, error = %err, "Session stopping");
                self.status = match err {
                    PlaybackError::NotFound { .. } => SessionStatus::NotFound {
                        message: err.to_string(),
                    },
                    _ => SessionStatus::Failed {
                        message: err.to_string(),
                    },
                };
            }
        }
    }

    /// Outcome once nothing is left to do.
    fn settled_outcome(&self) -> Option<SessionOutcome> {
        match self.scheduler.outcome()? {
            PollOutcome::Terminal => {
                (self.controller.stage().is_terminal() && self.controller.pending_timers() == 0)
                    .then_some(SessionOutcome::Completed)
            }
            PollOutcome::NotFound => Some(SessionOutcome::NotFound),
            PollOutcome::Failed => Some(SessionOutcome::Failed),
            PollOutcome::BudgetExhausted => Some(SessionOutcome::TimedOut),
            PollOutcome::Cancelled => Some(SessionOutcome::Cancelled),
        }
    }

    fn teardown(mut self, outcome: SessionOutcome) -> SessionReport {
        let cancelled = self.controller.teardown();
        self.scheduler.finish(PollOutcome::Cancelled, Instant::now());
        match outcome {
            SessionOutcome::Completed => self.status = SessionStatus::Completed,
            SessionOutcome::TimedOut => self.status = SessionStatus::TimedOut,
            SessionOutcome::Cancelled => self.status = SessionStatus::Cancelled,
            SessionOutcome::NotFound | SessionOutcome::Failed => {}
        }
        self.publish();

        let pending_timers = self.controller.pending_timers() + self.scheduler.pending_timers();
        info!(
            evaluation_id = %self.id,
            outcome = ?outcome,
            cancelled_timers = cancelled,
            fetches = self.fetches,
            summary = %self.controller.summary(),
            "Session finished"
        );
        SessionReport {
            outcome,
            snapshot: self.snapshot(),
            transitions: self.controller.transitions().to_vec(),
            pending_timers,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            evaluation_id: self.id.clone(),
            status: self.status.clone(),
            last_fetch_at: self.last_fetch_at,
            fetches: self.fetches,
            playback: self.controller.snapshot(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn sleep_until(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

/// Submit a comparison, then run a session on the created evaluation.
pub async fn submit_and_watch<C>(
    client: Arc<C>,
    request: &crate::client::SubmissionRequest,
    config: PlaybackConfig,
    cancel: CancellationToken,
) -> PlaybackResult<(EvaluationId, SessionReport)>
where
    C: EvaluationClient + ?Sized + 'static,
{
    let id = client.submit(request).await?;
    info!(evaluation_id = %id, "Evaluation submitted");
    let (session, _rx) = Session::new(client, id.clone(), config);
    let report = session.with_cancellation(cancel).run().await;
    Ok((id, report))
}
