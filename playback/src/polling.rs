//! Polling scheduler: when to fetch, and what to do with each response.
//!
//! Like the controller, the scheduler is synchronous. It hands out
//! [`FetchTicket`]s; the session performs the fetch and reports back through
//! [`PollingScheduler::on_response`], which decides whether the result is
//! applied, dropped as stale, retried or ends polling.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PollPolicy;
use crate::error::{PlaybackError, PlaybackResult};
use crate::record::EvaluationRecord;
use crate::timers::{TimerKind, TimerSet, TimerToken};

/// One issued fetch, numbered in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub issued_at: Instant,
}

/// Why polling ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// A record with a declared winner was applied.
    Terminal,
    /// The service does not know the id.
    NotFound,
    /// The wall-clock budget ran out before a terminal record.
    BudgetExhausted,
    /// Any other non-retryable fetch error.
    Failed,
    Cancelled,
}

/// What to do with a fetch result.
#[derive(Debug, Clone, PartialEq)]
pub enum PollVerdict {
    /// Newest record so far; feed it to the controller.
    Apply(EvaluationRecord),
    /// Older than what was already applied, or a regression from a terminal
    /// record. Dropped.
    Stale,
    /// Transient failure; polling continues.
    Retry(PlaybackError),
    /// Terminal failure; polling has stopped.
    Stop(PlaybackError),
}

#[derive(Debug)]
pub struct PollingScheduler {
    policy: PollPolicy,
    timers: TimerSet,
    started_at: Option<Instant>,
    next_seq: u64,
    newest_applied: Option<u64>,
    in_flight: usize,
    terminal_applied: bool,
    consecutive_failures: u32,
    outcome: Option<PollOutcome>,
}

impl PollingScheduler {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            timers: TimerSet::new(),
            started_at: None,
            next_seq: 0,
            newest_applied: None,
            in_flight: 0,
            terminal_applied: false,
            consecutive_failures: 0,
            outcome: None,
        }
    }

    /// Begin polling: the first fetch goes out immediately.
    pub fn start(&mut self, now: Instant) -> FetchTicket {
        self.started_at = Some(now);
        info!(budget_ms = self.policy.budget_ms, "Polling started");
        self.issue(now)
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<PollOutcome> {
        self.outcome
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending_count()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline().map(|(deadline, _)| deadline)
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Handle a poll timer token. Returns a ticket when a fetch should go out.
    pub fn on_timer(&mut self, token: TimerToken, now: Instant) -> Option<FetchTicket> {
        if !self.timers.take(token) {
            return None;
        }
        self.on_tick(now)
    }

    /// Fire the poll timer if due.
    pub fn fire_due(&mut self, now: Instant) -> Option<FetchTicket> {
        let token = self.timers.pop_due(now)?;
        if token.kind != TimerKind::Poll {
            return None;
        }
        self.on_tick(now)
    }

    /// Classify a fetch result.
    pub fn on_response(
        &mut self,
        ticket: FetchTicket,
        result: PlaybackResult<EvaluationRecord>,
        now: Instant,
    ) -> PollVerdict {
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.is_finished() {
            debug!(seq = ticket.seq, "Dropping response after polling ended");
            return PollVerdict::Stale;
        }
        if self.newest_applied.is_some_and(|newest| ticket.seq < newest) {
            debug!(seq = ticket.seq, newest = ?self.newest_applied, "Dropping stale response");
            return PollVerdict::Stale;
        }

        match result {
            Ok(record) => {
                if self.terminal_applied && !record.is_terminal() {
                    debug!(seq = ticket.seq, "Ignoring non-terminal record after terminal one");
                    return PollVerdict::Stale;
                }
                self.newest_applied = Some(ticket.seq);
                self.consecutive_failures = 0;
                if record.is_terminal() {
                    self.terminal_applied = true;
                    self.finish(PollOutcome::Terminal, now);
                }
                PollVerdict::Apply(record)
            }
            Err(err) if err.is_retryable() => {
                self.consecutive_failures += 1;
                warn!(
                    seq = ticket.seq,
                    attempts = self.consecutive_failures,
                    error = %err,
                    "Fetch failed, will retry"
                );
                PollVerdict::Retry(err)
            }
            Err(err) => {
                error!(seq = ticket.seq, error = %err, "Fetch failed, polling stopped");
                let outcome = match err {
                    PlaybackError::NotFound { .. } => PollOutcome::NotFound,
                    _ => PollOutcome::Failed,
                };
                self.finish(outcome, now);
                PollVerdict::Stop(err)
            }
        }
    }

    /// Stop polling for `outcome`, cancelling the pending poll.
    pub fn finish(&mut self, outcome: PollOutcome, now: Instant) {
        if self.outcome.is_some() {
            return;
        }
        self.timers.cancel_all();
        self.outcome = Some(outcome);
        info!(
            outcome = ?outcome,
            elapsed_ms = self.elapsed(now).as_millis() as u64,
            "Polling finished"
        );
    }

    fn on_tick(&mut self, now: Instant) -> Option<FetchTicket> {
        if self.is_finished() {
            return None;
        }
        if self.elapsed(now) >= self.policy.budget() {
            warn!(budget_ms = self.policy.budget_ms, "Polling budget exhausted");
            self.finish(PollOutcome::BudgetExhausted, now);
            return None;
        }
        if self.in_flight >= self.policy.max_in_flight {
            debug!(in_flight = self.in_flight, "Skipping poll, too many fetches outstanding");
            self.schedule_next(now);
            return None;
        }
        Some(self.issue(now))
    }

    fn issue(&mut self, now: Instant) -> FetchTicket {
        self.next_seq += 1;
        self.in_flight += 1;
        self.schedule_next(now);
        debug!(seq = self.next_seq, in_flight = self.in_flight, "Issuing fetch");
        FetchTicket {
            seq: self.next_seq,
            issued_at: now,
        }
    }

    fn schedule_next(&mut self, now: Instant) {
        let interval = self.policy.interval_after(self.elapsed(now));
        self.timers.schedule(TimerKind::Poll, now + interval);
    }
}
