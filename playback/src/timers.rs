//! Session timers: one pending slot per kind, generation-checked tokens.
//!
//! Scheduling a kind replaces whatever was pending for it. Every schedule
//! draws a fresh generation from a counter that never resets, so a token
//! handed out before a cancel or reset can never match a later timer.

use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Stage delay (Parsing and Analyzing).
    Stage,
    /// Tree reveal tick.
    Reveal,
    /// Simulated vote tick.
    Vote,
    /// Next poll of the evaluation service.
    Poll,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [Self::Stage, Self::Reveal, Self::Vote, Self::Poll];

    fn index(self) -> usize {
        match self {
            Self::Stage => 0,
            Self::Reveal => 1,
            Self::Vote => 2,
            Self::Poll => 3,
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage => write!(f, "stage"),
            Self::Reveal => write!(f, "reveal"),
            Self::Vote => write!(f, "vote"),
            Self::Poll => write!(f, "poll"),
        }
    }
}

/// Handle for one scheduled firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    generation: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    generation: u64,
    deadline: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct TimerSet {
    slots: [Slot; 4],
    generation: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `deadline`, replacing any pending timer of that kind.
    pub fn schedule(&mut self, kind: TimerKind, deadline: Instant) -> TimerToken {
        self.generation += 1;
        let slot = &mut self.slots[kind.index()];
        if slot.deadline.is_some() {
            tracing::debug!(timer = %kind, "Replacing pending timer");
        }
        *slot = Slot {
            generation: self.generation,
            deadline: Some(deadline),
        };
        TimerToken {
            kind,
            generation: self.generation,
        }
    }

    /// Disarm `kind`. Returns whether a timer was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slots[kind.index()].deadline.take().is_some()
    }

    /// Disarm everything. Returns how many timers were pending.
    pub fn cancel_all(&mut self) -> usize {
        TimerKind::ALL
            .into_iter()
            .filter(|kind| self.cancel(*kind))
            .count()
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].deadline.is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots[kind.index()].deadline
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.deadline.is_some()).count()
    }

    /// Whether `token` still refers to the pending timer of its kind.
    pub fn is_current(&self, token: TimerToken) -> bool {
        let slot = &self.slots[token.kind.index()];
        slot.deadline.is_some() && slot.generation == token.generation
    }

    /// Earliest pending deadline, ties broken by kind order.
    pub fn next_deadline(&self) -> Option<(Instant, TimerKind)> {
        TimerKind::ALL
            .into_iter()
            .filter_map(|kind| self.deadline(kind).map(|d| (d, kind)))
            .min_by_key(|(deadline, kind)| (*deadline, kind.index()))
    }

    /// Consume the timer `token` refers to. Stale tokens return `false`.
    pub fn take(&mut self, token: TimerToken) -> bool {
        if !self.is_current(token) {
            tracing::debug!(timer = %token.kind, "Dropping stale timer token");
            return false;
        }
        self.slots[token.kind.index()].deadline = None;
        true
    }

    /// Remove and return the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerToken> {
        let (deadline, kind) = self.next_deadline()?;
        if deadline > now {
            return None;
        }
        let slot = &mut self.slots[kind.index()];
        slot.deadline = None;
        Some(TimerToken {
            kind,
            generation: slot.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_schedule_replaces_same_kind() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        let first = timers.schedule(TimerKind::Reveal, now + Duration::from_millis(500));
        let second = timers.schedule(TimerKind::Reveal, now + Duration::from_millis(150));

        assert_eq!(timers.pending_count(), 1);
        assert!(!timers.is_current(first));
        assert!(timers.is_current(second));
        assert!(!timers.take(first));
        assert!(timers.take(second));
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_kinds_are_independent() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule(TimerKind::Poll, now + Duration::from_secs(3));
        timers.schedule(TimerKind::Stage, now + Duration::from_secs(2));
        timers.schedule(TimerKind::Vote, now + Duration::from_secs(2));

        assert_eq!(timers.pending_count(), 3);
        assert_eq!(
            timers.next_deadline(),
            Some((now + Duration::from_secs(2), TimerKind::Stage))
        );
        assert!(timers.cancel(TimerKind::Stage));
        assert!(!timers.cancel(TimerKind::Stage));
        assert_eq!(timers.next_deadline().map(|(_, k)| k), Some(TimerKind::Vote));
    }

    #[test]
    fn test_pop_due_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.schedule(TimerKind::Poll, now + Duration::from_secs(3));
        timers.schedule(TimerKind::Reveal, now + Duration::from_secs(1));

        assert!(timers.pop_due(now).is_none());
        let later = now + Duration::from_secs(5);
        assert_eq!(timers.pop_due(later).map(|t| t.kind), Some(TimerKind::Reveal));
        assert_eq!(timers.pop_due(later).map(|t| t.kind), Some(TimerKind::Poll));
        assert!(timers.pop_due(later).is_none());
    }

    #[test]
    fn test_tokens_stale_after_cancel_all() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        let stage = timers.schedule(TimerKind::Stage, now);
        let poll = timers.schedule(TimerKind::Poll, now);

        assert_eq!(timers.cancel_all(), 2);
        assert_eq!(timers.pending_count(), 0);

        // Re-arming the same kind must not revive the old token.
        timers.schedule(TimerKind::Stage, now);
        assert!(!timers.take(stage));
        assert!(!timers.take(poll));
        assert!(timers.next_deadline().is_some());
    }
}
