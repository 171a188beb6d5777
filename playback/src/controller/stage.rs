//! Playback stages and their legal transition table.
//!
//! Every stage change goes through `StageMachine::advance`, which validates
//! the edge and appends it to a transition log for diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Processing stage shown to the viewer.
///
/// Stages only move forward; `reset` is the single way back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStage {
    /// Nothing fetched yet.
    Idle,
    /// First record received; "parsing" delay running.
    Parsing,
    /// "Analyzing" delay running.
    Analyzing,
    /// Tree nodes are being revealed.
    RevealingTree,
    /// Votes are being counted, real or simulated.
    Voting,
    /// Winner declared, terminal for this evaluation.
    Complete,
}

impl PlaybackStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the tree is visible in this stage.
    pub fn shows_tree(self) -> bool {
        self >= Self::RevealingTree
    }
}

impl fmt::Display for PlaybackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Parsing => write!(f, "Parsing"),
            Self::Analyzing => write!(f, "Analyzing"),
            Self::RevealingTree => write!(f, "RevealingTree"),
            Self::Voting => write!(f, "Voting"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// Legal stage edges.
///
/// ```text
/// Idle → Parsing
/// Parsing → Analyzing
/// Analyzing → RevealingTree
/// RevealingTree → Voting
/// Voting → Complete
/// ```
fn is_legal_transition(from: PlaybackStage, to: PlaybackStage) -> bool {
    use PlaybackStage::*;

    matches!(
        (from, to),
        (Idle, Parsing)
            | (Parsing, Analyzing)
            | (Analyzing, RevealingTree)
            | (RevealingTree, Voting)
            | (Voting, Complete)
    )
}

/// A single recorded stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PlaybackStage,
    pub to: PlaybackStage,
    /// Milliseconds since the machine was created or last reset.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: PlaybackStage,
    pub to: PlaybackStage,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal stage transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

#[derive(Debug)]
pub struct StageMachine {
    current: PlaybackStage,
    started_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn current(&self) -> PlaybackStage {
        self.current
    }

    /// Machine whose transition times are measured from `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self {
            current: PlaybackStage::Idle,
            started_at: now,
            transitions: Vec::new(),
        }
    }

    /// Attempt to move to `to` at `now`, recording the edge when legal.
    pub fn advance(
        &mut self,
        to: PlaybackStage,
        reason: Option<&str>,
        now: Instant,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, reason, "Stage transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: now.saturating_duration_since(self.started_at).as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Back to `Idle` with an empty log, timing from `now`.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::starting_at(now);
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, e.g. `Idle → Voting (4150ms, 4 transitions)`.
    /// The time is that of the latest transition.
    pub fn summary(&self) -> String {
        format!(
            "{} → {} ({}ms, {} transitions)",
            PlaybackStage::Idle,
            self.current,
            self.transitions.last().map_or(0, |t| t.elapsed_ms),
            self.transitions.len(),
        )
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_initial_stage() {
        let t0 = Instant::now();
        let sm = StageMachine::starting_at(t0);
        assert_eq!(sm.current(), PlaybackStage::Idle);
        assert!(!sm.is_terminal());
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_happy_path_transitions() {
        let t0 = Instant::now();
        let mut sm = StageMachine::starting_at(t0);
        sm.advance(PlaybackStage::Parsing, Some("first record"), t0).unwrap();
        sm.advance(PlaybackStage::Analyzing, None, t0).unwrap();
        sm.advance(PlaybackStage::RevealingTree, None, t0).unwrap();
        sm.advance(PlaybackStage::Voting, Some("all nodes visible"), t0).unwrap();
        sm.advance(PlaybackStage::Complete, None, t0).unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 5);
        assert_eq!(sm.transitions()[0].reason.as_deref(), Some("first record"));
    }

    #[test]
    fn test_skipping_and_backward_edges_rejected() {
        let t0 = Instant::now();
        let mut sm = StageMachine::starting_at(t0);
        let err = sm.advance(PlaybackStage::Voting, None, t0).unwrap_err();
        assert_eq!(err.from, PlaybackStage::Idle);
        assert_eq!(sm.current(), PlaybackStage::Idle);

        sm.advance(PlaybackStage::Parsing, None, t0).unwrap();
        assert!(sm.advance(PlaybackStage::Idle, None, t0).is_err());
        assert!(sm.advance(PlaybackStage::Parsing, None, t0).is_err());
        assert_eq!(sm.transitions().len(), 1);
    }

    #[test]
    fn test_complete_is_terminal() {
        let t0 = Instant::now();
        let mut sm = StageMachine::starting_at(t0);
        for stage in [
            PlaybackStage::Parsing,
            PlaybackStage::Analyzing,
            PlaybackStage::RevealingTree,
            PlaybackStage::Voting,
            PlaybackStage::Complete,
        ] {
            sm.advance(stage, None, t0).unwrap();
        }
        for stage in [PlaybackStage::Idle, PlaybackStage::Voting, PlaybackStage::Complete] {
            assert!(sm.advance(stage, None, t0).is_err());
        }
    }

    #[test]
    fn test_reset_clears_log() {
        let t0 = Instant::now();
        let mut sm = StageMachine::starting_at(t0);
        sm.advance(PlaybackStage::Parsing, None, t0).unwrap();
        sm.reset(t0);
        assert_eq!(sm.current(), PlaybackStage::Idle);
        assert!(sm.transitions().is_empty());
        assert!(sm.summary().starts_with("Idle → Idle"));
        assert!(sm.summary().ends_with("0 transitions)"));
    }

    #[test]
    fn test_elapsed_follows_supplied_instants() {
        let t0 = Instant::now();
        let mut sm = StageMachine::starting_at(t0);
        sm.advance(PlaybackStage::Parsing, None, t0).unwrap();
        sm.advance(PlaybackStage::Analyzing, None, t0 + Duration::from_millis(2_000))
            .unwrap();
        let elapsed: Vec<u64> = sm.transitions().iter().map(|t| t.elapsed_ms).collect();
        assert_eq!(elapsed, vec![0, 2_000]);
        assert_eq!(sm.summary(), "Idle → Analyzing (2000ms, 2 transitions)");

        // Restarting the clock on reset.
        let t1 = t0 + Duration::from_secs(10);
        sm.reset(t1);
        sm.advance(PlaybackStage::Parsing, None, t1 + Duration::from_millis(150))
            .unwrap();
        assert_eq!(sm.transitions()[0].elapsed_ms, 150);
    }

    #[test]
    fn test_transition_order() {
        assert!(PlaybackStage::Voting.shows_tree());
        assert!(!PlaybackStage::Analyzing.shows_tree());
        assert!(PlaybackStage::Complete > PlaybackStage::Idle);
    }
}
