//! Playback controller: stage machine, reveal index and vote tally.
//!
//! The controller is a synchronous state machine. It never sleeps; callers
//! feed it records (`on_record`) and due timers (`fire_due` / `on_timer`) with
//! the current instant, and it arms its own [`TimerSet`] for the next step.
//!
//! ```text
//! Idle ──record──▶ Parsing ──2s──▶ Analyzing ──2s──▶ RevealingTree
//!                     │ decided        │ decided          │ last node shown
//!                     └───────────────▶└─────────────────▶│
//!                                                         ▼
//!                   Complete ◀──real decision / 3s of simulated votes── Voting
//! ```

pub mod stage;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PlaybackTimings;
use crate::record::{Candidate, CandidateProfiles, Decision, EvaluationRecord, VoteTally};
use crate::timers::{TimerKind, TimerSet, TimerToken};
use crate::tree::{SubstringNearestX, ThoughtNode, ThoughtTreeBuilder, TopologyStrategy};

pub use stage::{IllegalTransition, PlaybackStage, StageMachine, TransitionRecord};

/// Everything a view needs to render the current frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub stage: PlaybackStage,
    pub reveal_index: usize,
    pub node_count: usize,
    /// Nodes with id <= `reveal_index`, empty before the tree is shown.
    pub visible_nodes: Vec<ThoughtNode>,
    pub votes: VoteTally,
    pub winner: Option<Candidate>,
    /// Reveal is running at the accelerated rate.
    pub fast_forward: bool,
    /// Votes come from the simulation rather than the record.
    pub simulated_votes: bool,
    pub job_description: Option<String>,
    pub candidate_experiences: Option<CandidateProfiles>,
}

pub struct PlaybackController {
    timings: PlaybackTimings,
    builder: ThoughtTreeBuilder<Box<dyn TopologyStrategy>>,
    rng: StdRng,
    stage: StageMachine,
    timers: TimerSet,
    nodes: Vec<ThoughtNode>,
    node_count: usize,
    reveal_index: usize,
    votes: VoteTally,
    winner: Option<Candidate>,
    /// Latest record carried both winner and tally.
    decided: bool,
    /// Winner named by the service, possibly without a tally yet.
    declared_winner: Option<Candidate>,
    decision: Option<Decision>,
    voting_started_at: Option<Instant>,
    job_description: Option<String>,
    candidate_experiences: Option<CandidateProfiles>,
}

impl PlaybackController {
    pub fn new(timings: PlaybackTimings) -> Self {
        Self::with_strategy(timings, Box::new(SubstringNearestX))
    }

    /// Use a different topology strategy for tree building.
    pub fn with_strategy(timings: PlaybackTimings, strategy: Box<dyn TopologyStrategy>) -> Self {
        let rng = match timings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            timings,
            builder: ThoughtTreeBuilder::with_strategy(strategy),
            rng,
            stage: StageMachine::new(),
            timers: TimerSet::new(),
            nodes: Vec::new(),
            node_count: 0,
            reveal_index: 0,
            votes: VoteTally::default(),
            winner: None,
            decided: false,
            declared_winner: None,
            decision: None,
            voting_started_at: None,
            job_description: None,
            candidate_experiences: None,
        }
    }

    /// Measure stage transition times from `now` instead of construction.
    pub fn with_clock_start(mut self, now: Instant) -> Self {
        self.stage = StageMachine::starting_at(now);
        self
    }

    pub fn stage(&self) -> PlaybackStage {
        self.stage.current()
    }

    pub fn reveal_index(&self) -> usize {
        self.reveal_index
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of nodes currently shown.
    pub fn visible_count(&self) -> usize {
        if self.stage().shows_tree() {
            self.reveal_index + 1
        } else {
            0
        }
    }

    pub fn nodes(&self) -> &[ThoughtNode] {
        &self.nodes
    }

    pub fn votes(&self) -> VoteTally {
        self.votes
    }

    pub fn winner(&self) -> Option<Candidate> {
        self.winner
    }

    pub fn is_fast_forward(&self) -> bool {
        self.decided
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        self.stage.transitions()
    }

    pub fn summary(&self) -> String {
        self.stage.summary()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending_count()
    }

    pub fn is_timer_pending(&self, kind: TimerKind) -> bool {
        self.timers.is_pending(kind)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline().map(|(deadline, _)| deadline)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let visible = self.visible_count().min(self.nodes.len());
        PlaybackSnapshot {
            stage: self.stage(),
            reveal_index: self.reveal_index,
            node_count: self.node_count,
            visible_nodes: self.nodes[..visible].to_vec(),
            votes: self.votes,
            winner: self.winner,
            fast_forward: self.decided,
            simulated_votes: self.voting_started_at.is_some(),
            job_description: self.job_description.clone(),
            candidate_experiences: self.candidate_experiences.clone(),
        }
    }

    /// Feed a freshly fetched record.
    pub fn on_record(&mut self, record: &EvaluationRecord, now: Instant) {
        let nodes = self.builder.build(record);
        if nodes.len() >= self.nodes.len() {
            if nodes.len() > self.node_count && self.node_count > 0 {
                debug!(from = self.node_count, to = nodes.len(), "Thought tree grew");
            }
            self.node_count = nodes.len();
            self.nodes = nodes;
        } else {
            debug!(
                kept = self.nodes.len(),
                received = nodes.len(),
                "Ignoring smaller tree, node count never shrinks"
            );
        }
        if record.job_description.is_some() {
            self.job_description = record.job_description.clone();
        }
        if record.candidate_experiences.is_some() {
            self.candidate_experiences = record.candidate_experiences.clone();
        }
        if record.is_terminal() {
            self.decided = true;
        }
        if let Some(winner) = record.final_winner {
            self.declared_winner = Some(winner);
        }
        if let Some(decision) = record.decision() {
            self.decision = Some(decision);
        }

        match self.stage() {
            PlaybackStage::Idle => {
                self.transition(PlaybackStage::Parsing, "first record received", now);
                if self.decided {
                    self.skip_to_reveal(now);
                } else {
                    self.timers
                        .schedule(TimerKind::Stage, now + self.timings.parsing_delay());
                }
            }
            PlaybackStage::Parsing | PlaybackStage::Analyzing => {
                if self.decided {
                    self.skip_to_reveal(now);
                }
            }
            PlaybackStage::RevealingTree | PlaybackStage::Voting | PlaybackStage::Complete => {
                if self.decided {
                    self.snap_forward();
                }
                if self.stage() == PlaybackStage::Voting {
                    if let Some(decision) = self.decision {
                        let reason = "decided record arrived";
                        self.complete(decision.winner, decision.votes, reason, now);
                    }
                }
                self.resume_reveal(now);
            }
        }
    }

    /// Handle a timer previously reported by [`next_deadline`](Self::next_deadline).
    ///
    /// Returns `false` for stale tokens, which never touch state.
    pub fn on_timer(&mut self, token: TimerToken, now: Instant) -> bool {
        if !self.timers.take(token) {
            return false;
        }
        self.dispatch(token.kind, now);
        true
    }

    /// Fire every timer due at or before `now`. Returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(token) = self.timers.pop_due(now) {
            self.dispatch(token.kind, now);
            fired += 1;
        }
        fired
    }

    /// Cancel all timers and return to `Idle` with no derived state.
    pub fn reset(&mut self, now: Instant) {
        let cancelled = self.timers.cancel_all();
        info!(cancelled, "Playback reset");
        self.stage.reset(now);
        self.nodes.clear();
        self.node_count = 0;
        self.reveal_index = 0;
        self.votes = VoteTally::default();
        self.winner = None;
        self.decided = false;
        self.declared_winner = None;
        self.decision = None;
        self.voting_started_at = None;
        self.job_description = None;
        self.candidate_experiences = None;
    }

    /// Cancel all timers, keeping the current frame. Returns how many were pending.
    pub fn teardown(&mut self) -> usize {
        let cancelled = self.timers.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "Playback timers cancelled");
        }
        cancelled
    }

    fn dispatch(&mut self, kind: TimerKind, now: Instant) {
        match kind {
            TimerKind::Stage => self.on_stage_timer(now),
            TimerKind::Reveal => self.on_reveal_tick(now),
            TimerKind::Vote => self.on_vote_tick(now),
            TimerKind::Poll => warn!("Poll timer routed to playback controller"),
        }
    }

    fn transition(&mut self, to: PlaybackStage, reason: &str, now: Instant) -> bool {
        let from = self.stage();
        match self.stage.advance(to, Some(reason), now) {
            Ok(()) => {
                info!(from = %from, to = %to, reason, "Playback stage");
                true
            }
            Err(e) => {
                warn!(error = %e, "Rejected stage transition");
                false
            }
        }
    }

    fn on_stage_timer(&mut self, now: Instant) {
        match self.stage() {
            PlaybackStage::Parsing => {
                self.transition(PlaybackStage::Analyzing, "parsing delay elapsed", now);
                self.timers
                    .schedule(TimerKind::Stage, now + self.timings.analyzing_delay());
            }
            PlaybackStage::Analyzing => {
                if self.transition(PlaybackStage::RevealingTree, "analyzing delay elapsed", now) {
                    self.start_reveal(now);
                }
            }
            other => debug!(stage = %other, "Stage timer fired outside a delay stage"),
        }
    }

    /// Decided record during the delay stages: jump straight to the tree.
    fn skip_to_reveal(&mut self, now: Instant) {
        self.timers.cancel(TimerKind::Stage);
        if self.stage() == PlaybackStage::Parsing {
            self.transition(PlaybackStage::Analyzing, "record already decided", now);
        }
        if self.transition(PlaybackStage::RevealingTree, "record already decided", now) {
            self.start_reveal(now);
        }
    }

    fn start_reveal(&mut self, now: Instant) {
        self.reveal_index = 0;
        if self.decided {
            self.snap_forward();
        }
        self.resume_reveal(now);
    }

    fn last_index(&self) -> usize {
        self.node_count.saturating_sub(1)
    }

    /// Raise the reveal index to the fast-forward fraction, never lowering it.
    fn snap_forward(&mut self) {
        let target = ((self.timings.fast_forward_fraction * self.node_count as f64).floor()
            as usize)
            .min(self.last_index());
        if target > self.reveal_index {
            debug!(from = self.reveal_index, to = target, "Fast-forwarding reveal");
            self.reveal_index = target;
        }
    }

    /// Arm the reveal tick if nodes remain hidden, otherwise finish the reveal.
    fn resume_reveal(&mut self, now: Instant) {
        if self.reveal_index >= self.last_index() {
            self.timers.cancel(TimerKind::Reveal);
            self.reveal_finished(now);
        } else if !self.timers.is_pending(TimerKind::Reveal) || self.decided {
            // Re-arming also switches a normal-speed tick to the fast one.
            self.timers
                .schedule(TimerKind::Reveal, now + self.timings.reveal_tick(self.decided));
        }
    }

    fn on_reveal_tick(&mut self, now: Instant) {
        let step = if self.decided { 2 } else { 1 };
        self.reveal_index = (self.reveal_index + step).min(self.last_index());
        debug!(reveal_index = self.reveal_index, node_count = self.node_count, "Reveal tick");
        self.resume_reveal(now);
    }

    fn reveal_finished(&mut self, now: Instant) {
        if self.stage() != PlaybackStage::RevealingTree {
            return;
        }
        if !self.transition(PlaybackStage::Voting, "all nodes revealed", now) {
            return;
        }
        match self.decision {
            Some(decision) => {
                self.complete(decision.winner, decision.votes, "record decision", now)
            }
            None => {
                self.votes = VoteTally::default();
                self.voting_started_at = Some(now);
                self.timers
                    .schedule(TimerKind::Vote, now + self.timings.vote_tick());
            }
        }
    }

    fn on_vote_tick(&mut self, now: Instant) {
        if self.stage() != PlaybackStage::Voting {
            return;
        }
        let bias = self.timings.vote_bias_b.clamp(0.0, 1.0);
        let pick = if self.rng.gen_bool(bias) {
            Candidate::B
        } else {
            Candidate::A
        };
        self.votes.increment(pick);
        debug!(
            candidate_a = self.votes.candidate_a,
            candidate_b = self.votes.candidate_b,
            "Simulated vote"
        );

        let elapsed = self
            .voting_started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        if elapsed >= self.timings.vote_duration() {
            // A winner named without a tally still decides the outcome.
            let winner = self
                .declared_winner
                .or_else(|| self.votes.leader())
                .unwrap_or(self.timings.fallback_winner);
            self.complete(winner, self.votes, "simulated voting finished", now);
        } else {
            self.timers
                .schedule(TimerKind::Vote, now + self.timings.vote_tick());
        }
    }

    fn complete(&mut self, winner: Candidate, votes: VoteTally, reason: &str, now: Instant) {
        if self.timers.cancel(TimerKind::Vote) {
            debug!("Simulated voting cancelled");
        }
        if self.decision.is_some() {
            self.voting_started_at = None;
        }
        self.votes = votes;
        self.winner = Some(winner);
        if self.transition(PlaybackStage::Complete, reason, now) {
            info!(
                winner = %winner,
                candidate_a = votes.candidate_a,
                candidate_b = votes.candidate_b,
                "Playback complete"
            );
        }
    }
}
