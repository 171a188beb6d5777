//! Evaluation playback engine.
//!
//! Polls an evaluation service for a two-candidate comparison, reshapes the
//! staged reasoning statements into a positioned thought tree, and plays the
//! tree back stage by stage alongside a vote tally and a declared winner.
//!
//! - [`client`]: submit and fetch evaluations (HTTP or scripted in-memory)
//! - [`tree`]: record to positioned, linked [`tree::ThoughtNode`]s
//! - [`controller`]: stage machine driving reveal and voting
//! - [`polling`]: fetch cadence, stale-response and terminal handling
//! - [`session`]: the async loop tying them together

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod polling;
pub mod record;
pub mod sample;
pub mod session;
pub mod timers;
pub mod tree;

pub use client::{
    candidate_id_from_url, EvaluationClient, HttpEvaluationClient, InMemoryEvaluationClient,
    SubmissionRequest,
};
pub use config::{ApiConfig, PlaybackConfig, PlaybackTimings, PollPolicy};
pub use controller::{PlaybackController, PlaybackSnapshot, PlaybackStage};
pub use error::{PlaybackError, PlaybackResult};
pub use polling::{PollOutcome, PollVerdict, PollingScheduler};
pub use record::{Candidate, EvaluationId, EvaluationRecord, VoteTally};
pub use session::{Session, SessionOutcome, SessionReport, SessionSnapshot, SessionStatus};
pub use timers::{TimerKind, TimerSet};
pub use tree::{Affinity, ThoughtNode, ThoughtTreeBuilder, TopologyStrategy};
