//! Plain-text rendering of session snapshots.

use playback::record::{Candidate, VoteTally};
use playback::session::{SessionSnapshot, SessionStatus};
use playback::tree::{Affinity, ThoughtNode};
use playback::PlaybackStage;

const VOTE_BAR_WIDTH: usize = 30;

/// One-line progress summary, printed whenever it changes.
pub fn status_line(snapshot: &SessionSnapshot) -> String {
    let playback = &snapshot.playback;
    let mut line = format!("[{}] {}", stage_label(playback.stage), status_label(&snapshot.status));
    if playback.stage.shows_tree() && playback.node_count > 0 {
        line.push_str(&format!(
            " | nodes {}/{}",
            (playback.reveal_index + 1).min(playback.node_count),
            playback.node_count
        ));
        if playback.fast_forward {
            line.push_str(" (fast)");
        }
    }
    if playback.stage >= PlaybackStage::Voting {
        line.push_str(" | ");
        line.push_str(&vote_bar(playback.votes, VOTE_BAR_WIDTH));
    }
    line
}

pub fn stage_label(stage: PlaybackStage) -> &'static str {
    match stage {
        PlaybackStage::Idle => "Waiting",
        PlaybackStage::Parsing => "Parsing profiles",
        PlaybackStage::Analyzing => "Analyzing",
        PlaybackStage::RevealingTree => "Reasoning",
        PlaybackStage::Voting => "Voting",
        PlaybackStage::Complete => "Done",
    }
}

fn status_label(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Connecting => "connecting".into(),
        SessionStatus::Polling => "polling".into(),
        SessionStatus::Retrying { code, attempts, .. } => format!("retrying ({code}, {attempts}x)"),
        SessionStatus::Settled => "result received".into(),
        SessionStatus::Completed => "completed".into(),
        SessionStatus::NotFound { message } | SessionStatus::Failed { message } => message.clone(),
        SessionStatus::TimedOut => "gave up waiting".into(),
        SessionStatus::Cancelled => "cancelled".into(),
    }
}

/// `A ██████░░░░ B  3 - 5`, filled in proportion to A's share.
pub fn vote_bar(votes: VoteTally, width: usize) -> String {
    let filled = (votes.share_a() * width as f64).round() as usize;
    let filled = filled.min(width);
    format!(
        "A {}{} B  {} - {}",
        "█".repeat(filled),
        "░".repeat(width - filled),
        votes.candidate_a,
        votes.candidate_b
    )
}

fn marker(affinity: Affinity) -> &'static str {
    match affinity {
        Affinity::Root => "◆",
        Affinity::Branch(_) => "▸",
        Affinity::About(Candidate::A) => "[A]",
        Affinity::About(Candidate::B) => "[B]",
        Affinity::Neutral => "[·]",
        Affinity::Final => "★",
    }
}

/// Nodes one per line, indented by level.
pub fn tree_view(nodes: &[ThoughtNode]) -> String {
    nodes
        .iter()
        .map(|node| {
            format!(
                "{:indent$}{} {}",
                "",
                marker(node.affinity),
                node.text,
                indent = usize::from(node.level) * 2
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn final_line(winner: Candidate) -> String {
    format!("Final Result: {} is the better match!", winner.label())
}
