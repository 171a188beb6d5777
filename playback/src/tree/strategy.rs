//! Affinity classification and parent selection.
//!
//! Records carry no explicit structure, so the default strategy infers it:
//! a statement belongs to whichever candidate label it mentions, and links to
//! the nearest-by-x statement of the same affinity one level up.

use crate::record::Candidate;

use super::{branch_id, Affinity, ThoughtNode, FIRST_ITERATION_LEVEL, ROOT_ID};

/// Decides what a statement is about and where it attaches.
pub trait TopologyStrategy: Send + Sync {
    /// Classify one statement. Must return `About(_)` or `Neutral`.
    fn classify(&self, statement: &str) -> Affinity;

    /// Pick the parent id for `child` among the nodes placed so far.
    ///
    /// `placed` holds every node with a smaller id, including all shallower
    /// levels. The returned id must index into `placed`.
    fn select_parent(&self, child: &ThoughtNode, placed: &[ThoughtNode]) -> usize;
}

impl<T: TopologyStrategy + ?Sized> TopologyStrategy for Box<T> {
    fn classify(&self, statement: &str) -> Affinity {
        (**self).classify(statement)
    }

    fn select_parent(&self, child: &ThoughtNode, placed: &[ThoughtNode]) -> usize {
        (**self).select_parent(child, placed)
    }
}

/// Substring classification with nearest-x parent linking.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringNearestX;

impl TopologyStrategy for SubstringNearestX {
    fn classify(&self, statement: &str) -> Affinity {
        Candidate::ALL
            .into_iter()
            .find(|c| statement.contains(c.label()))
            .map_or(Affinity::Neutral, Affinity::About)
    }

    fn select_parent(&self, child: &ThoughtNode, placed: &[ThoughtNode]) -> usize {
        let fallback = match child.affinity {
            Affinity::About(candidate) => branch_id(candidate),
            _ => ROOT_ID,
        };

        (FIRST_ITERATION_LEVEL..child.level)
            .rev()
            .find_map(|level| {
                nearest_by_x(
                    placed
                        .iter()
                        .filter(|n| n.level == level && n.affinity == child.affinity),
                    child.position.x,
                )
            })
            .unwrap_or(fallback)
    }
}

/// Closest node by horizontal distance; ties keep the earliest node.
fn nearest_by_x<'a>(nodes: impl Iterator<Item = &'a ThoughtNode>, x: f64) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;
    for node in nodes {
        let distance = (node.position.x - x).abs();
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, node.id));
        }
    }
    best.map(|(_, id)| id)
}
