//! Thought tree: the positioned, linked node list derived from a record.
//!
//! The tree is rebuilt from scratch on every fetch. Ids are array indices and
//! are assigned in a fixed order (root, branch A, branch B, statements in
//! record order, final node), so identical input always yields an identical
//! tree.

pub mod builder;
pub mod strategy;
pub mod truncate;

use std::fmt;

use serde::Serialize;

use crate::record::Candidate;

pub use builder::ThoughtTreeBuilder;
pub use strategy::{SubstringNearestX, TopologyStrategy};
pub use truncate::{truncate_around, DEFAULT_TEXT_BUDGET};

pub const ROOT_ID: usize = 0;
pub const ROOT_LEVEL: u8 = 0;
pub const BRANCH_LEVEL: u8 = 1;
/// Level of the first iteration group; groups occupy 2, 3 and 4.
pub const FIRST_ITERATION_LEVEL: u8 = 2;
pub const LAST_ITERATION_LEVEL: u8 = 4;
/// The synthesis node sits one level below the last iteration.
pub const FINAL_LEVEL: u8 = 5;

/// Number of synthetic nodes in every tree (root, two branches, final).
pub const SCAFFOLD_NODE_COUNT: usize = 4;

const TOP_MARGIN: f64 = 0.08;
const LEVEL_SPACING: f64 = 0.15;
const FINAL_Y: f64 = 0.92;

/// Id of the branch node for `candidate`.
pub fn branch_id(candidate: Candidate) -> usize {
    match candidate {
        Candidate::A => 1,
        Candidate::B => 2,
    }
}

/// Vertical position of a level. The final level gets a wider gap.
pub fn level_y(level: u8) -> f64 {
    if level >= FINAL_LEVEL {
        FINAL_Y
    } else {
        TOP_MARGIN + f64::from(level) * LEVEL_SPACING
    }
}

/// What a node is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    Root,
    Branch(Candidate),
    About(Candidate),
    Neutral,
    Final,
}

impl Affinity {
    /// Candidate a branch or statement belongs to.
    pub fn candidate(self) -> Option<Candidate> {
        match self {
            Self::Branch(c) | Self::About(c) => Some(c),
            Self::Root | Self::Neutral | Self::Final => None,
        }
    }

    /// Root, branch and final nodes are generated, not read from the record.
    pub fn is_scaffold(self) -> bool {
        matches!(self, Self::Root | Self::Branch(_) | Self::Final)
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Branch(c) => write!(f, "branch:{}", c.label()),
            Self::About(c) => write!(f, "{}", c.label()),
            Self::Neutral => write!(f, "neutral"),
            Self::Final => write!(f, "final"),
        }
    }
}

/// Normalized canvas coordinates in [0, 1] x [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThoughtNode {
    pub id: usize,
    pub level: u8,
    /// Display text, at most the builder's text budget in characters.
    pub text: String,
    pub full_text: String,
    pub affinity: Affinity,
    pub position: Position,
    /// Ids of nodes this one links down to, ascending.
    pub child_ids: Vec<usize>,
}

impl ThoughtNode {
    pub fn is_scaffold(&self) -> bool {
        self.affinity.is_scaffold()
    }
}

/// Ids of the nodes that link down to `id`.
pub fn parents_of(nodes: &[ThoughtNode], id: usize) -> Vec<usize> {
    nodes
        .iter()
        .filter(|n| n.child_ids.contains(&id))
        .map(|n| n.id)
        .collect()
}
