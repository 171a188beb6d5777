use tracing::{debug, warn};

use crate::record::{Candidate, EvaluationRecord};

use super::strategy::{SubstringNearestX, TopologyStrategy};
use super::truncate::{truncate_around, DEFAULT_TEXT_BUDGET};
use super::{
    branch_id, level_y, Affinity, Position, ThoughtNode, BRANCH_LEVEL, FINAL_LEVEL,
    FIRST_ITERATION_LEVEL, ROOT_ID, ROOT_LEVEL,
};

/// Smallest budget that still fits a candidate label between two markers.
pub const MIN_TEXT_BUDGET: usize = 16;

const BAND_A: (f64, f64) = (0.05, 0.35);
const BAND_B: (f64, f64) = (0.65, 0.95);
const BAND_NEUTRAL: (f64, f64) = (0.40, 0.60);

/// Converts an evaluation record into a positioned, linked node list.
///
/// Building never fails: missing or malformed iteration groups contribute no
/// nodes, and a record with no statements still yields the four scaffold
/// nodes.
#[derive(Debug, Clone)]
pub struct ThoughtTreeBuilder<S = SubstringNearestX> {
    strategy: S,
    text_budget: usize,
}

impl Default for ThoughtTreeBuilder<SubstringNearestX> {
    fn default() -> Self {
        Self::new()
    }
}

impl ThoughtTreeBuilder<SubstringNearestX> {
    pub fn new() -> Self {
        Self::with_strategy(SubstringNearestX)
    }
}

impl<S: TopologyStrategy> ThoughtTreeBuilder<S> {
    pub fn with_strategy(strategy: S) -> Self {
        Self {
            strategy,
            text_budget: DEFAULT_TEXT_BUDGET,
        }
    }

    /// Override the display budget (clamped to [`MIN_TEXT_BUDGET`]).
    pub fn with_text_budget(mut self, budget: usize) -> Self {
        self.text_budget = budget.max(MIN_TEXT_BUDGET);
        self
    }

    pub fn text_budget(&self) -> usize {
        self.text_budget
    }

    pub fn build(&self, record: &EvaluationRecord) -> Vec<ThoughtNode> {
        let mut nodes = self.scaffold(record);

        for (offset, group) in record.iterations.iter().enumerate() {
            let level = FIRST_ITERATION_LEVEL + offset as u8;
            let statements = group.statements();
            let affinities: Vec<Affinity> = statements
                .iter()
                .map(|s| self.strategy.classify(s))
                .collect();
            let xs = spread_across_bands(&affinities);

            for ((statement, affinity), x) in statements.iter().zip(affinities).zip(xs) {
                let id = nodes.len();
                let anchor = affinity.candidate().map(Candidate::label);
                let node = ThoughtNode {
                    id,
                    level,
                    text: truncate_around(statement, anchor, self.text_budget),
                    full_text: statement.clone(),
                    affinity,
                    position: Position {
                        x,
                        y: level_y(level),
                    },
                    child_ids: Vec::new(),
                };
                let parent = self.strategy.select_parent(&node, &nodes);
                link(&mut nodes, parent, id);
                nodes.push(node);
            }
        }

        self.append_final(record, &mut nodes);
        debug!(
            nodes = nodes.len(),
            statements = record.statement_count(),
            "Built thought tree"
        );
        nodes
    }

    fn scaffold(&self, record: &EvaluationRecord) -> Vec<ThoughtNode> {
        let root_text = record
            .job_description
            .clone()
            .unwrap_or_else(|| "Candidate comparison".to_string());
        let mut nodes = vec![ThoughtNode {
            id: ROOT_ID,
            level: ROOT_LEVEL,
            text: truncate_around(&root_text, None, self.text_budget),
            full_text: root_text,
            affinity: Affinity::Root,
            position: Position {
                x: 0.5,
                y: level_y(ROOT_LEVEL),
            },
            child_ids: Vec::new(),
        }];

        for (candidate, x) in [(Candidate::A, 0.25), (Candidate::B, 0.75)] {
            let name = record
                .candidate_experiences
                .as_ref()
                .and_then(|p| p.get(candidate))
                .map(|e| e.name.trim())
                .filter(|n| !n.is_empty());
            let full_text = match name {
                Some(name) => format!("{}: {name}", candidate.label()),
                None => candidate.label().to_string(),
            };
            let id = branch_id(candidate);
            nodes[ROOT_ID].child_ids.push(id);
            nodes.push(ThoughtNode {
                id,
                level: BRANCH_LEVEL,
                text: truncate_around(&full_text, Some(candidate.label()), self.text_budget),
                full_text,
                affinity: Affinity::Branch(candidate),
                position: Position {
                    x,
                    y: level_y(BRANCH_LEVEL),
                },
                child_ids: Vec::new(),
            });
        }
        nodes
    }

    fn append_final(&self, record: &EvaluationRecord, nodes: &mut Vec<ThoughtNode>) {
        let id = nodes.len();
        let deepest = nodes.iter().map(|n| n.level).max().unwrap_or(ROOT_LEVEL);
        let parents: Vec<usize> = nodes
            .iter()
            .filter(|n| n.level == deepest)
            .map(|n| n.id)
            .collect();
        for parent in parents {
            link(nodes, parent, id);
        }

        let (text, full_text) = match (record.final_winner, record.majority_vote) {
            (Some(winner), Some(votes)) => (
                format!(
                    "Final: {winner} wins {}-{}",
                    votes.get(winner),
                    votes.get(winner.other())
                ),
                format!(
                    "Final decision: {winner} is the better match ({} {}, {} {})",
                    Candidate::A,
                    votes.candidate_a,
                    Candidate::B,
                    votes.candidate_b
                ),
            ),
            (Some(winner), None) => (
                format!("Final: {winner}"),
                format!("Final decision: {winner} is the better match"),
            ),
            (None, _) => (
                "Awaiting final decision".to_string(),
                "The evaluation has not reached a decision yet".to_string(),
            ),
        };
        let anchor = record.final_winner.map(Candidate::label);

        nodes.push(ThoughtNode {
            id,
            level: FINAL_LEVEL,
            text: truncate_around(&text, anchor, self.text_budget),
            full_text,
            affinity: Affinity::Final,
            position: Position {
                x: 0.5,
                y: level_y(FINAL_LEVEL),
            },
            child_ids: Vec::new(),
        });
    }
}

fn link(nodes: &mut [ThoughtNode], parent: usize, child: usize) {
    let parent = if parent < nodes.len() {
        parent
    } else {
        warn!(parent, child, "Strategy returned an unknown parent, attaching to root");
        ROOT_ID
    };
    nodes[parent].child_ids.push(child);
}

fn band(affinity: Affinity) -> (f64, f64) {
    match affinity {
        Affinity::About(Candidate::A) => BAND_A,
        Affinity::About(Candidate::B) => BAND_B,
        _ => BAND_NEUTRAL,
    }
}

/// Even spread of each partition across its band, preserving record order.
/// A lone node is centered in its band.
fn spread_across_bands(affinities: &[Affinity]) -> Vec<f64> {
    let count = |target: (f64, f64)| affinities.iter().filter(|a| band(**a) == target).count();
    let totals = [count(BAND_A), count(BAND_B), count(BAND_NEUTRAL)];
    let mut ranks = [0usize; 3];

    affinities
        .iter()
        .map(|affinity| {
            let (lo, hi) = band(*affinity);
            let slot = match *affinity {
                Affinity::About(Candidate::A) => 0,
                Affinity::About(Candidate::B) => 1,
                _ => 2,
            };
            let rank = ranks[slot];
            ranks[slot] += 1;
            match totals[slot] {
                0 | 1 => (lo + hi) / 2.0,
                n => lo + (hi - lo) * rank as f64 / (n - 1) as f64,
            }
        })
        .collect()
}
