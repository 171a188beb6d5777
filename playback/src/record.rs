//! Evaluation record: the backend document the engine polls.
//!
//! Parsing is lenient. The producer stores records as MongoDB
//! extended JSON (`{"$oid": ...}`, `{"$numberInt": "3"}`) and fills in
//! iterations while the evaluation runs, so any field may be missing or of
//! the wrong type. Bad fields degrade to "absent" with a warning; only a
//! body that is not a JSON object is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PlaybackError;

/// Label the producer uses for the first candidate.
pub const CANDIDATE_A_LABEL: &str = "Candidate A";
/// Label the producer uses for the second candidate.
pub const CANDIDATE_B_LABEL: &str = "Candidate B";

/// Number of iteration groups in a record.
pub const ITERATION_COUNT: usize = 3;

/// One of the two compared candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Candidate {
    #[serde(rename = "candidate_a", alias = "Candidate A")]
    A,
    #[serde(rename = "candidate_b", alias = "Candidate B")]
    B,
}

impl Candidate {
    pub const ALL: [Candidate; 2] = [Candidate::A, Candidate::B];

    /// The label as it appears in reasoning text and record keys.
    pub fn label(self) -> &'static str {
        match self {
            Self::A => CANDIDATE_A_LABEL,
            Self::B => CANDIDATE_B_LABEL,
        }
    }

    /// Parse a label such as `"Candidate B"` (case and padding insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }

    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque identifier of an evaluation record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationId(String);

impl EvaluationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EvaluationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EvaluationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-candidate vote counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub candidate_a: u32,
    pub candidate_b: u32,
}

impl VoteTally {
    pub fn new(candidate_a: u32, candidate_b: u32) -> Self {
        Self {
            candidate_a,
            candidate_b,
        }
    }

    pub fn get(&self, candidate: Candidate) -> u32 {
        match candidate {
            Candidate::A => self.candidate_a,
            Candidate::B => self.candidate_b,
        }
    }

    pub fn increment(&mut self, candidate: Candidate) {
        match candidate {
            Candidate::A => self.candidate_a = self.candidate_a.saturating_add(1),
            Candidate::B => self.candidate_b = self.candidate_b.saturating_add(1),
        }
    }

    pub fn total(&self) -> u32 {
        self.candidate_a.saturating_add(self.candidate_b)
    }

    /// Candidate with strictly more votes, `None` on a tie.
    pub fn leader(&self) -> Option<Candidate> {
        use std::cmp::Ordering;
        match self.candidate_a.cmp(&self.candidate_b) {
            Ordering::Greater => Some(Candidate::A),
            Ordering::Less => Some(Candidate::B),
            Ordering::Equal => None,
        }
    }

    /// Share of votes for candidate A in [0, 1]; 0.5 when nobody voted.
    pub fn share_a(&self) -> f64 {
        match self.total() {
            0 => 0.5,
            total => f64::from(self.candidate_a) / f64::from(total),
        }
    }
}

/// A final outcome the producer has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub winner: Candidate,
    pub votes: VoteTally,
}

/// One `iteration_N` field as it was found in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IterationGroup {
    /// Field absent or null (not produced yet).
    #[default]
    Missing,
    /// A list; non-string entries have already been dropped.
    Statements(Vec<String>),
    /// Present but not a list.
    Malformed { found: &'static str },
}

impl IterationGroup {
    /// Statements of this group; empty unless it was a well-formed list.
    pub fn statements(&self) -> &[String] {
        match self {
            Self::Statements(statements) => statements,
            Self::Missing | Self::Malformed { .. } => &[],
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Education entry of a candidate profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Education {
    pub degree: String,
    pub major: String,
    pub school: String,
    pub school_logo: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(rename = "linkedInUrl")]
    pub linkedin_url: Option<String>,
}

/// Work-experience entry of a candidate profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkExperience {
    pub company: String,
    pub company_logo: Option<String>,
    pub role: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub description_bullets: Vec<String>,
    pub years_worked: Option<f64>,
}

/// Profile block passed through to the view untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateExperience {
    pub name: String,
    pub profile_pic: Option<String>,
    pub education: Vec<Education>,
    pub work_experience: Vec<WorkExperience>,
}

/// `candidate_experiences` keyed by candidate label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfiles {
    #[serde(rename = "Candidate A", default)]
    pub candidate_a: Option<CandidateExperience>,
    #[serde(rename = "Candidate B", default)]
    pub candidate_b: Option<CandidateExperience>,
}

impl CandidateProfiles {
    pub fn get(&self, candidate: Candidate) -> Option<&CandidateExperience> {
        match candidate {
            Candidate::A => self.candidate_a.as_ref(),
            Candidate::B => self.candidate_b.as_ref(),
        }
    }
}

/// A (possibly partial) evaluation record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct EvaluationRecord {
    pub id: Option<String>,
    pub iterations: [IterationGroup; ITERATION_COUNT],
    pub final_winner: Option<Candidate>,
    pub majority_vote: Option<VoteTally>,
    pub job_description: Option<String>,
    pub candidate_experiences: Option<CandidateProfiles>,
}

impl EvaluationRecord {
    /// Empty record, as produced right after submission.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set iteration group `index` (0-based) to the given statements.
    pub fn with_iteration<S: Into<String>>(
        mut self,
        index: usize,
        statements: impl IntoIterator<Item = S>,
    ) -> Self {
        if let Some(group) = self.iterations.get_mut(index) {
            *group = IterationGroup::Statements(statements.into_iter().map(Into::into).collect());
        }
        self
    }

    pub fn with_winner(mut self, winner: Candidate) -> Self {
        self.final_winner = Some(winner);
        self
    }

    pub fn with_votes(mut self, candidate_a: u32, candidate_b: u32) -> Self {
        self.majority_vote = Some(VoteTally::new(candidate_a, candidate_b));
        self
    }

    pub fn with_job_description(mut self, text: impl Into<String>) -> Self {
        self.job_description = Some(text.into());
        self
    }

    /// A record is terminal once it carries both a winner and a tally. Either
    /// half on its own counts as not yet decided.
    pub fn is_terminal(&self) -> bool {
        self.decision().is_some()
    }

    /// Winner and tally, only when both are present.
    pub fn decision(&self) -> Option<Decision> {
        match (self.final_winner, self.majority_vote) {
            (Some(winner), Some(votes)) => Some(Decision { winner, votes }),
            _ => None,
        }
    }

    pub fn statement_count(&self) -> usize {
        self.iterations.iter().map(|g| g.statements().len()).sum()
    }

    /// Parse a record from an already decoded JSON value.
    pub fn from_json(value: Value) -> Result<Self, PlaybackError> {
        Self::try_from(value)
    }
}

impl TryFrom<Value> for EvaluationRecord {
    type Error = PlaybackError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(doc) = value else {
            return Err(PlaybackError::malformed(format!(
                "expected a JSON object, found {}",
                json_type_name(&value)
            )));
        };

        let iterations = [
            parse_iteration(&doc, "iteration_1"),
            parse_iteration(&doc, "iteration_2"),
            parse_iteration(&doc, "iteration_3"),
        ];

        Ok(Self {
            id: doc.get("_id").and_then(parse_object_id),
            iterations,
            final_winner: parse_winner(doc.get("final_winner")),
            majority_vote: doc.get("majority_vote").and_then(parse_majority_vote),
            job_description: doc
                .get("job_description")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            candidate_experiences: parse_profiles(doc.get("candidate_experiences")),
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_object_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn parse_iteration(doc: &Map<String, Value>, key: &str) -> IterationGroup {
    match doc.get(key) {
        None | Some(Value::Null) => IterationGroup::Missing,
        Some(Value::Array(items)) => {
            let statements: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect();
            let dropped = items.len() - statements.len();
            if dropped > 0 {
                debug!(field = key, dropped, "Skipped non-string iteration entries");
            }
            IterationGroup::Statements(statements)
        }
        Some(other) => {
            let found = json_type_name(other);
            warn!(field = key, found, "Iteration group is not a list, treating as empty");
            IterationGroup::Malformed { found }
        }
    }
}

fn parse_winner(value: Option<&Value>) -> Option<Candidate> {
    match value? {
        Value::Null => None,
        Value::String(label) => {
            let parsed = Candidate::from_label(label);
            if parsed.is_none() {
                warn!(label = %label, "Unrecognized final_winner label, treating as undecided");
            }
            parsed
        }
        other => {
            warn!(found = json_type_name(other), "final_winner is not a string");
            None
        }
    }
}

/// Accepts `3`, `"3"`, `{"$numberInt": "3"}` and `{"$numberLong": "3"}`.
fn parse_vote_count(value: &Value) -> Option<u32> {
    let count = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Object(map) => map
            .get("$numberInt")
            .or_else(|| map.get("$numberLong"))
            .and_then(parse_vote_count)
            .map(u64::from),
        _ => None,
    }?;
    Some(u32::try_from(count).unwrap_or(u32::MAX))
}

fn parse_majority_vote(value: &Value) -> Option<VoteTally> {
    let Value::Object(map) = value else {
        if !value.is_null() {
            warn!(found = json_type_name(value), "majority_vote is not an object");
        }
        return None;
    };

    let mut tally = VoteTally::default();
    for candidate in Candidate::ALL {
        let count = match map.get(candidate.label()) {
            None => 0,
            Some(raw) => parse_vote_count(raw).unwrap_or_else(|| {
                warn!(candidate = %candidate, "Unreadable vote count, using 0");
                0
            }),
        };
        match candidate {
            Candidate::A => tally.candidate_a = count,
            Candidate::B => tally.candidate_b = count,
        }
    }
    Some(tally)
}

fn parse_profiles(value: Option<&Value>) -> Option<CandidateProfiles> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value::<CandidateProfiles>(value.clone()) {
        Ok(profiles) => Some(profiles),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable candidate_experiences");
            None
        }
    }
}
