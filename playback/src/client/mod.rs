//! Evaluation service client.
//!
//! The trait is the network seam: submit a comparison, fetch a record by id.
//! Implementations never retry; retry policy lives in the polling scheduler.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, PlaybackResult};
use crate::record::{EvaluationId, EvaluationRecord};

pub use http::HttpEvaluationClient;
pub use memory::InMemoryEvaluationClient;

/// Body of `POST /evaluate_candidates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub job_description: String,
    pub profile_id_candidate_a: String,
    pub profile_id_candidate_b: String,
}

impl SubmissionRequest {
    /// Build a request from two pasted profile URLs (or bare ids).
    ///
    /// Rejects the submission before any network call when either candidate
    /// id is empty.
    pub fn from_urls(
        job_description: impl Into<String>,
        candidate_a_url: &str,
        candidate_b_url: &str,
    ) -> PlaybackResult<Self> {
        let a = candidate_id_from_url(candidate_a_url).ok_or_else(|| {
            PlaybackError::invalid_submission(format!(
                "no candidate A id in {candidate_a_url:?}"
            ))
        })?;
        let b = candidate_id_from_url(candidate_b_url).ok_or_else(|| {
            PlaybackError::invalid_submission(format!(
                "no candidate B id in {candidate_b_url:?}"
            ))
        })?;
        Ok(Self {
            job_description: job_description.into(),
            profile_id_candidate_a: a,
            profile_id_candidate_b: b,
        })
    }

    /// Local checks applied by every client before sending.
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.profile_id_candidate_a.trim().is_empty()
            || self.profile_id_candidate_b.trim().is_empty()
        {
            return Err(PlaybackError::invalid_submission(
                "both candidate ids are required",
            ));
        }
        Ok(())
    }
}

/// Response of `POST /evaluate_candidates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl SubmissionResponse {
    /// The created id, or the service's reason for refusing.
    pub fn into_id(self) -> PlaybackResult<EvaluationId> {
        match self.document_id.filter(|id| !id.is_empty()) {
            Some(id) if self.success => Ok(EvaluationId::from(id)),
            _ => Err(PlaybackError::invalid_submission(
                self.message
                    .unwrap_or_else(|| "service did not create an evaluation".to_string()),
            )),
        }
    }
}

/// Final path segment of a profile URL.
///
/// Query string, fragment and trailing slashes are ignored, so
/// `https://www.linkedin.com/in/jane-doe/?trk=x` yields `jane-doe`.
pub fn candidate_id_from_url(url: &str) -> Option<String> {
    let url = url.trim();
    let end = url.find(&['?', '#'][..]).unwrap_or(url.len());
    url[..end]
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty() && !id.ends_with(':'))
        .map(String::from)
}

/// Access to the evaluation service.
#[async_trait]
pub trait EvaluationClient: Send + Sync {
    /// Create an evaluation and return its id.
    async fn submit(&self, request: &SubmissionRequest) -> PlaybackResult<EvaluationId>;

    /// Fetch the current state of an evaluation.
    async fn fetch(&self, id: &EvaluationId) -> PlaybackResult<EvaluationRecord>;
}
