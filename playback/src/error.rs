//! Playback error taxonomy with retry classification.
//!
//! Every failure the engine can surface is represented here. The polling
//! scheduler asks `is_retryable()` instead of matching on strings.
//!
//! | Variant             | Retryable | Effect on the session             |
//! |---------------------|-----------|-----------------------------------|
//! | NetworkFailure      | yes       | keep polling, show retry status   |
//! | MalformedRecord     | yes       | keep polling, show retry status   |
//! | NotFound            | no        | stop polling, cancel all timers   |
//! | InvalidSubmission   | no        | rejected before any network call  |
//! | Config              | no        | rejected at startup               |

use thiserror::Error;

/// Result type alias for playback operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Errors that can occur while submitting, fetching or replaying an evaluation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// Transport failure, timeout or non-404 error status.
    #[error("Network failure: {message}")]
    NetworkFailure { message: String },

    /// The evaluation id is unknown to the backend.
    #[error("Evaluation not found: {evaluation_id}")]
    NotFound { evaluation_id: String },

    /// The response body could not be read as an evaluation record.
    #[error("Malformed evaluation record: {message}")]
    MalformedRecord { message: String },

    /// The submission was rejected locally (missing candidate identifiers).
    #[error("Invalid submission: {message}")]
    InvalidSubmission { message: String },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PlaybackError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    pub fn not_found(evaluation_id: impl Into<String>) -> Self {
        Self::NotFound {
            evaluation_id: evaluation_id.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }

    pub fn invalid_submission(message: impl Into<String>) -> Self {
        Self::InvalidSubmission {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the scheduler should keep polling after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure { .. } | Self::MalformedRecord { .. }
        )
    }

    /// Machine-readable code for snapshots and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkFailure { .. } => "NETWORK_FAILURE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::MalformedRecord { .. } => "MALFORMED_RECORD",
            Self::InvalidSubmission { .. } => "INVALID_SUBMISSION",
            Self::Config { .. } => "CONFIG",
        }
    }
}

impl From<reqwest::Error> for PlaybackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
