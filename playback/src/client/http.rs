//! reqwest-backed client for the evaluation service.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{PlaybackError, PlaybackResult};
use crate::record::{EvaluationId, EvaluationRecord};

use super::{EvaluationClient, SubmissionRequest, SubmissionResponse};

const EVALUATIONS_PATH: &str = "evaluate_candidates";

pub struct HttpEvaluationClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpEvaluationClient {
    /// Build a client for `config.base_url`.
    ///
    /// Only the connect phase is bounded here; callers bound the whole round
    /// trip with `ApiConfig::request_timeout`.
    pub fn new(config: &ApiConfig) -> PlaybackResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| PlaybackError::config(format!("base_url {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(PlaybackError::config(format!(
                "base_url {:?} cannot carry a path",
                config.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| PlaybackError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, id: Option<&EvaluationId>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(EVALUATIONS_PATH);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        url
    }
}

#[async_trait]
impl EvaluationClient for HttpEvaluationClient {
    async fn submit(&self, request: &SubmissionRequest) -> PlaybackResult<EvaluationId> {
        request.validate()?;
        let url = self.endpoint(None);
        debug!(url = %url, "Submitting evaluation");

        let resp = self.http.post(url.clone()).json(request).send().await?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(PlaybackError::network(format!(
                "POST {url} returned {status}"
            )));
        }

        let body = resp.bytes().await?;
        let parsed: Option<SubmissionResponse> = serde_json::from_slice(&body).ok();
        if !status.is_success() {
            let reason = parsed
                .and_then(|r| r.message)
                .unwrap_or_else(|| format!("service returned {status}"));
            warn!(status = %status, reason = %reason, "Submission rejected");
            return Err(PlaybackError::invalid_submission(reason));
        }
        parsed
            .ok_or_else(|| PlaybackError::malformed("submission response is not valid JSON"))?
            .into_id()
    }

    async fn fetch(&self, id: &EvaluationId) -> PlaybackResult<EvaluationRecord> {
        let url = self.endpoint(Some(id));
        let resp = self.http.get(url.clone()).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PlaybackError::not_found(id.as_str()));
        }
        if !status.is_success() {
            return Err(PlaybackError::network(format!("GET {url} returned {status}")));
        }

        let body = resp.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| PlaybackError::malformed(format!("response body: {e}")))?;
        EvaluationRecord::from_json(value)
    }
}
