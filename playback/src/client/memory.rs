//! Scripted in-memory evaluation service.
//!
//! Each id maps to a list of responses. Every fetch returns the next entry and
//! the last one repeats forever, which emulates a backend that fills in
//! iterations over time and then settles.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PlaybackError, PlaybackResult};
use crate::record::{EvaluationId, EvaluationRecord};
use crate::sample::{staged_sample, DEMO_ID_PREFIX, SAMPLE_EVALUATION_ID};

use super::{EvaluationClient, SubmissionRequest};

#[derive(Debug, Clone)]
struct Script {
    responses: Vec<PlaybackResult<EvaluationRecord>>,
    cursor: usize,
    fetches: usize,
}

impl Script {
    fn new(responses: Vec<PlaybackResult<EvaluationRecord>>) -> Self {
        Self {
            responses,
            cursor: 0,
            fetches: 0,
        }
    }

    fn next(&mut self, id: &EvaluationId) -> PlaybackResult<EvaluationRecord> {
        self.fetches += 1;
        let Some(response) = self.responses.get(self.cursor).cloned() else {
            return Err(PlaybackError::not_found(id.as_str()));
        };
        if self.cursor + 1 < self.responses.len() {
            self.cursor += 1;
        }
        response
    }
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, Script>,
    /// Served to unknown ids carrying the demo prefix.
    demo_script: Option<Vec<PlaybackResult<EvaluationRecord>>>,
    submissions: Vec<SubmissionRequest>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryEvaluationClient {
    state: Mutex<State>,
}

impl InMemoryEvaluationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client serving the staged sample under its own id and under any
    /// `eval-` id, including ids created by `submit`.
    pub fn with_sample() -> Self {
        let staged: Vec<_> = staged_sample().into_iter().map(Ok).collect();
        let client = Self::new();
        client.script(SAMPLE_EVALUATION_ID, staged.clone());
        client.lock().demo_script = Some(staged);
        client
    }

    /// Serve a single record for `id`.
    pub fn insert(&self, id: impl Into<String>, record: EvaluationRecord) {
        self.script(id, vec![Ok(record)]);
    }

    /// Serve `responses` in order for `id`; the last one repeats.
    pub fn script(&self, id: impl Into<String>, responses: Vec<PlaybackResult<EvaluationRecord>>) {
        self.lock().scripts.insert(id.into(), Script::new(responses));
    }

    /// Replace what unknown `eval-` ids are served.
    pub fn set_demo_script(&self, responses: Vec<PlaybackResult<EvaluationRecord>>) {
        self.lock().demo_script = Some(responses);
    }

    /// How many times `id` has been fetched.
    pub fn fetch_count(&self, id: &str) -> usize {
        self.lock().scripts.get(id).map_or(0, |s| s.fetches)
    }

    pub fn submissions(&self) -> Vec<SubmissionRequest> {
        self.lock().submissions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EvaluationClient for InMemoryEvaluationClient {
    async fn submit(&self, request: &SubmissionRequest) -> PlaybackResult<EvaluationId> {
        request.validate()?;
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("{DEMO_ID_PREFIX}{}", state.next_id);
        state.submissions.push(request.clone());
        let responses = state
            .demo_script
            .clone()
            .unwrap_or_else(|| vec![Ok(EvaluationRecord::new().with_id(id.clone()))]);
        state.scripts.insert(id.clone(), Script::new(responses));
        debug!(evaluation_id = %id, "Created in-memory evaluation");
        Ok(EvaluationId::from(id))
    }

    async fn fetch(&self, id: &EvaluationId) -> PlaybackResult<EvaluationRecord> {
        let mut state = self.lock();
        if !state.scripts.contains_key(id.as_str()) && id.as_str().starts_with(DEMO_ID_PREFIX) {
            if let Some(demo) = state.demo_script.clone() {
                state.scripts.insert(id.to_string(), Script::new(demo));
            }
        }
        match state.scripts.get_mut(id.as_str()) {
            Some(script) => script.next(id),
            None => Err(PlaybackError::not_found(id.as_str())),
        }
    }
}
