//! Mock inference service for testing.

use std::collections::VecDeque;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::inference::{InferenceError, InferenceService};
use crate::ledger::Credential;

/// A recorded inference call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedInference {
    pub credential_id: String,
    pub model_name: String,
    pub prompt: String,
}

/// Mock implementation of the inference service.
///
/// Queued errors are consumed before the canned response, one per call,
/// so a test can script "fail, fail, then succeed" exactly.
pub struct MockInferenceService {
    response: RwLock<String>,
    /// Responses consumed before falling back to the canned one.
    queued_responses: RwLock<VecDeque<String>>,
    queued_errors: RwLock<VecDeque<InferenceError>>,
    calls: RwLock<Vec<RecordedInference>>,
}

impl Default for MockInferenceService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInferenceService {
    pub fn new() -> Self {
        Self {
            response: RwLock::new("ok".to_string()),
            queued_responses: RwLock::new(VecDeque::new()),
            queued_errors: RwLock::new(VecDeque::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Set the canned response returned by every successful call.
    pub fn set_response(&self, text: impl Into<String>) {
        *self.response.write().unwrap() = text.into();
    }

    /// Queue a one-shot response consumed before the canned one.
    pub fn push_response(&self, text: impl Into<String>) {
        self.queued_responses.write().unwrap().push_back(text.into());
    }

    /// Queue an error for the next call.
    pub fn fail_next(&self, error: InferenceError) {
        self.queued_errors.write().unwrap().push_back(error);
    }

    /// Get recorded calls.
    pub fn calls(&self) -> Vec<RecordedInference> {
        self.calls.read().unwrap().clone()
    }

    /// Get the number of calls performed.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl InferenceService for MockInferenceService {
    async fn infer(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<String, InferenceError> {
        self.calls.write().unwrap().push(RecordedInference {
            credential_id: credential.id.clone(),
            model_name: credential.model_name.clone(),
            prompt: prompt.to_string(),
        });

        if let Some(error) = self.queued_errors.write().unwrap().pop_front() {
            return Err(error);
        }
        if let Some(text) = self.queued_responses.write().unwrap().pop_front() {
            return Ok(text);
        }
        Ok(self.response.read().unwrap().clone())
    }
}
