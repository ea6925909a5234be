//! Inference engine: pairs capacity allocation with the transport client.
//!
//! Stages never pick credentials themselves. They ask the engine for a
//! completion under a purpose and the engine handles acquire, report and
//! one retry on a different credential.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::capacity::{CapacityError, CapacityManager};
use crate::metrics;

use super::client::{InferenceError, InferenceService};

/// Errors surfaced to stages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No credential could be allocated.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Both the initial call and the retry failed.
    #[error("inference failed after retry: {0}")]
    Exhausted(InferenceError),

    /// The model answered but not with the JSON the caller asked for.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

/// Purpose-routed inference with failure accounting.
pub struct InferenceEngine {
    capacity: Arc<CapacityManager>,
    service: Arc<dyn InferenceService>,
}

impl InferenceEngine {
    pub fn new(capacity: Arc<CapacityManager>, service: Arc<dyn InferenceService>) -> Self {
        Self { capacity, service }
    }

    /// Run one prompt under `purpose`. A failed call bans the credential
    /// and retries once on a freshly acquired one.
    pub async fn generate(
        &self,
        purpose: crate::ledger::Purpose,
        prompt: &str,
    ) -> Result<String, EngineError> {
        let mut last_error = None;

        for attempt in 0..2 {
            let credential = self.capacity.acquire(purpose)?;
            let label = format!("{purpose:?}").to_lowercase();
            let timer = metrics::INFERENCE_DURATION
                .with_label_values(&[&label])
                .start_timer();
            let result = self.service.infer(&credential, prompt).await;
            timer.observe_duration();

            match result {
                Ok(text) => {
                    self.capacity.report_success(&credential.id)?;
                    metrics::INFERENCE_CALLS
                        .with_label_values(&[&label, "success"])
                        .inc();
                    return Ok(text);
                }
                Err(error) => {
                    metrics::INFERENCE_CALLS
                        .with_label_values(&[&label, "error"])
                        .inc();
                    warn!(
                        credential = %credential.id,
                        model = %credential.model_name,
                        attempt,
                        %error,
                        "inference call failed"
                    );
                    self.capacity.report_failure(&credential.id, &error)?;
                    last_error = Some(error);
                }
            }
        }

        // Both attempts consumed; last_error is always set here.
        Err(EngineError::Exhausted(last_error.unwrap_or(
            InferenceError::Transient("no attempt executed".to_string()),
        )))
    }

    /// Run one prompt and parse the answer as JSON, tolerating markdown
    /// code fences around the payload.
    pub async fn generate_json<T: serde::de::DeserializeOwned>(
        &self,
        purpose: crate::ledger::Purpose,
        prompt: &str,
    ) -> Result<T, EngineError> {
        let text = self.generate(purpose, prompt).await?;
        let payload = extract_json_payload(&text);
        debug!(bytes = payload.len(), "parsing model JSON output");
        serde_json::from_str(payload)
            .map_err(|e| EngineError::MalformedOutput(format!("{e}: {payload}")))
    }
}

/// Strip an optional markdown code fence from a model answer. Models
/// routinely wrap JSON in ```json blocks despite instructions not to.
pub fn extract_json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::CapacityConfig;
    use crate::ledger::{CredentialStore, NewCredential, Purpose, SqliteCredentialStore, Tier};
    use crate::testing::MockInferenceService;

    fn engine_with(
        service: MockInferenceService,
    ) -> (InferenceEngine, Arc<SqliteCredentialStore>) {
        let store = Arc::new(SqliteCredentialStore::in_memory().unwrap());
        let capacity = Arc::new(CapacityManager::new(store.clone(), CapacityConfig::default()));
        (InferenceEngine::new(capacity, Arc::new(service)), store)
    }

    fn add_credential(store: &SqliteCredentialStore) -> crate::ledger::Credential {
        store
            .insert(NewCredential {
                api_key: "sk-test".to_string(),
                model_name: "flash-2".to_string(),
                tier: Tier::Free,
                purposes: vec![Purpose::General],
                daily_limit: 100,
                safety_margin: 10,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_success_counts_usage() {
        let service = MockInferenceService::new();
        service.set_response("hello");
        let (engine, store) = engine_with(service);
        let cred = add_credential(&store);

        let text = engine.generate(Purpose::Fast, "hi").await.unwrap();
        assert_eq!(text, "hello");

        let row = store.get(&cred.id).unwrap().unwrap();
        assert_eq!(row.usage_today, 1);
    }

    #[tokio::test]
    async fn test_generate_retries_on_second_credential() {
        let service = MockInferenceService::new();
        service.fail_next(InferenceError::QuotaExceeded);
        service.set_response("recovered");
        let (engine, store) = engine_with(service);
        let first = add_credential(&store);
        add_credential(&store);

        let text = engine.generate(Purpose::Fast, "hi").await.unwrap();
        assert_eq!(text, "recovered");

        // The first failing credential must be blocked for the day.
        let banned = store.get(&first.id).unwrap().unwrap();
        assert_ne!(banned.ban_state, crate::ledger::BanState::Active);
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_retry() {
        let service = MockInferenceService::new();
        service.fail_next(InferenceError::Transient("boom".to_string()));
        service.fail_next(InferenceError::Transient("boom".to_string()));
        let (engine, store) = engine_with(service);
        add_credential(&store);
        add_credential(&store);
        add_credential(&store);

        let result = engine.generate(Purpose::Fast, "hi").await;
        assert!(matches!(result, Err(EngineError::Exhausted(_))));
    }

    #[tokio::test]
    async fn test_generate_json_unfences() {
        let service = MockInferenceService::new();
        service.set_response("```json\n{\"verdict\": \"ok\"}\n```");
        let (engine, store) = engine_with(service);
        add_credential(&store);

        #[derive(serde::Deserialize)]
        struct Out {
            verdict: String,
        }
        let out: Out = engine.generate_json(Purpose::Fast, "hi").await.unwrap();
        assert_eq!(out.verdict, "ok");
    }

    #[test]
    fn test_extract_json_payload() {
        assert_eq!(extract_json_payload("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json_payload("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json_payload("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(extract_json_payload("  {\"a\":1}  "), "{\"a\":1}");
    }
}
