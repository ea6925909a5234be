//! Mock lead source for testing.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::stages::{LeadSource, RawLead, SourceError};

/// A recorded discovery call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedDiscovery {
    pub query: String,
    pub location: String,
    pub limit: i64,
}

/// Mock implementation of the lead source.
pub struct MockLeadSource {
    results: RwLock<Vec<RawLead>>,
    discoveries: RwLock<Vec<RecordedDiscovery>>,
    next_error: RwLock<Option<SourceError>>,
}

impl Default for MockLeadSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLeadSource {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(Vec::new()),
            discoveries: RwLock::new(Vec::new()),
            next_error: RwLock::new(None),
        }
    }

    /// Set the raw leads returned by subsequent discoveries.
    pub fn set_results(&self, results: Vec<RawLead>) {
        *self.results.write().unwrap() = results;
    }

    /// Configure the next discovery to fail.
    pub fn set_next_error(&self, error: SourceError) {
        *self.next_error.write().unwrap() = Some(error);
    }

    /// Get recorded discovery calls.
    pub fn discoveries(&self) -> Vec<RecordedDiscovery> {
        self.discoveries.read().unwrap().clone()
    }
}

#[async_trait]
impl LeadSource for MockLeadSource {
    async fn discover(
        &self,
        query: &str,
        location: &str,
        limit: i64,
    ) -> Result<Vec<RawLead>, SourceError> {
        if let Some(error) = self.next_error.write().unwrap().take() {
            return Err(error);
        }

        self.discoveries.write().unwrap().push(RecordedDiscovery {
            query: query.to_string(),
            location: location.to_string(),
            limit,
        });

        let results = self.results.read().unwrap();
        Ok(results.iter().take(limit as usize).cloned().collect())
    }
}
