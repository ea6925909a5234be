//! Mock page fetcher for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::enrich::Fetcher;

/// Mock implementation of the page fetcher.
///
/// Unknown URLs fetch as empty, matching how the real fetcher treats an
/// unreachable site.
pub struct MockFetcher {
    pages: RwLock<HashMap<String, String>>,
    fetched: RwLock<Vec<String>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            fetched: RwLock::new(Vec::new()),
        }
    }

    /// Serve `body` for `url`.
    pub fn set_page(&self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.write().unwrap().insert(url.into(), body.into());
    }

    /// URLs fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> String {
        self.fetched.write().unwrap().push(url.to_string());
        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }
}
