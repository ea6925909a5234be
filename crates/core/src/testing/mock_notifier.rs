//! Mock notifier for testing.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::notify::{Message, Notifier, NotifyError};

/// Mock implementation of the notifier that records every message.
pub struct MockNotifier {
    sent: RwLock<Vec<Message>>,
    fail_all: RwLock<bool>,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
            fail_all: RwLock::new(false),
        }
    }

    /// Make every subsequent send fail.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_all.write().unwrap() = failing;
    }

    /// Get all messages sent so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.read().unwrap().clone()
    }

    /// Messages addressed to one recipient.
    pub fn sent_to(&self, recipient: &str) -> Vec<Message> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.recipient == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        if *self.fail_all.read().unwrap() {
            return Err(NotifyError::Dispatch("mock failure".to_string()));
        }
        self.sent.write().unwrap().push(message.clone());
        Ok(())
    }
}
