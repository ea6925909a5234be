//! Outbound message dispatch.
//!
//! One seam for everything the system sends out: prospect outreach,
//! nurture follow-ups, payment reminders and operator reports. The
//! default implementation only logs, which keeps a fresh deployment
//! safe until a real delivery channel is wired in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Delivery channel for an outbound message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Social,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Social => "social",
        }
    }
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: Channel,
    /// Email address or social handle, channel dependent.
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Error type for dispatch.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

/// Trait for outbound delivery backends.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Notifier that writes messages to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        info!(
            channel = message.channel.as_str(),
            recipient = %message.recipient,
            subject = %message.subject,
            body_len = message.body.len(),
            "outbound message"
        );
        Ok(())
    }
}
