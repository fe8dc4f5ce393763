//! Fire-and-forget lifecycle notifications.
//!
//! The controller hands events to an [`EventPublisher`]; delivery (mail,
//! message bus) belongs to whoever consumes the topic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// Topic carrying [`ForgotPasswordEvent`] payloads.
pub const FORGOT_PASSWORD_TOPIC: &str = "auth.forgot_password";

/// Publish failures. None of these are surfaced to lifecycle callers.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Publisher queue is full")]
    Full,

    #[error("Publisher is closed")]
    Closed,

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Outbound notification transport.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Emitted when a password reset is requested for a registered email.
///
/// Carries the plaintext token: this is the only place it travels after
/// creation, and it never reaches the store.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordEvent {
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for ForgotPasswordEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgotPasswordEvent")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Typed front for lifecycle events: encodes, bounds each attempt with a
/// timeout, and counts failures so silent loss stays visible.
pub struct AuthEvents {
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
    failures: AtomicU64,
}

impl AuthEvents {
    pub fn new(publisher: Arc<dyn EventPublisher>, timeout: Duration) -> Self {
        Self {
            publisher,
            timeout,
            failures: AtomicU64::new(0),
        }
    }

    pub async fn forgot_password(&self, event: &ForgotPasswordEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        tokio::time::timeout(
            self.timeout,
            self.publisher.publish(FORGOT_PASSWORD_TOPIC, payload),
        )
        .await
        .map_err(|_| PublishError::Timeout(self.timeout))?
    }

    /// Number of notifications that could not be handed off.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Message taken off a [`ChannelPublisher`].
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedEvent {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// In-process publisher over a bounded tokio channel. Never waits for room:
/// a full queue is reported as [`PublishError::Full`].
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<PublishedEvent>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.tx
            .try_send(PublishedEvent {
                topic: topic.to_string(),
                payload,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PublishError::Full,
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            })
    }
}

/// Publisher that only records the event in the log. Payloads are not logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        info!(topic, bytes = payload.len(), "event published");
        Ok(())
    }
}
