//! The outbound provider boundary.
//!
//! The remote delivery provider is a black box behind [`Transport`]: one
//! send-one-message call that either yields a provider message id or an
//! error. Failures are always recoverable-by-recording — nothing behind
//! this trait may propagate as a crash, and any latency bound (timeouts,
//! circuit breaking) lives inside the implementation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use courier_common::{EmailAddress, ProviderMessageId};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// One fully built outbound message.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to: EmailAddress,
    pub from: EmailAddress,
    pub reply_to: Option<EmailAddress>,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// Opaque key/value pairs echoed back in provider events, used to
    /// correlate webhooks with campaigns and enrollments.
    pub custom_args: Vec<(String, String)>,
}

/// Error returned by a transport for one message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider rejected the message (bad recipient, policy, size).
    #[error("provider rejected message: {0}")]
    Rejected(String),

    /// The send call itself failed (connectivity, timeout, 5xx).
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Outbound send-one-message interface.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Hand one message to the provider.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the provider did not accept the
    /// message; callers record the failure and continue.
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<ProviderMessageId, TransportError>;
}

/// Transport stand-in that accepts every message without contacting a
/// provider.
///
/// Logs each send and mints a provider message id, which keeps the full
/// record/annotate pipeline exercisable in development deployments. A real
/// provider client implements [`Transport`] in its place.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkTransport;

#[async_trait]
impl Transport for SinkTransport {
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<ProviderMessageId, TransportError> {
        let message_id = ProviderMessageId::new(format!("sink-{}", ulid::Ulid::new()));
        info!(
            to = %message.to,
            subject = %message.subject,
            provider_message_id = %message_id,
            "sink transport accepted message"
        );
        Ok(message_id)
    }
}

/// Runtime selection of the outbound transport.
#[derive(Debug, Clone, Default, Deserialize)]
pub enum TransportConfig {
    /// Accept-everything stand-in; see [`SinkTransport`].
    #[default]
    Sink,
}

impl TransportConfig {
    /// Build the configured transport.
    #[must_use]
    pub fn build(&self) -> Arc<dyn Transport> {
        match self {
            Self::Sink => Arc::new(SinkTransport),
        }
    }
}

/// Scriptable transport double for tests.
///
/// Captures every outbound message and fails sends to addresses registered
/// via [`MockTransport::fail_for`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failures: Arc<Mutex<HashMap<EmailAddress, String>>>,
}

impl MockTransport {
    /// Create a transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a failure for every send to `address`.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    pub fn fail_for(&self, address: EmailAddress, error: impl Into<String>) {
        self.failures
            .lock()
            .expect("MockTransport failures mutex poisoned")
            .insert(address, error.into());
    }

    /// Every message handed to the transport so far.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .expect("MockTransport sent mutex poisoned")
            .clone()
    }

    /// Number of accepted messages.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent
            .lock()
            .expect("MockTransport sent mutex poisoned")
            .len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<ProviderMessageId, TransportError> {
        let scripted = self
            .failures
            .lock()
            .expect("MockTransport failures mutex poisoned")
            .get(&message.to)
            .cloned();

        if let Some(error) = scripted {
            return Err(TransportError::Failed(error));
        }

        self.sent
            .lock()
            .expect("MockTransport sent mutex poisoned")
            .push(message.clone());

        Ok(ProviderMessageId::new(format!("mock-{}", ulid::Ulid::new())))
    }
}
