//! The protocol-neutral endpoint facade (spec.md §4.1).

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

// Layer 3: Internal module imports
use super::error::EndpointError;
use crate::queue::Queue;

/// Which transport a [`Endpoint`] is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Embedded HTTP server (inbound) / pooled HTTP client (outbound).
    Http,
    /// Broker subscription (inbound) / broker publish (outbound).
    Mqtt,
}

impl Protocol {
    /// Parse a case-insensitive protocol tag from configuration.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "HTTP" => Some(Protocol::Http),
            "MQTT" => Some(Protocol::Mqtt),
            _ => None,
        }
    }
}

/// Broker username/password, used only by the MQTT variant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Construction-time configuration for an [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub protocol: Protocol,
    pub url: String,
    pub port: u16,
    pub identifier: String,
    pub credentials: Option<Credentials>,
}

impl EndpointConfig {
    /// Validate address/port/identifier, mirroring `create(config)`'s
    /// documented failure modes. `port` is already bounded to
    /// `[0, 65535]` by its type; this only re-checks the fields that
    /// plain-text configuration can get wrong upstream of the type
    /// system (blank url, malformed identifier).
    pub fn validate(&self) -> Result<(), EndpointError> {
        if self.url.trim().is_empty() {
            return Err(EndpointError::InvalidAddress(
                "url must not be blank".to_string(),
            ));
        }
        if self.identifier.is_empty()
            || !self
                .identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(EndpointError::InvalidId(format!(
                "identifier '{}' must be non-empty and contain only [0-9a-zA-Z]",
                self.identifier
            )));
        }
        Ok(())
    }
}

/// A destination for payloads delivered by an [`Endpoint`]'s inbound
/// transport.
///
/// [`Queue<Bytes>`] implements this directly so a [`crate::receiver::Receiver`]
/// can hand its queue straight to `start_inbound` — the endpoint's
/// delivery task then blocks on a full queue exactly as spec.md §4.4
/// requires ("if the queue is full the endpoint's delivery task blocks,
/// applying back-pressure to the transport").
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn deliver(&self, payload: Bytes) -> Result<(), EndpointError>;
}

#[async_trait]
impl InboundSink for Queue<Bytes> {
    async fn deliver(&self, payload: Bytes) -> Result<(), EndpointError> {
        self.add(payload)
            .await
            .map_err(|_| EndpointError::Transport("queue is closed".to_string()))
    }
}

/// Protocol-neutral facade over a broker subscription or an embedded HTTP
/// context (spec.md §4.1).
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Begin delivering received payloads on `channel` to `sink`.
    async fn start_inbound(
        &self,
        channel: &str,
        sink: Arc<dyn InboundSink>,
    ) -> Result<(), EndpointError>;

    /// Synchronously publish `payload` on `channel`, waiting up to
    /// `timeout` for transport acknowledgment. Returns the response body
    /// for HTTP (`None` on timeout); returns `None` for a broker publish.
    async fn publish(
        &self,
        channel: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Option<Bytes>, EndpointError>;

    /// Stop accepting new inbound traffic and release transport
    /// resources, draining in-flight work for up to `grace_seconds`.
    /// Always returns; never fails.
    async fn stop(&self, grace_seconds: u64);

    /// A channel that is notified when the underlying transport observes
    /// a connection loss, for transports that have a persistent
    /// connection to lose (broker variants). `None` for transports
    /// without one (the HTTP server variant has no "connection" to drop —
    /// spec.md §5: "HTTP server has no self-healing").
    fn connection_lost(&self) -> Option<watch::Receiver<u64>> {
        None
    }

    /// Re-establish the transport connection and resume every
    /// subscription previously started with `start_inbound`, after a
    /// reported connection loss. The default implementation reports that
    /// this transport does not support reconnection.
    async fn reconnect(&self) -> Result<(), EndpointError> {
        Err(EndpointError::InvalidTransition(
            "this endpoint variant does not support reconnection".to_string(),
        ))
    }
}
