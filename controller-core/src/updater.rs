//! Software Updater / Command Sender (spec.md §2, §9).
//!
//! Consumes update-channel payloads (via its [`Sink`] impl, registered as
//! an Update Receiver's propagator sink) or ad hoc command payloads
//! (via [`Updater::send_command`]), and issues one outbound publish per
//! registered entity's `host:port` — using [`endpoint::create`]'s HTTP
//! variant, which shares the single pooled `reqwest::Client` across every
//! endpoint instance (spec.md §9's REDESIGN: no fresh client per
//! recipient).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

// Layer 3: Internal module imports
use crate::endpoint::{self, EndpointConfig, Protocol, DEFAULT_PUBLISH_TIMEOUT};
use crate::propagator::Sink;
use crate::registry::ModelRegistry;

/// Publishes a payload to every currently-registered entity's own
/// address, over HTTP, on a fixed outbound path.
pub struct Updater {
    registry: Arc<ModelRegistry>,
    outbound_path: String,
}

impl Updater {
    pub fn new(registry: Arc<ModelRegistry>, outbound_path: String) -> Self {
        Self {
            registry,
            outbound_path,
        }
    }

    /// Publish `payload` to every registered entity's `host:port`.
    /// Returns the number of entities the publish succeeded for; a
    /// per-entity failure is logged and does not stop delivery to the
    /// others.
    pub async fn publish_to_all(&self, payload: Bytes) -> usize {
        let mut delivered = 0;
        for key in self.registry.keys() {
            let Some(entry) = self.registry.get_by_key(&key) else {
                continue;
            };

            let config = EndpointConfig {
                protocol: Protocol::Http,
                url: entry.description.host.clone(),
                port: entry.description.port,
                identifier: format!("update-{}", entry.key),
                credentials: None,
            };

            match endpoint::create(&config) {
                Ok(endpoint) => {
                    match endpoint
                        .publish(&self.outbound_path, payload.clone(), DEFAULT_PUBLISH_TIMEOUT)
                        .await
                    {
                        Ok(_) => delivered += 1,
                        Err(err) => warn!(
                            identifier = %entry.description.identifier,
                            %err,
                            "update publish failed"
                        ),
                    }
                }
                Err(err) => warn!(
                    identifier = %entry.description.identifier,
                    %err,
                    "could not build update endpoint"
                ),
            }
        }
        delivered
    }

    /// Send an explicit command payload, identical in effect to an
    /// update-channel message (spec.md §2: "explicit command inputs").
    pub async fn send_command(&self, payload: Bytes) -> usize {
        self.publish_to_all(payload).await
    }
}

#[async_trait]
impl Sink<Bytes> for Updater {
    async fn accept(&self, item: Bytes) -> Result<(), String> {
        self.publish_to_all(item).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LineProtocolParser;

    #[tokio::test]
    async fn publishing_with_no_registered_entities_delivers_to_nobody() {
        let dir = tempfile::tempdir().unwrap();
        let parser = Arc::new(LineProtocolParser::new());
        let (registry, _rx) =
            ModelRegistry::new(parser, dir.path().to_path_buf()).unwrap();
        let updater = Updater::new(Arc::new(registry), "/update".to_string());

        assert_eq!(updater.publish_to_all(Bytes::from("v2")).await, 0);
    }
}
