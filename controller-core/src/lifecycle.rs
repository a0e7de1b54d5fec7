//! Composes every component in dependency order and reverses that order
//! on shutdown (spec.md §4.8).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info};

// Layer 3: Internal module imports
use crate::aggregator::{AggregationTarget, Aggregator};
use crate::config::ControllerConfig;
use crate::context::ControllerContext;
use crate::error::ControllerError;
use crate::propagator::Sink;
use crate::receiver::{Receiver, ReceptionAddress};
use crate::registry::{ModelRegistry, RegistrationParser};
use crate::updater::Updater;

const RECEIVER_QUEUE_CAPACITY: usize = 256;

/// Registers ingested payloads with the [`ModelRegistry`]; the
/// Registration Receiver's propagator sink.
struct IngestSink {
    registry: Arc<ModelRegistry>,
}

#[async_trait]
impl Sink<Bytes> for IngestSink {
    async fn accept(&self, item: Bytes) -> Result<(), String> {
        let text = String::from_utf8_lossy(&item).into_owned();
        match self.registry.ingest(&text).await {
            Ok(entry) => {
                info!(key = %entry.key, "registration accepted");
                Ok(())
            }
            Err(err) => {
                // spec.md §4.5/§7: a rejected registration does not
                // affect other entities; log and move on rather than
                // propagating a propagator-level failure.
                error!(%err, "registration rejected");
                Err(err.to_string())
            }
        }
    }
}

/// Owns every long-lived component and the order they start/stop in.
pub struct LifecycleController {
    context: ControllerContext,
    registration_receiver: Arc<Receiver>,
    update_receiver: Option<Arc<Receiver>>,
    bridge_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LifecycleController {
    /// Start order (spec.md §4.8, strict — each step depends on the
    /// previous): parser (already brought up by the caller; it is an
    /// external collaborator per spec.md §1's scoping), Aggregator,
    /// Registry (with its registration-event bridge), Registration
    /// Receiver, and finally the optional Updater + Update Receiver.
    pub async fn start(
        config: ControllerConfig,
        parser: Arc<dyn RegistrationParser>,
    ) -> Result<Self, ControllerError> {
        let aggregation_target = config.aggregation.as_ref().map(|agg| AggregationTarget {
            protocol_tag: agg.protocol_tag.clone(),
            url: agg.url.clone(),
            port: agg.port,
            channel: agg.channel.clone(),
            credentials: None,
        });
        let aggregator = Arc::new(Aggregator::new(aggregation_target).await?);

        let (registry, events) = ModelRegistry::new(parser, config.model_directory.clone())?;
        let registry = Arc::new(registry);

        let updater = config.update.as_ref().map(|_| {
            Arc::new(Updater::new(
                Arc::clone(&registry),
                "/update".to_string(),
            ))
        });

        let context = ControllerContext::new(
            Arc::clone(&registry),
            Arc::clone(&aggregator),
            updater.clone(),
        );

        let bridge_context = context.clone();
        let bridge_handle = tokio::spawn(async move {
            bridge_context.run_registration_bridge(events).await;
        });

        let ingest_sink = Arc::new(IngestSink {
            registry: Arc::clone(&registry),
        });
        let registration_receiver = Arc::new(Receiver::new(
            "registration",
            &config.registration.protocol_tag,
            ReceptionAddress {
                url: config.registration.url.clone(),
                port: config.registration.port,
                channel: config.registration.channel.clone(),
            },
            None,
            ingest_sink,
            RECEIVER_QUEUE_CAPACITY,
        )?);
        registration_receiver.start().await?;
        info!("registration receiver is up");

        let update_receiver = match (&config.update, &updater) {
            (Some(update_config), Some(updater)) => {
                let receiver = Arc::new(Receiver::new(
                    "update",
                    &update_config.protocol_tag,
                    ReceptionAddress {
                        url: update_config.url.clone(),
                        port: update_config.port,
                        channel: update_config.channel.clone(),
                    },
                    None,
                    Arc::clone(updater) as Arc<dyn Sink<Bytes>>,
                    RECEIVER_QUEUE_CAPACITY,
                )?);
                receiver.start().await?;
                info!("update receiver is up");
                Some(receiver)
            }
            _ => None,
        };

        Ok(Self {
            context,
            registration_receiver,
            update_receiver,
            bridge_handle: AsyncMutex::new(Some(bridge_handle)),
        })
    }

    /// Read-only access to the shared context (registry, aggregator,
    /// subscriber pool, updater) for callers that need to act on it
    /// directly, e.g. `controller-cli`'s explicit-command path.
    pub fn context(&self) -> &ControllerContext {
        &self.context
    }

    /// Stop order: reverse of start. Each step's failure is logged and
    /// collected rather than aborting the remaining steps (spec.md §4.8:
    /// "If any stop step errors, continue with the remaining steps and
    /// aggregate errors").
    pub async fn stop(&self, grace_seconds: u64) -> Result<(), ControllerError> {
        let mut errors = Vec::new();

        if let Some(update_receiver) = &self.update_receiver {
            if let Err(err) = update_receiver.stop(grace_seconds).await {
                errors.push(err.to_string());
            }
        }

        if let Err(err) = self.registration_receiver.stop(grace_seconds).await {
            errors.push(err.to_string());
        }

        self.context.aggregator.tear_down().await;

        if let Some(handle) = self.bridge_handle.lock().await.take() {
            handle.abort();
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::State(errors.join("; ")))
        }
    }
}
