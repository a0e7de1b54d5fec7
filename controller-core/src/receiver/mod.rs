//! The Endpoint + Queue + Propagator composition template (spec.md §4.4).
//!
//! Used three times over the lifetime of a running controller —
//! registration, monitoring, update — with distinct channels and sink
//! sets but identical mechanics; this module supplies the mechanics once.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{error, info, warn};

// Layer 3: Internal module imports
use crate::endpoint::{self, Credentials, Endpoint, EndpointConfig, InboundSink, Protocol};
use crate::propagator::{Propagator, Sink};
use crate::queue::Queue;

mod error;
pub use error::ReceiverError;

/// The reception address a [`Receiver`] binds or subscribes to.
#[derive(Debug, Clone)]
pub struct ReceptionAddress {
    pub url: String,
    pub port: u16,
    pub channel: String,
}

/// Composes one [`Endpoint`], one [`Queue<Bytes>`] and one [`Propagator`]
/// into a reusable reception pipeline.
///
/// `start` and `stop` are the only lifecycle operations; `callback` is
/// always the propagator's first registered sink (spec.md §4.4:
/// "a single callback that will be registered as the propagator's first
/// sink"), with room for additional sinks to be registered afterward.
pub struct Receiver {
    identifier: String,
    address: ReceptionAddress,
    endpoint: Arc<dyn Endpoint>,
    queue: Arc<Queue<Bytes>>,
    propagator: Arc<Propagator<Bytes>>,
    started: AtomicBool,
    propagator_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    queue_capacity: usize,
}

impl Receiver {
    /// Build a receiver for `protocol_tag` ∈ `{"http", "mqtt"}`
    /// (case-insensitive). `identifier` names the underlying endpoint
    /// (spec.md §4.1's `INVALID_ID` rule applies to it); `callback` is
    /// registered as the first propagator sink.
    pub fn new(
        identifier: &str,
        protocol_tag: &str,
        address: ReceptionAddress,
        credentials: Option<Credentials>,
        callback: Arc<dyn Sink<Bytes>>,
        queue_capacity: usize,
    ) -> Result<Self, ReceiverError> {
        let protocol = Protocol::parse(protocol_tag)
            .ok_or_else(|| ReceiverError::InvalidProtocol(protocol_tag.to_string()))?;

        let config = EndpointConfig {
            protocol,
            url: address.url.clone(),
            port: address.port,
            identifier: identifier.to_string(),
            credentials,
        };
        let endpoint = endpoint::create(&config)?;

        let queue = Arc::new(Queue::new(queue_capacity));
        let propagator = Arc::new(Propagator::new(Arc::clone(&queue)));
        propagator.register(callback);

        Ok(Self {
            identifier: identifier.to_string(),
            address,
            endpoint,
            queue,
            propagator,
            started: AtomicBool::new(false),
            propagator_handle: AsyncMutex::new(None),
            queue_capacity,
        })
    }

    /// Register an additional sink, effective on the next drained
    /// element.
    pub fn register_sink(&self, sink: Arc<dyn Sink<Bytes>>) {
        self.propagator.register(sink);
    }

    /// Blocks until the endpoint is either successfully inbound-started
    /// or has errored. Internally the endpoint is started on its own
    /// task and reported back through a one-shot latch (spec.md §9's
    /// replacement for the busy-wait on volatile flags) rather than by
    /// spinning on a flag. If the endpoint supports connection-loss
    /// notification (broker variants), a background task also watches
    /// for exactly one automatic reconnect attempt (spec.md §4.4).
    pub async fn start(self: &Arc<Self>) -> Result<(), ReceiverError> {
        let (tx, rx) = oneshot::channel();
        let endpoint = Arc::clone(&self.endpoint);
        let channel = self.address.channel.clone();
        let sink: Arc<dyn InboundSink> = Arc::clone(&self.queue);

        tokio::spawn(async move {
            let result = endpoint.start_inbound(&channel, sink).await;
            let _ = tx.send(result);
        });

        rx.await
            .map_err(|_| ReceiverError::StopFailed("start task was dropped".to_string()))??;

        let handle = Arc::clone(&self.propagator).spawn();
        *self.propagator_handle.lock().await = Some(handle);
        self.started.store(true, Ordering::SeqCst);

        info!(identifier = %self.identifier, channel = %self.address.channel, "receiver started");

        if let Some(lost_rx) = self.endpoint.connection_lost() {
            let receiver = Arc::clone(self);
            tokio::spawn(async move { receiver.watch_for_reconnect(lost_rx).await });
        }

        Ok(())
    }

    async fn watch_for_reconnect(self: Arc<Self>, mut lost_rx: tokio::sync::watch::Receiver<u64>) {
        if lost_rx.changed().await.is_err() {
            return;
        }
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        warn!(identifier = %self.identifier, "connection lost; retrying once");
        match self.endpoint.reconnect().await {
            Ok(()) => info!(identifier = %self.identifier, "reconnected"),
            Err(err) => error!(identifier = %self.identifier, error = %err, "reconnect failed; receiver remains down"),
        }
    }

    /// Idempotent. Closes the endpoint, then the queue (letting the
    /// propagator drain the remaining backlog before it observes the
    /// terminal marker), then joins the propagator task.
    pub async fn stop(&self, grace_seconds: u64) -> Result<(), ReceiverError> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.endpoint.stop(grace_seconds).await;
        self.queue.close().await;

        if let Some(handle) = self.propagator_handle.lock().await.take() {
            handle
                .await
                .map_err(|err| ReceiverError::StopFailed(err.to_string()))?;
        }

        info!(identifier = %self.identifier, "receiver stopped");
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn address(&self) -> &ReceptionAddress {
        &self.address
    }
}
