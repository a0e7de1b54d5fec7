//! The broker (MQTT) [`Endpoint`] variant.
//!
//! spec.md §4.1 leaves the broker transport unnamed beyond "publish/
//! subscribe to a named channel... the system requests QoS 2". MQTT is
//! the natural binding for that contract; [`rumqttc`] is the client.
//!
//! A single `(url, port, identifier)` endpoint owns one broker connection
//! and one polling task; `start_inbound` may be called more than once on
//! the same connection (registration and, separately, a monitoring
//! subscription could in principle share a broker connection), each call
//! adding one more topic subscription multiplexed over the shared
//! `EventLoop`.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::EndpointError;
use super::traits::{Endpoint, EndpointConfig, InboundSink};

/// Depth of rumqttc's internal request channel; generous since the
/// controller's own [`crate::queue::Queue`] is the real back-pressure
/// point, not this client-side buffer.
const CLIENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MqttState {
    Initialized,
    Running,
    Stopped,
}

/// The MQTT variant of [`Endpoint`].
///
/// [`Endpoint::connection_lost`] is bumped every time the event loop
/// observes a connection error; [`crate::receiver::Receiver`] watches it
/// to implement spec.md §4.4's "automatically retries `start` once"
/// policy by calling [`Endpoint::reconnect`].
pub struct MqttEndpoint {
    options: MqttOptions,
    client: Mutex<AsyncClient>,
    state: Mutex<MqttState>,
    subscriptions: Arc<DashMap<String, Arc<dyn InboundSink>>>,
    connection_lost: watch::Sender<u64>,
    publish_ack: Arc<Notify>,
    poll_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MqttEndpoint {
    pub fn new(config: &EndpointConfig) -> Result<Self, EndpointError> {
        config.validate()?;
        let mut options = MqttOptions::new(
            format!("controller-{}", config.identifier),
            config.url.clone(),
            config.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(credentials) = &config.credentials {
            options.set_credentials(credentials.username.clone(), credentials.password.clone());
        }

        let (client, event_loop) = AsyncClient::new(options.clone(), CLIENT_CAPACITY);
        let subscriptions: Arc<DashMap<String, Arc<dyn InboundSink>>> = Arc::new(DashMap::new());
        let (lost_tx, _lost_rx) = watch::channel(0u64);
        let publish_ack = Arc::new(Notify::new());

        let poll_task = spawn_poll_loop(
            event_loop,
            Arc::clone(&subscriptions),
            lost_tx.clone(),
            Arc::clone(&publish_ack),
        );

        Ok(Self {
            options,
            client: Mutex::new(client),
            state: Mutex::new(MqttState::Initialized),
            subscriptions,
            connection_lost: lost_tx,
            publish_ack,
            poll_task: Mutex::new(Some(poll_task)),
        })
    }
}

fn spawn_poll_loop(
    mut event_loop: rumqttc::EventLoop,
    subscriptions: Arc<DashMap<String, Arc<dyn InboundSink>>>,
    connection_lost: watch::Sender<u64>,
    publish_ack: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let topic = publish.topic.clone();
                    if let Some(sink) = subscriptions.get(&topic) {
                        let sink = Arc::clone(&sink);
                        let payload = Bytes::from(publish.payload);
                        if let Err(err) = sink.deliver(payload).await {
                            warn!(%topic, %err, "inbound delivery failed");
                        }
                    } else {
                        debug!(%topic, "publish received for an unregistered topic");
                    }
                }
                Ok(Event::Incoming(Packet::PubAck(_)))
                | Ok(Event::Incoming(Packet::PubComp(_))) => {
                    publish_ack.notify_waiters();
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "mqtt connection lost");
                    connection_lost.send_modify(|generation| *generation += 1);
                    return;
                }
            }
        }
    })
}

#[async_trait]
impl Endpoint for MqttEndpoint {
    async fn start_inbound(
        &self,
        channel: &str,
        sink: Arc<dyn InboundSink>,
    ) -> Result<(), EndpointError> {
        {
            let mut state = self.state.lock();
            if *state == MqttState::Stopped {
                return Err(EndpointError::InvalidTransition(
                    "start_inbound on a stopped endpoint".to_string(),
                ));
            }
            *state = MqttState::Running;
        }

        if self.subscriptions.contains_key(channel) {
            return Err(EndpointError::AlreadyRunning(channel.to_string()));
        }

        let client = self.client.lock().clone();
        client
            .subscribe(channel, QoS::ExactlyOnce)
            .await
            .map_err(|err| EndpointError::Transport(err.to_string()))?;
        self.subscriptions.insert(channel.to_string(), sink);
        Ok(())
    }

    async fn publish(
        &self,
        channel: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Option<Bytes>, EndpointError> {
        let client = self.client.lock().clone();
        client
            .publish(channel, QoS::ExactlyOnce, false, payload.to_vec())
            .await
            .map_err(|err| EndpointError::Transport(err.to_string()))?;

        // QoS 2 acknowledgment is tracked by the shared poll loop, not
        // per-message pkid correlation (rumqttc's publish() does not hand
        // back a packet id); a publish this call didn't send can wake this
        // wait, trading precision for simplicity on a broker that is
        // otherwise quiescent between registered entities' samples.
        let _ = tokio::time::timeout(timeout, self.publish_ack.notified()).await;
        Ok(None)
    }

    async fn stop(&self, grace_seconds: u64) {
        {
            let mut state = self.state.lock();
            if *state != MqttState::Running {
                return;
            }
            *state = MqttState::Stopped;
        }

        tokio::time::sleep(Duration::from_secs(grace_seconds)).await;

        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
        let client = self.client.lock().clone();
        client.disconnect().await.ok();
    }

    fn connection_lost(&self) -> Option<watch::Receiver<u64>> {
        Some(self.connection_lost.subscribe())
    }

    async fn reconnect(&self) -> Result<(), EndpointError> {
        let (new_client, new_event_loop) = AsyncClient::new(self.options.clone(), CLIENT_CAPACITY);

        for entry in self.subscriptions.iter() {
            new_client
                .subscribe(entry.key(), QoS::ExactlyOnce)
                .await
                .map_err(|err| EndpointError::Transport(err.to_string()))?;
        }

        let new_task = spawn_poll_loop(
            new_event_loop,
            Arc::clone(&self.subscriptions),
            self.connection_lost.clone(),
            Arc::clone(&self.publish_ack),
        );

        *self.client.lock() = new_client;
        if let Some(old_task) = self.poll_task.lock().replace(new_task) {
            old_task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::traits::Protocol;

    fn config(identifier: &str) -> EndpointConfig {
        EndpointConfig {
            protocol: Protocol::Mqtt,
            url: "127.0.0.1".to_string(),
            port: 18883,
            identifier: identifier.to_string(),
            credentials: None,
        }
    }

    #[test]
    fn new_accepts_a_well_formed_config() {
        // Constructing an endpoint only builds the client handle and the
        // poll task; it does not itself dial the broker (rumqttc connects
        // lazily from the poll loop), so this does not require a live
        // broker to run.
        assert!(MqttEndpoint::new(&config("ep1")).is_ok());
    }

    #[test]
    fn new_rejects_an_invalid_identifier() {
        let mut cfg = config("bad id");
        cfg.identifier = "bad id".to_string();
        assert!(MqttEndpoint::new(&cfg).is_err());
    }

    #[test]
    fn connection_lost_channel_is_exposed() {
        let endpoint = MqttEndpoint::new(&config("ep2")).unwrap();
        assert!(Endpoint::connection_lost(&endpoint).is_some());
    }
}
