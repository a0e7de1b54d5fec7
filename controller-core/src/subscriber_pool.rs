//! One subscription per unique monitoring address, shared across every
//! registered entity that uses it (spec.md §4.7).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{info, warn};

// Layer 3: Internal module imports
use crate::aggregator::Aggregator;
use crate::endpoint::{self, Endpoint, EndpointConfig, EndpointError, InboundSink, Protocol};

/// `{channel, url, port}` uniquely identifies a monitoring address;
/// `identifier` is not part of the key — many entities sharing an
/// address share one subscription (spec.md §4.7's idempotence
/// requirement).
type AddressKey = (String, String, u16);

struct Subscription {
    endpoint: Arc<dyn Endpoint>,
    refcount: AtomicUsize,
}

/// Delivers each received sample straight to `aggregator.on_sample`, tagged
/// with the channel the subscription was opened for.
struct AggregatorSink {
    aggregator: Arc<Aggregator>,
    channel: String,
}

#[async_trait]
impl InboundSink for AggregatorSink {
    async fn deliver(&self, payload: Bytes) -> Result<(), EndpointError> {
        self.aggregator.on_sample(&self.channel, &payload).await;
        Ok(())
    }
}

/// Holds at most one active subscription per unique monitoring address,
/// refcounted across the entities that share it.
pub struct MonitoringSubscriberPool {
    aggregator: Arc<Aggregator>,
    subscriptions: DashMap<AddressKey, Arc<Subscription>>,
}

impl MonitoringSubscriberPool {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            aggregator,
            subscriptions: DashMap::new(),
        }
    }

    /// Register interest in `{channel, url, port}` on behalf of
    /// `identifier`. Returns `false` if `identifier` is blank (spec.md
    /// §4.7) or if the subscription could not be opened; the port type
    /// (`u16`) already rules out the out-of-range case spec.md §4.7
    /// separately calls out.
    pub async fn add_observable(&self, identifier: &str, channel: &str, url: &str, port: u16) -> bool {
        if identifier.trim().is_empty() {
            return false;
        }

        let key = (channel.to_string(), url.to_string(), port);
        if let Some(existing) = self.subscriptions.get(&key) {
            existing.refcount.fetch_add(1, Ordering::SeqCst);
            return true;
        }

        let config = EndpointConfig {
            protocol: Protocol::Mqtt,
            url: url.to_string(),
            port,
            identifier: format!("monitor-{identifier}"),
            credentials: None,
        };
        let endpoint = match endpoint::create(&config) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(%channel, %url, port, %err, "failed to create monitoring endpoint");
                return false;
            }
        };

        let sink = Arc::new(AggregatorSink {
            aggregator: Arc::clone(&self.aggregator),
            channel: channel.to_string(),
        });
        if let Err(err) = endpoint.start_inbound(channel, sink).await {
            warn!(%channel, %url, port, %err, "failed to start monitoring subscription");
            return false;
        }

        self.subscriptions.insert(
            key,
            Arc::new(Subscription {
                endpoint,
                refcount: AtomicUsize::new(1),
            }),
        );
        info!(%channel, %url, port, "monitoring subscription opened");
        true
    }

    /// Decrement the refcount for `channel`'s subscription, tearing it
    /// down once it reaches zero. Returns `true` iff a subscription for
    /// `channel` existed.
    pub async fn remove_observable(&self, channel: &str) -> bool {
        let Some(key) = self
            .subscriptions
            .iter()
            .find(|entry| entry.key().0 == channel)
            .map(|entry| entry.key().clone())
        else {
            return false;
        };

        let should_tear_down = {
            let Some(subscription) = self.subscriptions.get(&key) else {
                return false;
            };
            subscription.refcount.fetch_sub(1, Ordering::SeqCst) == 1
        };

        if should_tear_down {
            if let Some((_, subscription)) = self.subscriptions.remove(&key) {
                subscription.endpoint.stop(1).await;
                info!(%channel, "monitoring subscription torn down");
            }
        }
        true
    }

    /// Number of distinct monitoring addresses currently subscribed.
    pub fn active_subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_pool() -> MonitoringSubscriberPool {
        MonitoringSubscriberPool::new(Arc::new(Aggregator::new(None).await.unwrap()))
    }

    #[tokio::test]
    async fn rejects_a_blank_identifier() {
        let pool = fresh_pool().await;
        assert!(!pool.add_observable("", "c1", "127.0.0.1", 1883).await);
    }

    #[tokio::test]
    async fn two_adds_for_the_same_address_share_one_subscription() {
        let pool = fresh_pool().await;
        assert!(pool.add_observable("e1", "c1", "127.0.0.1", 18830).await);
        assert!(pool.add_observable("e2", "c1", "127.0.0.1", 18830).await);
        assert_eq!(pool.active_subscription_count(), 1);
    }

    #[tokio::test]
    async fn remove_observable_on_an_unknown_channel_returns_false() {
        let pool = fresh_pool().await;
        assert!(!pool.remove_observable("never-added").await);
    }

    #[tokio::test]
    async fn refcount_reaches_zero_only_after_every_add_is_matched_by_a_remove() {
        let pool = fresh_pool().await;
        pool.add_observable("e1", "c2", "127.0.0.1", 18831).await;
        pool.add_observable("e2", "c2", "127.0.0.1", 18831).await;

        assert!(pool.remove_observable("c2").await);
        assert_eq!(pool.active_subscription_count(), 1);

        assert!(pool.remove_observable("c2").await);
        assert_eq!(pool.active_subscription_count(), 0);
    }
}
