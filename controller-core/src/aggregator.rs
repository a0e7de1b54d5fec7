//! Per-channel running-sum aggregation and outbound republishing
//! (spec.md §4.6).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{error, warn};

// Layer 3: Internal module imports
use crate::endpoint::{self, Credentials, Endpoint, EndpointConfig, Protocol};
use crate::error::ControllerError;

/// Outbound target for aggregated results, mirroring the
/// `aggregation.*` configuration keys (spec.md §6).
#[derive(Debug, Clone)]
pub struct AggregationTarget {
    pub protocol_tag: String,
    pub url: String,
    pub port: u16,
    pub channel: String,
    pub credentials: Option<Credentials>,
}

/// Maintains one running sum per source channel and republishes the new
/// sum after each successfully parsed sample.
///
/// Per spec.md §5, `AggregationState` needs no external locking because
/// each channel is touched by exactly one propagator task and
/// [`DashMap`] supports concurrent insert/get across distinct channels
/// without a caller-visible lock.
pub struct Aggregator {
    state: DashMap<String, i64>,
    outbound: Option<Arc<dyn Endpoint>>,
    outbound_channel: Option<String>,
    torn_down: AtomicBool,
}

impl Aggregator {
    /// Construct the aggregator. `target` is `None` when configuration
    /// omits aggregation entirely (spec.md §4.6: "the Aggregator is a
    /// no-op sink"). There is no `ALREADY_SET_UP` failure mode here —
    /// the REDESIGN in spec.md §9 replaces the process-wide singleton
    /// with an explicit, once-constructed value owned by
    /// [`crate::context::ControllerContext`], making that error kind
    /// unreachable by construction.
    pub async fn new(target: Option<AggregationTarget>) -> Result<Self, ControllerError> {
        let (outbound, outbound_channel) = match target {
            Some(target) => {
                let protocol = Protocol::parse(&target.protocol_tag).ok_or_else(|| {
                    ControllerError::Protocol(format!(
                        "unrecognized aggregation protocol '{}'",
                        target.protocol_tag
                    ))
                })?;
                let config = EndpointConfig {
                    protocol,
                    url: target.url,
                    port: target.port,
                    identifier: "aggregation".to_string(),
                    credentials: target.credentials,
                };
                let endpoint = endpoint::create(&config)?;
                (Some(endpoint), Some(target.channel))
            }
            None => (None, None),
        };

        Ok(Self {
            state: DashMap::new(),
            outbound,
            outbound_channel,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Parse `payload` as a signed integer sample for `channel`, add it
    /// to that channel's running sum, and publish the new sum as decimal
    /// text on the outbound channel (if configured). Parse failures are
    /// logged and otherwise ignored (spec.md §9: stricter NACK semantics
    /// were considered and rejected — see DESIGN.md). Publish failures
    /// are logged but never roll back the state update.
    pub async fn on_sample(&self, channel: &str, payload: &[u8]) {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text.trim(),
            Err(_) => {
                warn!(%channel, "monitoring sample is not valid utf-8, ignoring");
                return;
            }
        };
        let value: i64 = match text.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(%channel, sample = %text, "monitoring sample is not an integer, ignoring");
                return;
            }
        };

        let mut sum = self.state.entry(channel.to_string()).or_insert(0);
        *sum += value;
        let new_sum = *sum;
        drop(sum);

        if let (Some(endpoint), Some(outbound_channel)) =
            (&self.outbound, &self.outbound_channel)
        {
            let body = Bytes::from(new_sum.to_string());
            if let Err(err) = endpoint
                .publish(outbound_channel, body, Duration::from_millis(1000))
                .await
            {
                error!(%channel, %err, "failed to publish aggregated sum");
            }
        }
    }

    /// Current running sum for `channel`, or `None` if no sample has
    /// been seen for it yet. Exposed for diagnostics and tests.
    pub fn current_sum(&self, channel: &str) -> Option<i64> {
        self.state.get(channel).map(|v| *v)
    }

    /// Release the outbound endpoint. Safe to call more than once.
    pub async fn tear_down(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(endpoint) = &self.outbound {
            endpoint.stop(1).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accumulates_a_running_sum_per_channel() {
        let aggregator = Aggregator::new(None).await.unwrap();
        for value in [1, 2, -3, -7, 32, 0, 0, 0, 18] {
            aggregator
                .on_sample("e1", value.to_string().as_bytes())
                .await;
        }
        assert_eq!(aggregator.current_sum("e1"), Some(43));
    }

    #[tokio::test]
    async fn malformed_samples_are_ignored_without_affecting_the_sum() {
        let aggregator = Aggregator::new(None).await.unwrap();
        aggregator.on_sample("e1", b"10").await;
        aggregator.on_sample("e1", b"not-a-number").await;
        aggregator.on_sample("e1", b"5").await;
        assert_eq!(aggregator.current_sum("e1"), Some(15));
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let aggregator = Aggregator::new(None).await.unwrap();
        aggregator.on_sample("e1", b"10").await;
        aggregator.on_sample("e2", b"-4").await;
        assert_eq!(aggregator.current_sum("e1"), Some(10));
        assert_eq!(aggregator.current_sum("e2"), Some(-4));
    }

    #[tokio::test]
    async fn tear_down_is_idempotent() {
        let aggregator = Aggregator::new(None).await.unwrap();
        aggregator.tear_down().await;
        aggregator.tear_down().await;
    }

    #[tokio::test]
    async fn rejects_an_unrecognized_aggregation_protocol() {
        let target = AggregationTarget {
            protocol_tag: "FOO".to_string(),
            url: "127.0.0.1".to_string(),
            port: 9000,
            channel: "/agg".to_string(),
            credentials: None,
        };
        let err = Aggregator::new(Some(target)).await.unwrap_err();
        assert!(matches!(err, ControllerError::Protocol(_)));
    }
}
