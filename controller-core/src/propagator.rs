//! The single-consumer queue-drain worker (spec.md §4.3).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

// Layer 3: Internal module imports
use crate::queue::Queue;

/// A consumer registered with a [`Propagator`]; receives every element
/// drained from the associated [`Queue`] in registration order.
#[async_trait]
pub trait Sink<T>: Send + Sync {
    async fn accept(&self, item: T) -> Result<(), String>;
}

/// Drains a [`Queue`] on its own task, fanning each element out to every
/// registered [`Sink`] in registration order.
///
/// Sinks may be registered before [`Propagator::spawn`] runs, or while it
/// is already running — a sink added mid-drain takes effect starting with
/// the next element (spec.md §4.3). A sink that errors is logged and
/// skipped; it never blocks delivery to the remaining sinks.
pub struct Propagator<T> {
    queue: Arc<Queue<T>>,
    sinks: RwLock<Vec<Arc<dyn Sink<T>>>>,
}

impl<T> Propagator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(queue: Arc<Queue<T>>) -> Self {
        Self {
            queue,
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Register a sink. Order of registration is the order sinks are
    /// invoked for every subsequently drained element.
    pub fn register(&self, sink: Arc<dyn Sink<T>>) {
        self.sinks.write().push(sink);
    }

    /// Spawn the drain loop as its own task. The returned handle completes
    /// once the queue's terminal marker is observed.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let Some(item) = self.queue.remove().await else {
                    break;
                };
                let sinks = self.sinks.read().clone();
                for sink in sinks {
                    if let Err(err) = sink.accept(item.clone()).await {
                        warn!(error = %err, "sink rejected a propagated element");
                    }
                }
            }
        })
    }
}
