//! The embedded-HTTP-server / pooled-HTTP-client [`Endpoint`] variant.
//!
//! spec.md §4.1 describes `startInbound` for HTTP as "registers a path
//! context on an already-bound server" — a single listener accepts path
//! contexts registered by potentially more than one [`HttpEndpoint`]
//! instance sharing the same bind address (registration, monitoring and
//! update receivers can all bind `127.0.0.1:80`, say, each owning a
//! distinct path). [`HttpListenerPool`] is the shared listener registry
//! that makes that possible without rebuilding an `axum::Router` on every
//! `startInbound` call: a single wildcard route dispatches to whichever
//! sink is registered for the request's path at the time it arrives.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

// Layer 3: Internal module imports
use super::error::EndpointError;
use super::traits::{Endpoint, EndpointConfig, InboundSink};

/// Default timeout applied to outbound POSTs when the caller does not
/// override it, per spec.md §6 ("HTTP clients use POST with a 1000 ms
/// default timeout").
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(1000);

/// One registered path context: the sink payloads are delivered to, plus
/// which [`HttpEndpoint`] owns it (so `stop` only tears down its own
/// contexts, never a sibling's).
struct PathContext {
    owner_id: String,
    sink: Arc<dyn InboundSink>,
}

/// A single bound HTTP listener, shared by every [`HttpEndpoint`] whose
/// `(url, port)` is the same bind target.
struct HttpListener {
    paths: Arc<DashMap<String, PathContext>>,
    shutdown: Arc<Notify>,
}

impl HttpListener {
    /// `bind_target` is a `host:port` string, resolved by
    /// [`TcpListener::bind`] itself — it accepts a literal IP just as
    /// readily as a DNS hostname, so no separate resolution step is
    /// needed here.
    async fn bind(bind_target: &str) -> Result<Self, EndpointError> {
        let paths: Arc<DashMap<String, PathContext>> = Arc::new(DashMap::new());
        let listener = TcpListener::bind(bind_target)
            .await
            .map_err(|err| EndpointError::BindFailed(format!("{bind_target}: {err}")))?;

        let app_state = Arc::clone(&paths);
        let router = Router::new()
            .route("/{*path}", post(dispatch))
            .route("/", post(dispatch_root))
            .with_state(app_state);

        let shutdown = Arc::new(Notify::new());
        let shutdown_signal = Arc::clone(&shutdown);
        let addr = bind_target.to_string();
        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                shutdown_signal.notified().await;
            });
            if let Err(err) = server.await {
                warn!(%addr, error = %err, "http listener exited with an error");
            }
        });

        info!(%bind_target, "http listener bound");
        Ok(Self { paths, shutdown })
    }

    fn register(
        &self,
        path: &str,
        owner_id: &str,
        sink: Arc<dyn InboundSink>,
    ) -> Result<(), EndpointError> {
        if self.paths.contains_key(path) {
            return Err(EndpointError::AlreadyRunning(path.to_string()));
        }
        self.paths.insert(
            path.to_string(),
            PathContext {
                owner_id: owner_id.to_string(),
                sink,
            },
        );
        Ok(())
    }

    /// Remove every context owned by `owner_id`. Returns `true` if the
    /// listener now has no registered contexts left, in which case the
    /// caller should shut the underlying socket down.
    fn release(&self, owner_id: &str) -> bool {
        self.paths.retain(|_, ctx| ctx.owner_id != owner_id);
        self.paths.is_empty()
    }

    fn shut_down(&self) {
        self.shutdown.notify_waiters();
    }
}

async fn dispatch_root(
    State(paths): State<Arc<DashMap<String, PathContext>>>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    dispatch_to("/", &paths, body).await
}

async fn dispatch(
    State(paths): State<Arc<DashMap<String, PathContext>>>,
    Path(path): Path<String>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let full_path = format!("/{path}");
    dispatch_to(&full_path, &paths, body).await
}

async fn dispatch_to(
    path: &str,
    paths: &DashMap<String, PathContext>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let Some(ctx) = paths.get(path) else {
        return (StatusCode::NOT_FOUND, "no context registered for this path");
    };
    let sink = Arc::clone(&ctx.sink);
    drop(ctx);
    match sink.deliver(body).await {
        Ok(()) => (StatusCode::OK, "Registration received"),
        Err(err) => {
            warn!(%path, error = %err, "inbound delivery failed");
            (StatusCode::BAD_REQUEST, "delivery failed")
        }
    }
}

/// `(host, port)` identifies a bind target without requiring it to have
/// been resolved to an `IpAddr` up front (spec.md §3: `host` is "text
/// URL/IP", hostnames included).
type ListenKey = (String, u16);

/// Process-wide listener pool, keyed by bind address. Bind-once, register-
/// many: a second [`HttpEndpoint`] on the same address reuses the listener
/// already bound by the first.
static LISTENER_POOL: OnceLock<DashMap<ListenKey, Arc<HttpListener>>> = OnceLock::new();

fn listener_pool() -> &'static DashMap<ListenKey, Arc<HttpListener>> {
    LISTENER_POOL.get_or_init(DashMap::new)
}

/// Process-wide pooled outbound client, built lazily on first use (the
/// REDESIGN note in spec.md §9: "replace per-recipient HTTP client with a
/// pooled client").
static OUTBOUND_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn outbound_client() -> &'static reqwest::Client {
    OUTBOUND_CLIENT.get_or_init(reqwest::Client::new)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpState {
    Initialized,
    Running,
    Stopped,
}

/// The HTTP variant of [`Endpoint`] (spec.md §4.1).
///
/// Inbound delivery is backed by a shared [`HttpListener`] from
/// [`listener_pool`]; outbound publish uses the shared [`outbound_client`].
pub struct HttpEndpoint {
    identifier: String,
    host: String,
    port: u16,
    state: Mutex<HttpState>,
}

impl HttpEndpoint {
    pub fn new(config: &EndpointConfig) -> Result<Self, EndpointError> {
        config.validate()?;
        Ok(Self {
            identifier: config.identifier.clone(),
            host: config.url.clone(),
            port: config.port,
            state: Mutex::new(HttpState::Initialized),
        })
    }

    fn key(&self) -> ListenKey {
        (self.host.clone(), self.port)
    }

    fn bind_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn listener_for(&self) -> Option<Arc<HttpListener>> {
        listener_pool().get(&self.key()).map(|entry| Arc::clone(&entry))
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn start_inbound(
        &self,
        channel: &str,
        sink: Arc<dyn InboundSink>,
    ) -> Result<(), EndpointError> {
        {
            let mut state = self.state.lock();
            if *state != HttpState::Initialized {
                return Err(EndpointError::InvalidTransition(
                    "start_inbound requires an INITIALIZED endpoint".to_string(),
                ));
            }
            *state = HttpState::Running;
        }

        let listener = match listener_pool().entry(self.key()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Arc::clone(entry.get()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let listener = Arc::new(HttpListener::bind(&self.bind_target()).await?);
                entry.insert(Arc::clone(&listener));
                listener
            }
        };

        listener.register(channel, &self.identifier, sink)?;
        Ok(())
    }

    async fn publish(
        &self,
        channel: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Option<Bytes>, EndpointError> {
        let url = format!("http://{}:{}{}", self.host, self.port, channel);
        let response = outbound_client()
            .post(&url)
            .timeout(timeout)
            .body(payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let body = resp
                    .bytes()
                    .await
                    .map_err(|err| EndpointError::Transport(err.to_string()))?;
                Ok(Some(body))
            }
            Err(err) if err.is_timeout() => Ok(None),
            Err(err) => Err(EndpointError::Transport(err.to_string())),
        }
    }

    async fn stop(&self, grace_seconds: u64) {
        {
            let mut state = self.state.lock();
            if *state != HttpState::Running {
                return;
            }
            *state = HttpState::Stopped;
        }

        tokio::time::sleep(Duration::from_secs(grace_seconds)).await;

        if let Some(listener) = self.listener_for() {
            let empty = listener.release(&self.identifier);
            if empty {
                listener.shut_down();
                listener_pool().remove(&self.key());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::traits::Protocol;
    use crate::queue::Queue;

    fn config(port: u16, identifier: &str) -> EndpointConfig {
        EndpointConfig {
            protocol: Protocol::Http,
            url: "127.0.0.1".to_string(),
            port,
            identifier: identifier.to_string(),
            credentials: None,
        }
    }

    #[tokio::test]
    async fn start_inbound_twice_on_same_channel_fails() {
        let endpoint = HttpEndpoint::new(&config(18080, "ep1")).unwrap();
        let sink: Arc<dyn InboundSink> = Arc::new(Queue::<Bytes>::new(4));
        endpoint.start_inbound("/reg", Arc::clone(&sink)).await.unwrap();
        let err = endpoint.start_inbound("/other", sink).await.unwrap_err();
        assert!(matches!(err, EndpointError::InvalidTransition(_)));
        endpoint.stop(1).await;
    }

    #[tokio::test]
    async fn delivers_posted_body_to_registered_sink() {
        let endpoint = HttpEndpoint::new(&config(18081, "ep2")).unwrap();
        let queue = Arc::new(Queue::<Bytes>::new(4));
        let sink: Arc<dyn InboundSink> = queue.clone();
        endpoint.start_inbound("/reg", sink).await.unwrap();

        // `start_inbound` only returns once the socket is bound and the
        // path registered, so the request can go out immediately: the
        // listen backlog accepts the handshake even before the spawned
        // `axum::serve` task reaches its first `accept`.
        let client = reqwest::Client::new();
        let resp = client
            .post("http://127.0.0.1:18081/reg")
            .body("hello")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let delivered = queue.remove().await.unwrap();
        assert_eq!(&delivered[..], b"hello");
        endpoint.stop(1).await;
    }

    #[test]
    fn new_accepts_a_dns_hostname_instead_of_a_literal_ip() {
        let config = EndpointConfig {
            protocol: Protocol::Http,
            url: "entity-7.internal.example".to_string(),
            port: 9000,
            identifier: "ep4".to_string(),
            credentials: None,
        };
        let endpoint = HttpEndpoint::new(&config).unwrap();
        assert_eq!(endpoint.host, "entity-7.internal.example");
    }

    #[tokio::test]
    async fn unregistered_path_returns_404() {
        let endpoint = HttpEndpoint::new(&config(18082, "ep3")).unwrap();
        let sink: Arc<dyn InboundSink> = Arc::new(Queue::<Bytes>::new(4));
        endpoint.start_inbound("/reg", sink).await.unwrap();

        let client = reqwest::Client::new();
        let resp = client
            .post("http://127.0.0.1:18082/nope")
            .body("hi")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        endpoint.stop(1).await;
    }
}
