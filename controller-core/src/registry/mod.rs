//! The model registry (spec.md §4.5).
//!
//! Stores validated [`EntityDescription`]s keyed by an arrival-time stamp.
//! `ingest` is the only mutator; everything else is a read. Concurrent
//! `ingest` calls are serialized by the registry itself (spec.md §4.5,
//! "Concurrency"); reads never block behind a writer for more than the
//! duration of a state swap (spec.md §5).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{info, warn};

mod error;
mod parser;
mod types;

pub use error::{ParserError, RegistryError};
pub use parser::{LineProtocolParser, RegistrationParser};
pub use types::{EntityDescription, MonitoringAddress, RegistrationEvent, RegistryEntry};

/// Buffer depth for the registration-event channel fed to the monitoring
/// subscriber pool. A slow consumer applies back-pressure to `ingest`
/// itself, which is an acceptable coupling point since registrations are
/// rare compared to monitoring samples.
const REGISTRATION_EVENT_BUFFER: usize = 256;

struct RegistryState {
    by_key: HashMap<String, Arc<RegistryEntry>>,
    order: Vec<String>,
}

/// Generates monotonically increasing, millisecond-timestamp-derived keys,
/// with a tiebreak suffix when two `ingest` calls land in the same
/// millisecond (spec.md §3, "key ... millisecond timestamp with
/// tiebreak").
struct KeyGenerator {
    last_millis: i64,
    seq: u32,
}

impl KeyGenerator {
    fn new() -> Self {
        Self {
            last_millis: 0,
            seq: 0,
        }
    }

    fn next(&mut self) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        if now > self.last_millis {
            self.last_millis = now;
            self.seq = 0;
            now.to_string()
        } else {
            self.seq += 1;
            format!("{}-{}", self.last_millis, self.seq)
        }
    }
}

/// Process-wide (one per controller) registry of accepted entity
/// registrations.
pub struct ModelRegistry {
    parser: Arc<dyn RegistrationParser>,
    model_directory: PathBuf,
    state: RwLock<RegistryState>,
    ingest_lock: AsyncMutex<KeyGenerator>,
    events: mpsc::Sender<RegistrationEvent>,
}

impl ModelRegistry {
    /// Create an empty registry backed by `parser`, persisting accepted
    /// payloads under `model_directory` (created if it does not already
    /// exist). Returns the registry plus the receiving end of its
    /// registration-event stream.
    pub fn new(
        parser: Arc<dyn RegistrationParser>,
        model_directory: PathBuf,
    ) -> Result<(Self, mpsc::Receiver<RegistrationEvent>), RegistryError> {
        std::fs::create_dir_all(&model_directory)?;
        let (tx, rx) = mpsc::channel(REGISTRATION_EVENT_BUFFER);
        let registry = Self {
            parser,
            model_directory,
            state: RwLock::new(RegistryState {
                by_key: HashMap::new(),
                order: Vec::new(),
            }),
            ingest_lock: AsyncMutex::new(KeyGenerator::new()),
            events: tx,
        };
        Ok((registry, rx))
    }

    /// Validate and store a raw registration payload. See spec.md §4.5 for
    /// the exact step sequence this follows.
    pub async fn ingest(&self, raw_payload: &str) -> Result<RegistryEntry, RegistryError> {
        if raw_payload.trim().is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut key_gen = self.ingest_lock.lock().await;
        let file_name = key_gen.next();
        // Key generation only needs the lock; release it before the
        // (potentially slow) parser round trips so unrelated ingests are
        // not serialized behind them.
        drop(key_gen);

        let project_name = self
            .parser
            .add_model(raw_payload, &file_name)
            .await
            .map_err(RegistryError::from)?;

        let description = match self.parser.load_project(&project_name).await {
            Ok(description) => description,
            Err(err) => {
                self.parser.remove(&project_name).await;
                return Err(RegistryError::from(err));
            }
        };

        if let Err(io_err) = self.persist(&file_name, raw_payload).await {
            self.parser.remove(&project_name).await;
            return Err(RegistryError::from(io_err));
        }

        let entry = Arc::new(RegistryEntry {
            key: file_name.clone(),
            description: description.clone(),
            project_name,
        });

        {
            let mut state = self.state.write();
            state.by_key.insert(file_name.clone(), Arc::clone(&entry));
            state.order.push(file_name.clone());
        }

        info!(key = %file_name, identifier = %description.identifier, "entity registered");

        if self
            .events
            .send(RegistrationEvent {
                key: file_name,
                description,
            })
            .await
            .is_err()
        {
            warn!("registration event dropped: no subscriber pool listening");
        }

        Ok((*entry).clone())
    }

    async fn persist(&self, file_name: &str, raw_payload: &str) -> std::io::Result<()> {
        let path = self.model_directory.join(file_name);
        tokio::fs::write(path, raw_payload).await
    }

    /// Number of registered entities.
    pub fn count(&self) -> usize {
        self.state.read().order.len()
    }

    /// Look up an entry by its registry key.
    pub fn get_by_key(&self, key: &str) -> Option<RegistryEntry> {
        self.state.read().by_key.get(key).map(|e| (**e).clone())
    }

    /// Look up an entry by arrival-order index.
    pub fn get_by_index(&self, index: usize) -> Option<RegistryEntry> {
        let state = self.state.read();
        state
            .order
            .get(index)
            .and_then(|key| state.by_key.get(key))
            .map(|e| (**e).clone())
    }

    /// Registry keys in arrival order.
    pub fn keys(&self) -> Vec<String> {
        self.state.read().order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str, channel: &str) -> String {
        format!(
            "identifier={id}\nhost=10.0.0.1\nport=9000\nmonitoring={channel}@10.0.0.2:1883\n"
        )
    }

    async fn fresh_registry() -> (ModelRegistry, mpsc::Receiver<RegistrationEvent>, tempfile::TempDir)
    {
        let dir = tempfile::tempdir().unwrap();
        let parser = Arc::new(LineProtocolParser::new());
        let (registry, rx) = ModelRegistry::new(parser, dir.path().to_path_buf()).unwrap();
        (registry, rx, dir)
    }

    #[tokio::test]
    async fn ingest_rejects_blank_payload() {
        let (registry, _rx, _dir) = fresh_registry().await;
        assert!(matches!(
            registry.ingest("   ").await,
            Err(RegistryError::Empty)
        ));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn ingest_rejects_malformed_payload_and_count_is_unchanged() {
        let (registry, _rx, _dir) = fresh_registry().await;
        assert!(registry.ingest("not a model").await.is_err());
        assert_eq!(registry.count(), 0);

        let entry = registry.ingest(&payload("e1", "c1")).await.unwrap();
        assert_eq!(entry.description.identifier, "e1");
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn successful_ingest_increments_count_and_is_retrievable_by_key() {
        let (registry, mut rx, _dir) = fresh_registry().await;
        let entry = registry.ingest(&payload("e1", "c1")).await.unwrap();
        assert_eq!(registry.count(), 1);

        let fetched = registry.get_by_key(&entry.key).unwrap();
        assert_eq!(fetched.project_name, entry.project_name);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, entry.key);
        assert_eq!(event.description.identifier, "e1");
    }

    #[tokio::test]
    async fn keys_preserve_arrival_order() {
        let (registry, _rx, _dir) = fresh_registry().await;
        registry.ingest(&payload("e1", "c1")).await.unwrap();
        registry.ingest(&payload("e2", "c2")).await.unwrap();
        registry.ingest(&payload("e3", "c3")).await.unwrap();

        let keys = registry.keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(registry.get_by_index(0).unwrap().description.identifier, "e1");
        assert_eq!(registry.get_by_index(1).unwrap().description.identifier, "e2");
        assert_eq!(registry.get_by_index(2).unwrap().description.identifier, "e3");
    }

    #[tokio::test]
    async fn persists_raw_payload_under_model_directory() {
        let (registry, _rx, dir) = fresh_registry().await;
        let entry = registry.ingest(&payload("e1", "c1")).await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join(&entry.key))
            .await
            .unwrap();
        assert!(contents.contains("identifier=e1"));
    }

    #[tokio::test]
    async fn concurrent_ingest_calls_each_get_a_unique_key() {
        let (registry, _rx, _dir) = fresh_registry().await;
        let registry = Arc::new(registry);
        let mut handles = Vec::new();
        for i in 0..20 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .ingest(&payload(&format!("e{i}"), &format!("c{i}")))
                    .await
                    .unwrap()
            }));
        }
        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap().key);
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 20);
        assert_eq!(registry.count(), 20);
    }
}
