//! The registration parser boundary.
//!
//! spec.md treats "the domain-specific-language parser that extracts
//! identification, runtime-data scope, and update address from a
//! registration payload" as an opaque external collaborator, specified
//! only at its interface (§1, §6). [`RegistrationParser`] is that
//! interface. [`LineProtocolParser`] is a small concrete implementation —
//! a `key=value` line format — so the crate is runnable end to end
//! without wiring in an external DSL engine.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::error::ParserError;
use super::types::{EntityDescription, MonitoringAddress};

/// Validates a raw registration payload and extracts an
/// [`EntityDescription`] from it.
///
/// Implementations are expected to be cheaply cloneable handles (an
/// `Arc`-wrapped client to an out-of-process parser, for example); the
/// registry calls through a shared reference, never owning the parser.
#[async_trait]
pub trait RegistrationParser: Send + Sync {
    /// Register a raw payload under `file_name`, returning the parser's
    /// own project identifier for it. Fails if the payload cannot be
    /// parsed at all.
    async fn add_model(&self, raw_payload: &str, file_name: &str) -> Result<String, ParserError>;

    /// Load a previously-added project and extract its
    /// [`EntityDescription`]. Fails with [`ParserError::MissingField`] if
    /// a required field is missing or out of range.
    async fn load_project(&self, project_name: &str) -> Result<EntityDescription, ParserError>;

    /// Best-effort removal of a project, used to roll back a
    /// `add_model` that succeeded when the subsequent `load_project`
    /// failed (spec.md §4.5 step 4).
    async fn remove(&self, project_name: &str);
}

#[derive(Debug, Default)]
struct ProjectRecord {
    fields: HashMap<String, String>,
}

/// Default `key=value` line-format registration parser.
///
/// Recognized keys: `identifier`, `host`, `port`, `monitoring`, `source`.
/// Lines are `key=value`; blank lines and lines starting with `#` are
/// ignored. `monitoring` must be a `channel@url:port` scope string (see
/// [`MonitoringAddress::parse`]).
#[derive(Debug, Default, Clone)]
pub struct LineProtocolParser {
    projects: Arc<Mutex<HashMap<String, ProjectRecord>>>,
}

impl LineProtocolParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_fields(raw_payload: &str) -> Result<HashMap<String, String>, ParserError> {
        let mut fields = HashMap::new();
        for line in raw_payload.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ParserError::Malformed(format!("line '{line}' is not a 'key=value' pair"))
            })?;
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
        if fields.is_empty() {
            return Err(ParserError::Malformed(
                "payload contains no 'key=value' lines".to_string(),
            ));
        }
        Ok(fields)
    }
}

#[async_trait]
impl RegistrationParser for LineProtocolParser {
    async fn add_model(&self, raw_payload: &str, file_name: &str) -> Result<String, ParserError> {
        let fields = Self::parse_fields(raw_payload)?;
        let project_name = format!("project-{file_name}");
        self.projects
            .lock()
            .insert(project_name.clone(), ProjectRecord { fields });
        Ok(project_name)
    }

    async fn load_project(&self, project_name: &str) -> Result<EntityDescription, ParserError> {
        let fields = self
            .projects
            .lock()
            .get(project_name)
            .map(|record| record.fields.clone())
            .ok_or_else(|| ParserError::NotFound(project_name.to_string()))?;

        let identifier = fields
            .get("identifier")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParserError::MissingField("identifier is missing".to_string()))?
            .clone();

        let host = fields
            .get("host")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParserError::MissingField("host is missing".to_string()))?
            .clone();

        let port: u16 = fields
            .get("port")
            .ok_or_else(|| ParserError::MissingField("port is missing".to_string()))?
            .parse()
            .map_err(|_| ParserError::MissingField("port is out of range".to_string()))?;

        let monitoring_scope = fields
            .get("monitoring")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParserError::MissingField("monitoring is missing".to_string()))?;
        let monitoring_address = MonitoringAddress::parse(monitoring_scope)
            .map_err(|err| ParserError::MissingField(err.to_string()))?;

        let source_ref = fields.get("source").cloned();

        Ok(EntityDescription {
            identifier,
            host,
            port,
            monitoring_address,
            source_ref,
        })
    }

    async fn remove(&self, project_name: &str) {
        self.projects.lock().remove(project_name);
    }
}
