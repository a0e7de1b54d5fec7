//! Data model shared by the registry and the registration parser boundary.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::error::RegistryError;

/// The address at which a registered entity publishes its runtime samples.
///
/// Parsed from a source string of the form `channel@url:port`: the *last*
/// `:` separates the port from everything before it, then the *first* `@`
/// in that remainder separates the channel (left) from the url (right).
/// Splitting on the last `:` first means a scheme-qualified url such as
/// `mqtt://broker.local:1883` parses correctly even though it contains its
/// own colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringAddress {
    pub url: String,
    pub port: u16,
    pub channel: String,
}

impl MonitoringAddress {
    /// Parse a `channel@url:port` scope string.
    pub fn parse(scope: &str) -> Result<Self, RegistryError> {
        let (url_and_channel, port_str) = scope.rsplit_once(':').ok_or_else(|| {
            RegistryError::MissingField(format!(
                "monitoring scope '{scope}' is missing a ':' port separator"
            ))
        })?;

        let (channel, url) = url_and_channel.split_once('@').ok_or_else(|| {
            RegistryError::MissingField(format!(
                "monitoring scope '{scope}' is missing an '@' channel separator"
            ))
        })?;

        if url.trim().is_empty() {
            return Err(RegistryError::MissingField(format!(
                "monitoring scope '{scope}' has a blank url"
            )));
        }
        if channel.trim().is_empty() {
            return Err(RegistryError::MissingField(format!(
                "monitoring scope '{scope}' has a blank channel"
            )));
        }
        let port: u16 = port_str.parse().map_err(|_| {
            RegistryError::MissingField(format!(
                "monitoring scope '{scope}' has an out-of-range port '{port_str}'"
            ))
        })?;

        Ok(MonitoringAddress {
            url: url.to_string(),
            port,
            channel: channel.to_string(),
        })
    }
}

/// Immutable, validated description of a registered entity (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescription {
    pub identifier: String,
    pub host: String,
    pub port: u16,
    pub monitoring_address: MonitoringAddress,
    pub source_ref: Option<String>,
}

/// An entry stored in the [`super::ModelRegistry`].
///
/// Never mutated after insertion; removed only by an explicit
/// deregistration path, which is out of scope for the current core
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub key: String,
    pub description: EntityDescription,
    pub project_name: String,
}

/// Emitted by [`super::ModelRegistry::ingest`] after a successful insert.
///
/// Consumed by the monitoring subscriber pool so that opening a
/// subscription is decoupled from the registry's own insert path (see the
/// REDESIGN FLAGS in spec.md §9 — this breaks the ingest/subscribe cycle
/// the original source has).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEvent {
    pub key: String,
    pub description: EntityDescription,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_scope() {
        let addr = MonitoringAddress::parse("temperature@10.0.0.5:1883").unwrap();
        assert_eq!(addr.channel, "temperature");
        assert_eq!(addr.url, "10.0.0.5");
        assert_eq!(addr.port, 1883);
    }

    #[test]
    fn url_containing_colons_splits_on_last_colon() {
        let addr = MonitoringAddress::parse("telemetry@mqtt://broker.local:1883").unwrap();
        assert_eq!(addr.channel, "telemetry");
        assert_eq!(addr.url, "mqtt://broker.local");
        assert_eq!(addr.port, 1883);
    }

    #[test]
    fn missing_at_sign_is_rejected() {
        let err = MonitoringAddress::parse("broker.local:1883").unwrap_err();
        assert!(matches!(err, RegistryError::MissingField(_)));
    }

    #[test]
    fn missing_colon_is_rejected() {
        let err = MonitoringAddress::parse("channel@broker.local").unwrap_err();
        assert!(matches!(err, RegistryError::MissingField(_)));
    }

    #[test]
    fn port_boundaries() {
        assert!(MonitoringAddress::parse("c@u:0").is_ok());
        assert!(MonitoringAddress::parse("c@u:65535").is_ok());
        assert!(MonitoringAddress::parse("c@u:65536").is_err());
        assert!(MonitoringAddress::parse("c@u:-1").is_err());
    }

    #[test]
    fn blank_channel_or_url_is_rejected() {
        assert!(MonitoringAddress::parse("@u:80").is_err());
        assert!(MonitoringAddress::parse("c@:80").is_err());
    }
}
