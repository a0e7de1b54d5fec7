//! Configuration file parsing (spec.md §6).
//!
//! Mirrors the teacher workspace's `SystemConfig` pattern: a plain data
//! struct, a [`Default`] impl holding every documented default, and a
//! fallible [`ControllerConfig::validate`]. Values that can be silently
//! corrected produce a [`ConfigWarning`] instead of failing; values that
//! cannot abort parsing with a [`ControllerError::Config`].

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Layer 2: Third-party crate imports
// (none beyond std for this module)

// Layer 3: Internal module imports
use crate::endpoint::Protocol;
use crate::error::ControllerError;

/// A defaulted-value or silently-corrected-value notice, deferred until
/// logging is initialized (spec.md §6: "deferred warning").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning(pub String);

/// `s`/`n` toggle for the two logging channels (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Stdout,
    None,
}

impl LogSink {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "s" => Some(LogSink::Stdout),
            "n" => Some(LogSink::None),
            _ => None,
        }
    }
}

/// A reception or outbound address plus its protocol, shared shape for
/// `registration.*` and `aggregation.*` (spec.md §6).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub protocol_tag: String,
    pub url: String,
    pub port: u16,
    pub channel: String,
}

/// Fully validated, defaulted configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub logging_standard: LogSink,
    pub logging_debug: LogSink,
    pub registration: ChannelConfig,
    pub model_directory: PathBuf,
    pub aggregation: Option<ChannelConfig>,
    /// Inbound update/command channel. Not named in spec.md §6's
    /// configuration table (which only documents `registration.*` and
    /// `aggregation.*`), but the Software Updater / Command Sender
    /// component spec.md §2 and §4.8 describe needs a reception address
    /// exactly like the other two receivers; `update.*` follows
    /// `aggregation.*`'s all-four-or-none pattern.
    pub update: Option<ChannelConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            logging_standard: LogSink::Stdout,
            logging_debug: LogSink::None,
            registration: ChannelConfig {
                protocol_tag: "HTTP".to_string(),
                url: "127.0.0.1".to_string(),
                port: 80,
                channel: "/registration".to_string(),
            },
            model_directory: PathBuf::from("./models"),
            aggregation: None,
            update: None,
        }
    }
}

impl ControllerConfig {
    /// Parse `key=value` lines read from a configuration file. An empty
    /// or absent file (`raw` is `""`) yields [`ControllerConfig::default`]
    /// untouched (spec.md §6: "Absent or empty -> system uses defaults").
    pub fn parse(raw: &str) -> Result<(Self, Vec<ConfigWarning>), ControllerError> {
        let fields = parse_fields(raw);
        let mut warnings = Vec::new();
        let mut config = Self::default();

        if let Some(value) = fields.get("logging.standard") {
            config.logging_standard = LogSink::parse(value).ok_or_else(|| {
                ControllerError::Config(format!("logging.standard: invalid value '{value}'"))
            })?;
        } else {
            warnings.push(ConfigWarning(
                "logging.standard not set, defaulting to 's'".to_string(),
            ));
        }

        if let Some(value) = fields.get("logging.debug") {
            config.logging_debug = LogSink::parse(value).ok_or_else(|| {
                ControllerError::Config(format!("logging.debug: invalid value '{value}'"))
            })?;
        } else {
            warnings.push(ConfigWarning(
                "logging.debug not set, defaulting to 'n'".to_string(),
            ));
        }

        config.registration = parse_channel_config(
            &fields,
            "registration",
            &config.registration,
            &mut warnings,
        )?;

        if let Some(value) = fields.get("model.directory") {
            config.model_directory = PathBuf::from(value);
        } else {
            warnings.push(ConfigWarning(
                "model.directory not set, defaulting to './models'".to_string(),
            ));
        }
        std::fs::create_dir_all(&config.model_directory).map_err(|err| {
            ControllerError::Config(format!(
                "model.directory '{}' does not exist and could not be created: {err}",
                config.model_directory.display()
            ))
        })?;

        config.aggregation = parse_optional_channel_config(&fields, "aggregation", &mut warnings)?;
        config.update = parse_optional_channel_config(&fields, "update", &mut warnings)?;

        Ok((config, warnings))
    }
}

fn parse_fields(raw: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    fields
}

fn parse_channel_config(
    fields: &HashMap<String, String>,
    prefix: &str,
    default: &ChannelConfig,
    warnings: &mut Vec<ConfigWarning>,
) -> Result<ChannelConfig, ControllerError> {
    let protocol_tag = fields
        .get(&format!("{prefix}.protocol"))
        .cloned()
        .unwrap_or_else(|| {
            warnings.push(ConfigWarning(format!(
                "{prefix}.protocol not set, defaulting to '{}'",
                default.protocol_tag
            )));
            default.protocol_tag.clone()
        });
    if Protocol::parse(&protocol_tag).is_none() {
        return Err(ControllerError::Config(format!(
            "{prefix}.protocol: unrecognized protocol '{protocol_tag}'"
        )));
    }

    let url = fields
        .get(&format!("{prefix}.url"))
        .cloned()
        .unwrap_or_else(|| {
            warnings.push(ConfigWarning(format!(
                "{prefix}.url not set, defaulting to '{}'",
                default.url
            )));
            default.url.clone()
        });

    let port = match fields.get(&format!("{prefix}.port")) {
        Some(value) => parse_port(prefix, value)?,
        None => {
            warnings.push(ConfigWarning(format!(
                "{prefix}.port not set, defaulting to {}",
                default.port
            )));
            default.port
        }
    };

    let raw_channel = fields
        .get(&format!("{prefix}.channel"))
        .cloned()
        .unwrap_or_else(|| {
            warnings.push(ConfigWarning(format!(
                "{prefix}.channel not set, defaulting to '{}'",
                default.channel
            )));
            default.channel.clone()
        });
    let channel = normalize_channel(prefix, &protocol_tag, &raw_channel, warnings);

    Ok(ChannelConfig {
        protocol_tag,
        url,
        port,
        channel,
    })
}

/// Parse an all-four-or-none optional channel block (`aggregation.*` and,
/// by analogy, `update.*` — see [`ControllerConfig::update`]).
fn parse_optional_channel_config(
    fields: &HashMap<String, String>,
    prefix: &str,
    warnings: &mut Vec<ConfigWarning>,
) -> Result<Option<ChannelConfig>, ControllerError> {
    let keys = [
        format!("{prefix}.protocol"),
        format!("{prefix}.url"),
        format!("{prefix}.port"),
        format!("{prefix}.channel"),
    ];
    let present_count = keys.iter().filter(|k| fields.contains_key(*k)).count();

    if present_count == 0 {
        return Ok(None);
    }
    if present_count != keys.len() {
        return Err(ControllerError::Config(format!(
            "{prefix}.{{protocol,url,port,channel}} must all be set together or not at all"
        )));
    }

    let protocol_tag = fields[&keys[0]].clone();
    if Protocol::parse(&protocol_tag).is_none() {
        return Err(ControllerError::Config(format!(
            "{prefix}.protocol: unrecognized protocol '{protocol_tag}'"
        )));
    }
    let url = fields[&keys[1]].clone();
    let port = parse_port(prefix, &fields[&keys[2]])?;
    let raw_channel = fields[&keys[3]].clone();
    let channel = normalize_channel(prefix, &protocol_tag, &raw_channel, warnings);

    Ok(Some(ChannelConfig {
        protocol_tag,
        url,
        port,
        channel,
    }))
}

fn parse_port(prefix: &str, value: &str) -> Result<u16, ControllerError> {
    let parsed: i64 = value
        .parse()
        .map_err(|_| ControllerError::Config(format!("{prefix}.port: '{value}' is not a number")))?;
    u16::try_from(parsed)
        .map_err(|_| ControllerError::Config(format!("{prefix}.port: {parsed} is out of range [0, 65535]")))
}

/// Apply spec.md §6's channel-prefix normalization: HTTP paths are
/// auto-prepended with `/`; MQTT topics have a leading `/` auto-stripped.
/// Either correction is silent at this layer and surfaced as a deferred
/// warning.
fn normalize_channel(
    prefix: &str,
    protocol_tag: &str,
    raw_channel: &str,
    warnings: &mut Vec<ConfigWarning>,
) -> String {
    match Protocol::parse(protocol_tag) {
        Some(Protocol::Http) if !raw_channel.starts_with('/') => {
            warnings.push(ConfigWarning(format!(
                "{prefix}.channel '{raw_channel}' does not start with '/', prepending it"
            )));
            format!("/{raw_channel}")
        }
        Some(Protocol::Mqtt) if raw_channel.starts_with('/') => {
            warnings.push(ConfigWarning(format!(
                "{prefix}.channel '{raw_channel}' starts with '/', stripping it for MQTT"
            )));
            raw_channel.trim_start_matches('/').to_string()
        }
        _ => raw_channel.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let (config, warnings) = ControllerConfig::parse("").unwrap();
        assert_eq!(config.registration.protocol_tag, "HTTP");
        assert_eq!(config.registration.channel, "/registration");
        assert!(!warnings.is_empty());
    }

    #[test]
    fn unknown_protocol_aborts() {
        let err = ControllerConfig::parse("registration.protocol=FOO\n").unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[test]
    fn http_channel_without_leading_slash_is_corrected_with_a_warning() {
        let (config, warnings) =
            ControllerConfig::parse("registration.protocol=HTTP\nregistration.channel=foo\n")
                .unwrap();
        assert_eq!(config.registration.channel, "/foo");
        assert!(warnings
            .iter()
            .any(|w| w.0.contains("registration.channel")));
    }

    #[test]
    fn mqtt_channel_with_leading_slash_is_stripped() {
        let (config, _warnings) =
            ControllerConfig::parse("registration.protocol=MQTT\nregistration.channel=/foo\n")
                .unwrap();
        assert_eq!(config.registration.channel, "foo");
    }

    #[test]
    fn partial_aggregation_config_aborts() {
        let err = ControllerConfig::parse("aggregation.protocol=MQTT\n").unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[test]
    fn complete_aggregation_config_is_accepted() {
        let (config, _warnings) = ControllerConfig::parse(
            "aggregation.protocol=MQTT\naggregation.url=127.0.0.1\naggregation.port=1883\naggregation.channel=devoptaggregation\n",
        )
        .unwrap();
        assert!(config.aggregation.is_some());
        assert_eq!(config.aggregation.unwrap().channel, "devoptaggregation");
    }

    #[test]
    fn port_out_of_range_aborts() {
        let err = ControllerConfig::parse("registration.port=70000\n").unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[test]
    fn port_boundaries_are_accepted() {
        assert!(ControllerConfig::parse("registration.port=0\n").is_ok());
        assert!(ControllerConfig::parse("registration.port=65535\n").is_ok());
    }
}
