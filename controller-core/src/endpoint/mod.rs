//! Protocol-neutral network boundary (spec.md §4.1).
//!
//! [`create`] is the only public constructor; callers never name
//! [`http::HttpEndpoint`] or [`mqtt::MqttEndpoint`] directly, matching the
//! way the teacher workspace hides `mailbox`/`broker` transport variants
//! behind a single factory.

mod error;
mod http;
mod mqtt;
mod traits;

use std::sync::Arc;

pub use error::EndpointError;
pub use http::DEFAULT_PUBLISH_TIMEOUT;
pub use traits::{Credentials, Endpoint, EndpointConfig, InboundSink, Protocol};

/// Build an unstarted [`Endpoint`] for `config.protocol`.
///
/// Validates `config` first (spec.md §4.1's `INVALID_ADDRESS` /
/// `INVALID_PORT` / `INVALID_ID` failure modes), then dispatches to the
/// matching transport implementation.
pub fn create(config: &EndpointConfig) -> Result<Arc<dyn Endpoint>, EndpointError> {
    config.validate()?;
    match config.protocol {
        Protocol::Http => Ok(Arc::new(http::HttpEndpoint::new(config)?)),
        Protocol::Mqtt => Ok(Arc::new(mqtt::MqttEndpoint::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_a_blank_url() {
        let config = EndpointConfig {
            protocol: Protocol::Http,
            url: String::new(),
            port: 8080,
            identifier: "ep".to_string(),
            credentials: None,
        };
        assert!(matches!(
            create(&config),
            Err(EndpointError::InvalidAddress(_))
        ));
    }

    #[test]
    fn create_rejects_a_malformed_identifier() {
        let config = EndpointConfig {
            protocol: Protocol::Http,
            url: "127.0.0.1".to_string(),
            port: 8080,
            identifier: "not valid!".to_string(),
            credentials: None,
        };
        assert!(matches!(create(&config), Err(EndpointError::InvalidId(_))));
    }

    #[test]
    fn create_builds_an_http_endpoint_for_a_valid_config() {
        let config = EndpointConfig {
            protocol: Protocol::Http,
            url: "127.0.0.1".to_string(),
            port: 18090,
            identifier: "ep".to_string(),
            credentials: None,
        };
        assert!(create(&config).is_ok());
    }
}
