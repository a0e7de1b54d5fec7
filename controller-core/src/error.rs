//! Crate-wide error type.
//!
//! Component-level errors (`EndpointError`, `QueueError`, `ReceiverError`,
//! `RegistryError`, ...) are focused `thiserror` enums; each converts into
//! [`ControllerError`] via `#[from]` so call sites that need to bubble an
//! error up through the lifecycle controller or the CLI can use `?`
//! without naming the originating component (the same layering the
//! teacher workspace uses between `BrokerError`/`MailboxError` and
//! `SystemError`).

use thiserror::Error;

use crate::endpoint::EndpointError;
use crate::queue::QueueError;
use crate::receiver::ReceiverError;
use crate::registry::RegistryError;

/// The seven error kinds surfaced by the control plane (spec.md §7).
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Malformed or inconsistent configuration. Fatal during setup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (bind/connect/dispatch).
    #[error("network error: {0}")]
    Network(String),

    /// Unsupported protocol tag or malformed addressing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload failed to parse, or a required field was missing/out of
    /// range.
    #[error("validation error: {0}")]
    Validation(String),

    /// An invalid lifecycle transition was attempted.
    #[error("invalid state transition: {0}")]
    State(String),

    /// The queue was closed while the caller was waiting.
    #[error("queue closed")]
    Closed,

    /// Filesystem I/O failure (model directory persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueueError> for ControllerError {
    fn from(_: QueueError) -> Self {
        ControllerError::Closed
    }
}

impl From<EndpointError> for ControllerError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::InvalidAddress(msg) => ControllerError::Config(msg),
            EndpointError::InvalidPort(port) => {
                ControllerError::Config(format!("port {port} is out of range"))
            }
            EndpointError::InvalidId(msg) => ControllerError::Config(msg),
            EndpointError::AlreadyRunning(channel) => {
                ControllerError::State(format!("channel '{channel}' already started"))
            }
            EndpointError::BindFailed(msg) => ControllerError::Network(msg),
            EndpointError::Transport(msg) => ControllerError::Network(msg),
            EndpointError::InvalidTransition(msg) => ControllerError::State(msg),
        }
    }
}

impl From<ReceiverError> for ControllerError {
    fn from(err: ReceiverError) -> Self {
        match err {
            ReceiverError::InvalidProtocol(tag) => {
                ControllerError::Protocol(format!("unrecognized protocol tag '{tag}'"))
            }
            ReceiverError::Endpoint(err) => err.into(),
            ReceiverError::StopFailed(msg) => ControllerError::State(msg),
        }
    }
}

impl From<RegistryError> for ControllerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Empty => ControllerError::Validation("empty payload".to_string()),
            RegistryError::Parse(msg) => ControllerError::Validation(msg),
            RegistryError::MissingField(field) => {
                ControllerError::Validation(format!("missing or invalid field: {field}"))
            }
            RegistryError::Io(err) => ControllerError::Io(err),
        }
    }
}
