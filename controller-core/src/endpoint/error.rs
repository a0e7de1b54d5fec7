//! Errors produced by the [`super::Endpoint`] abstraction.

use thiserror::Error;

/// Errors surfaced by endpoint construction and operation (spec.md §4.1).
#[derive(Debug, Error, Clone)]
pub enum EndpointError {
    /// `create(config)` was given a blank address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// `create(config)` was given a port outside `[0, 65535]`.
    #[error("invalid port: {0}")]
    InvalidPort(i64),

    /// `create(config)` was given a blank identifier, or one containing
    /// characters outside `[0-9a-zA-Z]`.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// `start_inbound` was called twice for the same channel.
    #[error("channel already has an inbound subscription: {0}")]
    AlreadyRunning(String),

    /// The HTTP server could not bind its listening address.
    #[error("failed to bind: {0}")]
    BindFailed(String),

    /// A connect/dispatch failure during publish or delivery.
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation was attempted from a state that does not permit it
    /// (e.g. `stop` on a server that never started).
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
}
