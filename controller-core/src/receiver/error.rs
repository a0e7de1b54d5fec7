//! Errors produced by the [`super::Receiver`] composition.

use thiserror::Error;

use crate::endpoint::EndpointError;

/// Errors surfaced by [`super::Receiver::new`], `start` and `stop`.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// `new` was given a protocol tag outside `{http, mqtt}`.
    #[error("unrecognized protocol tag: {0}")]
    InvalidProtocol(String),

    /// The underlying endpoint failed during construction or start.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// `stop` failed; carries the first sub-error encountered.
    #[error("stop failed: {0}")]
    StopFailed(String),
}
