//! Errors produced by the registration boundary.

use thiserror::Error;

/// Errors surfaced by [`super::ModelRegistry::ingest`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The raw registration payload was null or blank.
    #[error("registration payload is empty")]
    Empty,

    /// The external declarative parser rejected the payload outright.
    #[error("registration payload failed to parse: {0}")]
    Parse(String),

    /// A required [`super::EntityDescription`] field was missing or out
    /// of range. Carries which field, per spec.md §3's invariant.
    #[error("{0}")]
    MissingField(String),

    /// Persisting the accepted payload to `model.directory` failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a [`super::RegistrationParser`] implementation.
#[derive(Debug, Error, Clone)]
pub enum ParserError {
    /// The payload could not be parsed at all by this parser.
    #[error("malformed registration payload: {0}")]
    Malformed(String),

    /// A named project/model is not known to the parser.
    #[error("unknown project: {0}")]
    NotFound(String),

    /// A required field was missing once the project was loaded.
    #[error("{0}")]
    MissingField(String),
}

impl From<ParserError> for RegistryError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::Malformed(msg) => RegistryError::Parse(msg),
            ParserError::NotFound(msg) => RegistryError::Parse(msg),
            ParserError::MissingField(msg) => RegistryError::MissingField(msg),
        }
    }
}
