//! Error type for [`super::Queue`] operations.

use thiserror::Error;

/// Errors produced by [`super::Queue::add`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed, either before the call started or while the
    /// caller was blocked waiting for space.
    #[error("queue is closed")]
    Closed,
}
