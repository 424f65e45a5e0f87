//! Bus error types.

use thiserror::Error;

/// Errors from publish and subscribe operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was closed; no further messages are accepted.
    #[error("Bus closed")]
    Closed,

    /// Payload plus metadata exceeds the configured limit.
    #[error("Message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge {
        /// Size of the rejected message.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// The transport refused the message for another reason.
    #[error("Publish rejected: {0}")]
    Rejected(String),
}
