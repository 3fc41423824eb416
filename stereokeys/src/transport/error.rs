//! Transport error types.

use std::io;

use thiserror::Error;

use super::records::RecordError;

/// Errors from the UDP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("no usable address for {0}")]
    NoAddress(String),

    #[error("failed to bind UDP socket on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure UDP socket: {0}")]
    Configure(#[source] io::Error),

    #[error("UDP send failed: {0}")]
    Send(#[source] io::Error),

    #[error("UDP send truncated: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },

    #[error("UDP receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error(transparent)]
    Record(#[from] RecordError),
}
