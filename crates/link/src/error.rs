//! Error types for link-layer operations.

use thiserror::Error;

/// Errors that can occur on the transport boundary.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Opening the listening handle failed.
    #[error("cannot open listen socket for service {service}: {source}")]
    Bind {
        /// Service the listener was for.
        service: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// Outgoing connection attempt failed.
    #[error("cannot connect to {address}: {source}")]
    Connect {
        /// Remote address.
        address: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The transport has no group channel configured.
    #[error("link layer {0} has no multicast group configured")]
    NoGroup(&'static str),

    /// A received frame exceeded the size cap.
    #[error("frame of {got} bytes exceeds cap of {cap} bytes")]
    FrameTooLarge {
        /// Received frame length.
        got: usize,
        /// Maximum allowed length.
        cap: usize,
    },

    /// Any other I/O failure on an established connection.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for link-layer operations.
pub type LinkResult<T> = Result<T, LinkError>;
