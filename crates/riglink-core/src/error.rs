//! Error types for riglink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Malformed datagrams and protocol
//! sequencing anomalies are *not* errors at this level: the protocol engine
//! drops them silently, because UDP reordering and duplication are expected.

/// The error type for all riglink operations.
///
/// Variants cover the failure modes that can reach a caller: socket
/// failures, timeouts, bad configuration, and using a session or stream
/// after it has been shut down.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (socket bind/connect failure, send failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error surfaced to a caller (not used for dropped
    /// packets, which are never reported as errors).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a datagram or a reply from a channel task.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a builder or session operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The channel task is not running, or the transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// The transport reported that the link went away.
    #[error("connection lost")]
    ConnectionLost,

    /// An audio stream was closed unexpectedly.
    ///
    /// This occurs when the receiving side of an audio channel is dropped
    /// (for TX) or the sending side is dropped (for RX).
    #[error("stream closed")]
    StreamClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
