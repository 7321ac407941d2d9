//! Error types for coconut-link.

use thiserror::Error;

/// Main error type for all driver operations.
#[derive(Debug, Error)]
pub enum CoconutError {
    /// I/O error on the serial stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or frame that cannot be built.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Symbolic parameter that has no protocol code.
    #[error("Unknown {domain}: {value:?}")]
    UnknownSymbol {
        /// Parameter domain (e.g. "direction").
        domain: &'static str,
        /// Rejected input.
        value: String,
    },

    /// Numeric parameter outside the range the firmware accepts.
    #[error("Invalid {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: i64,
    },

    /// A request with the same correlation key is already awaiting its reply.
    #[error("Request already in flight: {0}")]
    RequestInFlight(String),

    /// The decode branch resolved the request with an error payload.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The reply carried no decodable value.
    #[error("No data for {0}")]
    NoData(String),

    /// Connection closed while the request was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation attempted after disconnect.
    #[error("Not connected")]
    NotConnected,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using CoconutError.
pub type Result<T> = std::result::Result<T, CoconutError>;
