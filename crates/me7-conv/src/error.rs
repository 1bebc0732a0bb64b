//! Error types for log record decoding

use thiserror::Error;

/// Errors that can occur while decoding a record
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Inverse conversion with `value == b`
    #[error("division by zero decoding channel {channel}")]
    DivisionByZero { channel: String },

    /// The record carries no 0xF7 response id
    #[error("record has no 0xF7 header")]
    MissingHeader,

    /// Record ended before the channel's bytes
    #[error("data too short for channel {channel}: expected {expected} bytes, got {actual}")]
    DataTooShort {
        channel: String,
        expected: usize,
        actual: usize,
    },

    /// Descriptor cannot be decoded
    #[error("invalid channel descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Result type for decoding operations
pub type ConvResult<T> = Result<T, DecodeError>;
