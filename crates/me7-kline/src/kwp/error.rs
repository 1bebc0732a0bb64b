//! KWP protocol errors

use thiserror::Error;

use super::{NegativeResponseCode, NrcKind};
use crate::link::LinkError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Echo mismatch: sent {}, received {}", hex::encode(sent), hex::encode(received))]
    EchoMismatch { sent: Vec<u8>, received: Vec<u8> },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Negative response: {nrc} (0x{nrc:02X}) for service 0x{service_id:02X}")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("ECU kept the request pending {0} times")]
    PendingLimitExceeded(u32),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl ProtocolError {
    /// Kind of the negative response, if this is one
    pub fn nrc_kind(&self) -> Option<NrcKind> {
        match self {
            ProtocolError::NegativeResponse { nrc, .. } => Some(nrc.kind()),
            _ => None,
        }
    }

    /// Whether the caller may resend the same request
    pub fn is_busy(&self) -> bool {
        self.nrc_kind() == Some(NrcKind::Busy)
    }
}
