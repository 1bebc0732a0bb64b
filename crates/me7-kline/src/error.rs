//! Session-level error types

use thiserror::Error;

use crate::kwp::{NrcKind, ProtocolError};
use crate::link::LinkError;
use crate::security::SecurityError;
use crate::session::SessionState;

/// Mismatches between what was configured and what the ECU reports
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Log record layout mismatch: expected {expected} channel bytes, got {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("No memory locations configured")]
    EmptyLayout,

    #[error("Log record not configured")]
    NotConfigured,

    #[error("Invalid memory location: {0}")]
    InvalidLocation(String),

    #[error("ECU identity mismatch: {}", .0.join(", "))]
    IdentityMismatch(Vec<String>),
}

/// Errors surfaced by the session controller
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Unsupported session baud rate: {0}")]
    UnsupportedBaud(u32),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cancelled while {0}")]
    Cancelled(&'static str),
}

impl SessionError {
    /// The underlying protocol error, if any
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            SessionError::Protocol(e) => Some(e),
            SessionError::Security(SecurityError::Protocol(e)) => Some(e),
            _ => None,
        }
    }

    pub fn nrc_kind(&self) -> Option<NrcKind> {
        self.protocol().and_then(ProtocolError::nrc_kind)
    }

    /// ECU asked for the same request to be repeated
    pub fn is_busy(&self) -> bool {
        self.nrc_kind() == Some(NrcKind::Busy)
    }

    /// Whether the error should end the session
    ///
    /// Busy negatives, operator cancellation and caller mistakes (wrong
    /// state, unsupported baud) leave the link usable; everything else does
    /// not.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::InvalidState { .. }
                | SessionError::UnsupportedBaud(_)
                | SessionError::Cancelled(_)
        ) && !self.is_busy()
    }
}
