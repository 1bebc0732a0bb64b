//! Session management for K-line communication
//!
//! This module owns the connection state machine: wake-up, security access,
//! the diagnostic session with its baud switch, keepalive and logging.

mod controller;
mod identity;

pub use controller::SessionController;
pub use identity::{EcuIdentity, ExpectedIdentity, IdentityCheck, IdentityPolicy, IdentityRow};

use std::fmt;

/// Connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Slow init in progress
    Initializing,
    /// Keybyte handshake complete
    Connected,
    SecurityUnlocked,
    /// Diagnostic session 0x86 running at the negotiated baud rate
    DiagSessionActive,
    /// Log record configured and being polled
    Logging,
    /// Link closed after termination or a fatal error
    Terminated,
}

impl SessionState {
    /// Whether the ECU is awake and answering requests
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Connected
                | SessionState::SecurityUnlocked
                | SessionState::DiagSessionActive
                | SessionState::Logging
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Initializing => "Initializing",
            SessionState::Connected => "Connected",
            SessionState::SecurityUnlocked => "SecurityUnlocked",
            SessionState::DiagSessionActive => "DiagSessionActive",
            SessionState::Logging => "Logging",
            SessionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}
