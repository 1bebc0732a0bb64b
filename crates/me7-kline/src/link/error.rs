//! Link layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Timed out waiting for the ECU")]
    Timeout,

    #[error("Adapter failure: {0}")]
    AdapterFailure(String),

    #[error("ECU did not acknowledge the handshake (captured: {})", hex::encode(captured))]
    NoAcknowledge { captured: Vec<u8> },

    #[error("Link is not open")]
    NotOpen,
}
