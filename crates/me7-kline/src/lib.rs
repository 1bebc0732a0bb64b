//! me7-kline - K-line KWP protocol engine for ME7 engine-control units
//!
//! This crate wakes an ECU over a single-wire K-line, unlocks it with one of
//! the two seed/key ciphers, negotiates a faster diagnostic session and then
//! polls it for log records built from arbitrary RAM locations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SessionController                         │
//! │  Disconnected → Connected → SecurityUnlocked →               │
//! │  DiagSessionActive → Logging → Terminated                    │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │ wake        │  │ security    │  │ LogRecordEngine     │ │
//! │  │ (slow init) │  │ (L1 / L3)   │  │ (0xB7 + pacing)     │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │                          │                                  │
//! │                    ┌─────┴─────┐                            │
//! │                    │KwpTransport│                           │
//! │                    │(framing)  │                            │
//! │                    └─────┬─────┘                            │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │  LinkAdapter    │                         │
//! │                 │ (serial / mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding of the polled records into engineering units lives in the
//! `me7-conv` crate; this crate only hands out raw records.

pub mod config;
pub mod error;
pub mod kwp;
pub mod link;
pub mod logrecord;
pub mod security;
pub mod session;

pub use config::{ConnectMode, SessionOptions, TransportOptions, Verbosity, WakeConfig};
pub use error::{ConfigError, SessionError};
pub use kwp::{KwpTransport, NegativeResponseCode, NrcKind, ProtocolError, ResponseRecord};
pub use link::{LinkAdapter, LinkError, LineMode, MockLink};
pub use logrecord::{
    run_polling_loop, LogRecordEngine, MemoryLocation, RawRecord, RecordLayout, RecordSource,
    SamplePacer,
};
pub use security::{SecurityError, SecurityLevel};
pub use session::{
    EcuIdentity, ExpectedIdentity, IdentityCheck, IdentityPolicy, SessionController, SessionState,
};

#[cfg(feature = "serial")]
pub use link::serial::{SerialConfig, SerialLink};
