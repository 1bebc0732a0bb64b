//! Protocol engine configuration
//!
//! Plain structs holding the timing constants and byte patterns the ECU
//! expects. Every type has a `Default` that matches the ME7 K-line behaviour;
//! tests shrink the durations to keep runs fast.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::link::LineMode;

/// Diagnostic verbosity threaded through component construction
///
/// Levels follow the classic `-d 0..4` switch: 3 logs every protocol
/// response, 4 adds per-frame and per-byte detail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const QUIET: Self = Self(0);
    pub const RESPONSES: Self = Self(3);
    pub const FRAMES: Self = Self(4);

    /// Create a verbosity level, clamped to the supported 0..=4 range
    pub fn new(level: u8) -> Self {
        Self(level.min(4))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Whether output that needs `needed` should be produced
    pub fn shows(self, needed: Verbosity) -> bool {
        self >= needed
    }
}

/// How the link is brought up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectMode {
    /// 5-baud slow init addressing ECU 0x11
    #[default]
    #[serde(rename = "SLOW-0x11")]
    Slow0x11,
}

impl std::fmt::Display for ConnectMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectMode::Slow0x11 => f.write_str("SLOW-0x11"),
        }
    }
}

/// One step of the wake-up pulse train
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Output level (bit 0 drives the K-line)
    pub level: u8,
    /// How long the level is held
    pub hold: Duration,
}

impl Pulse {
    pub const fn new(level: u8, hold: Duration) -> Self {
        Self { level, hold }
    }
}

/// Slow-init (5 baud) wake-up configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Idle time before the pulse train starts
    pub idle_before: Duration,
    /// Pin mask driven while bit-banging
    pub direction_mask: u8,
    /// Address bit pattern for ECU 0x11
    pub pulses: Vec<Pulse>,
    /// Byte-mode baud rate after the pulse train
    pub baud: u32,
    /// Byte-mode framing after the pulse train
    pub line_mode: LineMode,
    /// Sync byte followed by the two key bytes
    pub sync_pattern: Vec<u8>,
    /// Window for the sync pattern to show up
    pub sync_timeout: Duration,
    /// Pause between the last key byte and the handshake byte
    pub handshake_delay: Duration,
    /// Complement of the second key byte
    pub handshake_byte: u8,
    /// Inverted address the ECU confirms with
    pub ack_pattern: Vec<u8>,
    /// Window for the confirmation
    pub ack_timeout: Duration,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            idle_before: Duration::from_millis(500),
            direction_mask: 0x01,
            pulses: vec![
                Pulse::new(1, Duration::from_millis(500)),
                Pulse::new(0, Duration::from_millis(200)),
                Pulse::new(1, Duration::from_millis(200)),
                Pulse::new(0, Duration::from_millis(1400)),
                Pulse::new(1, Duration::from_millis(200)),
            ],
            baud: 10400,
            line_mode: LineMode::default(),
            sync_pattern: vec![0x55, 0xEF, 0x8F],
            sync_timeout: Duration::from_secs(1),
            handshake_delay: Duration::from_millis(26),
            handshake_byte: 0x70,
            ack_pattern: vec![0xFE],
            ack_timeout: Duration::from_secs(1),
        }
    }
}

/// Transport framer options
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportOptions {
    pub verbosity: Verbosity,
    /// Upper bound on consecutive "response pending" frames for one request.
    /// `None` waits as long as the ECU keeps signalling.
    pub pending_limit: Option<u32>,
}

/// Session controller options
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub transport: TransportOptions,
    /// Quiet time after a baud switch before the next request
    pub baud_settle: Duration,
    /// Pause before resending a log record setup the ECU answered busy
    pub busy_retry_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            baud_settle: Duration::from_secs(1),
            busy_retry_delay: Duration::from_millis(50),
        }
    }
}

impl SessionOptions {
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.transport.verbosity = verbosity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_clamps_and_orders() {
        assert_eq!(Verbosity::new(9), Verbosity::FRAMES);
        assert!(Verbosity::new(4).shows(Verbosity::RESPONSES));
        assert!(!Verbosity::QUIET.shows(Verbosity::RESPONSES));
    }

    #[test]
    fn test_default_wake_pulse_train() {
        let config = WakeConfig::default();
        let levels: Vec<u8> = config.pulses.iter().map(|p| p.level).collect();
        let total: Duration = config.pulses.iter().map(|p| p.hold).sum();

        assert_eq!(levels, vec![1, 0, 1, 0, 1]);
        assert_eq!(total, Duration::from_millis(2500));
        assert_eq!(config.baud, 10400);
        assert_eq!(config.handshake_byte, !config.sync_pattern[2]);
    }

    #[test]
    fn test_connect_mode_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: ConnectMode,
        }

        let parsed: Wrapper = toml::from_str(r#"mode = "SLOW-0x11""#).unwrap();
        assert_eq!(parsed.mode, ConnectMode::Slow0x11);
        assert_eq!(ConnectMode::Slow0x11.to_string(), "SLOW-0x11");
    }
}
