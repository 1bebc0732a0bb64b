//! KWP (keyword protocol) transport layer
//!
//! This module provides the message framing used on the K-line once the
//! ECU is awake: length-prefixed, checksummed frames, mandatory echo of every
//! transmitted byte, and the negative-response taxonomy.

mod error;
pub mod frame;
mod nrc;
mod transport;

pub use error::ProtocolError;
pub use frame::{checksum, encode_frame, validate_frame, ResponseRecord};
pub use nrc::{NegativeResponseCode, NrcKind};
pub use transport::KwpTransport;

/// KWP service ID constants used by the logger
pub mod service_id {
    pub const START_DIAGNOSTIC_SESSION: u8 = 0x10;
    pub const READ_ECU_IDENTIFICATION: u8 = 0x1A;
    pub const READ_MEMORY_BY_ADDRESS: u8 = 0x23;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const WRITE_MEMORY_BY_ADDRESS: u8 = 0x3D;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const STOP_COMMUNICATION: u8 = 0x82;
    pub const ACCESS_TIMING_PARAMETERS: u8 = 0x83;
    /// Manufacturer-specific local identifier used for log records
    pub const LOG_RECORD: u8 = 0xB7;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;

    /// Positive responses echo the service id with bit 6 set
    pub const fn positive_response(service: u8) -> u8 {
        service | 0x40
    }
}

/// StartDiagnosticSession (0x10) session types
pub mod session_type {
    /// Development session with optional baud-rate switch
    pub const DEVELOPMENT: u8 = 0x86;
}

/// SecurityAccess (0x27) sub-functions
pub mod security_sub_function {
    pub const LEVEL1_REQUEST_SEED: u8 = 0x01;
    pub const LEVEL1_SEND_KEY: u8 = 0x02;
    pub const LEVEL3_REQUEST_SEED: u8 = 0x03;
    pub const LEVEL3_SEND_KEY: u8 = 0x04;
}

/// ReadEcuIdentification (0x1A) options
pub mod identification_option {
    pub const HARDWARE_NUMBER: u8 = 0x92;
    pub const SOFTWARE_NUMBER: u8 = 0x94;
    /// Part number, software version, engine id and model id in one string
    pub const COMPOSITE: u8 = 0x9B;
}

/// Baud-rate codes accepted by StartDiagnosticSession 0x86
pub mod baud_code {
    pub const TABLE: &[(u32, u8)] = &[
        (19200, 0x30),
        (38400, 0x50),
        (56000, 0x63),
        (57600, 0x64),
        (124800, 0x87),
        (250000, 0xA7),
    ];

    /// Look up the session baud code for a bit rate
    pub fn for_baud(baud: u32) -> Option<u8> {
        TABLE
            .iter()
            .find(|(rate, _)| *rate == baud)
            .map(|(_, code)| *code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_code_lookup() {
        assert_eq!(baud_code::for_baud(38400), Some(0x50));
        assert_eq!(baud_code::for_baud(250000), Some(0xA7));
        assert_eq!(baud_code::for_baud(10400), None);
    }

    #[test]
    fn test_positive_response_ids() {
        assert_eq!(service_id::positive_response(service_id::LOG_RECORD), 0xF7);
        assert_eq!(service_id::positive_response(service_id::TESTER_PRESENT), 0x7E);
    }
}
