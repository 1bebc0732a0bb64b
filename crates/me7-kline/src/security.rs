//! Seed/key security access (service 0x27)
//!
//! ME7 ECUs use one of two ciphers depending on generation:
//! - level 3 adds a fixed constant to the seed
//! - level 1 runs five rounds of a rotate/xor scramble
//!
//! Both key functions are pure so they can be tested without a link.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kwp::{security_sub_function, service_id, KwpTransport, ProtocolError, ResponseRecord};
use crate::link::LinkAdapter;

/// Constant added to the seed for level 3
pub const LEVEL3_KEY_OFFSET: u32 = 12233;

/// XOR constant applied when the rotated-out bit is set for level 1
pub const LEVEL1_MAGIC: u32 = 0x01C6_0020;

/// Rounds of the level 1 scramble
pub const LEVEL1_ROUNDS: usize = 5;

/// Status byte (record index 3) confirming a level 3 unlock
pub const LEVEL3_ACCESS_GRANTED: u8 = 0x34;

/// Security access errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Level 3 security access rejected: {}", hex::encode(response))]
    LevelThreeRejected { response: Vec<u8> },

    #[error("Unsupported security level: {0}")]
    Unsupported(u8),

    #[error("Seed response too short: {0} bytes")]
    SeedTooShort(usize),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Security access level offered by the ECU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityLevel {
    /// Rotation cipher
    Level1,
    /// Additive cipher
    #[default]
    Level3,
}

impl SecurityLevel {
    /// Sub-function requesting the seed
    pub fn request_seed(self) -> u8 {
        match self {
            SecurityLevel::Level1 => security_sub_function::LEVEL1_REQUEST_SEED,
            SecurityLevel::Level3 => security_sub_function::LEVEL3_REQUEST_SEED,
        }
    }

    /// Sub-function carrying the key
    pub fn send_key(self) -> u8 {
        match self {
            SecurityLevel::Level1 => security_sub_function::LEVEL1_SEND_KEY,
            SecurityLevel::Level3 => security_sub_function::LEVEL3_SEND_KEY,
        }
    }

    /// Compute the key for a seed
    pub fn key(self, seed: u32) -> u32 {
        match self {
            SecurityLevel::Level1 => level1_key(seed),
            SecurityLevel::Level3 => level3_key(seed),
        }
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = SecurityError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(SecurityLevel::Level1),
            3 => Ok(SecurityLevel::Level3),
            other => Err(SecurityError::Unsupported(other)),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLevel::Level1 => write!(f, "level 1"),
            SecurityLevel::Level3 => write!(f, "level 3"),
        }
    }
}

/// Level 3 key: seed plus a fixed offset, modulo 2^32
pub fn level3_key(seed: u32) -> u32 {
    seed.wrapping_add(LEVEL3_KEY_OFFSET)
}

/// Level 1 key: rotate left, xor with the magic constant when the MSB was set
pub fn level1_key(seed: u32) -> u32 {
    (0..LEVEL1_ROUNDS).fold(seed, |value, _| {
        let rotated = value.rotate_left(1);
        if value & 0x8000_0000 != 0 {
            LEVEL1_MAGIC ^ rotated
        } else {
            rotated
        }
    })
}

/// Seed carried in a seed response (`[count, 0x67, level, s3, s2, s1, s0]`)
pub fn seed_from_response(record: &ResponseRecord) -> Result<u32, SecurityError> {
    let bytes = record.as_bytes();
    let seed: [u8; 4] = bytes
        .get(3..7)
        .and_then(|s| s.try_into().ok())
        .ok_or(SecurityError::SeedTooShort(bytes.len()))?;
    Ok(u32::from_be_bytes(seed))
}

/// Run the seed/key exchange for `level`
///
/// Returns the ECU's answer to the key. Level 3 additionally requires the
/// access-granted status byte; level 1 leaves judging the answer to the
/// caller.
pub fn unlock<L: LinkAdapter>(
    kwp: &mut KwpTransport<L>,
    level: SecurityLevel,
) -> Result<ResponseRecord, SecurityError> {
    let seed_response =
        kwp.send_command(&[service_id::SECURITY_ACCESS, level.request_seed()])?;
    let seed = seed_from_response(&seed_response)?;
    let key = level.key(seed);
    debug!(
        %level,
        seed = format!("0x{:08X}", seed),
        key = format!("0x{:08X}", key),
        "Computed security key"
    );

    let mut request = vec![service_id::SECURITY_ACCESS, level.send_key()];
    request.extend_from_slice(&key.to_be_bytes());
    let response = kwp.send_command(&request)?;

    if level == SecurityLevel::Level3
        && response.as_bytes().get(3) != Some(&LEVEL3_ACCESS_GRANTED)
    {
        warn!(response = %hex::encode(response.as_bytes()), "Level 3 key not accepted");
        return Err(SecurityError::LevelThreeRejected {
            response: response.as_bytes().to_vec(),
        });
    }

    info!(%level, "Security access complete");
    Ok(response)
}
