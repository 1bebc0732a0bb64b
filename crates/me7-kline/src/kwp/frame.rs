//! KWP message framing
//!
//! On the wire a request is `[length][payload...][checksum]` and a response
//! record is `[byte_count][data...][checksum]`. The checksum is the byte sum
//! of everything before it, reduced modulo 0xFF after truncation to 8 bits.

use super::{service_id, NegativeResponseCode, ProtocolError};

/// First data byte of a negative response
pub const NEGATIVE_RESPONSE: u8 = service_id::NEGATIVE_RESPONSE;

/// Largest payload a one-byte length prefix can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Checksum over a length byte and its payload
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
    ((sum & 0xFF) % 0xFF) as u8
}

/// Frame a payload without length checks
///
/// Payloads longer than [`MAX_PAYLOAD`] get a truncated length byte; use
/// [`encode_frame`] for anything that goes on the wire.
pub fn frame_bytes(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}

/// Frame a request payload (service id + parameters)
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::InvalidRequest("empty payload".to_string()));
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::InvalidRequest(format!(
            "payload of {} bytes exceeds {} byte limit",
            payload.len(),
            MAX_PAYLOAD
        )));
    }
    Ok(frame_bytes(payload))
}

/// Payload of a well-formed frame, or `None` if the bytes are not one
pub fn split_frame(frame: &[u8]) -> Option<&[u8]> {
    let (&checksum_byte, body) = frame.split_last()?;
    let (&length, payload) = body.split_first()?;
    if length == 0 || usize::from(length) != payload.len() {
        return None;
    }
    (checksum(body) == checksum_byte).then_some(payload)
}

/// Whether `frame` has a consistent length byte and checksum
pub fn validate_frame(frame: &[u8]) -> bool {
    split_frame(frame).is_some()
}

/// Response record as received from the ECU, checksum stripped
///
/// Byte indices used throughout the protocol (seed at `[3..7]`, security
/// status at `[3]`) count from the byte-count prefix, so the record keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    bytes: Vec<u8>,
}

impl ResponseRecord {
    /// Build a record from its byte count and data
    pub fn new(data: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        bytes.push(data.len() as u8);
        bytes.extend_from_slice(data);
        Self { bytes }
    }

    /// Parse a full record including its trailing checksum
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let (&actual, body) = raw
            .split_last()
            .ok_or_else(|| ProtocolError::InvalidResponse("empty record".to_string()))?;
        let count = body
            .first()
            .copied()
            .ok_or_else(|| ProtocolError::InvalidResponse("missing byte count".to_string()))?;
        if usize::from(count) != body.len() - 1 {
            return Err(ProtocolError::InvalidResponse(format!(
                "byte count {} does not match {} data bytes",
                count,
                body.len() - 1
            )));
        }
        let expected = checksum(body);
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }
        Ok(Self {
            bytes: body.to_vec(),
        })
    }

    /// `[byte_count, data...]`
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[1..]
    }

    pub fn byte_count(&self) -> u8 {
        self.bytes[0]
    }

    /// First data byte (positive response id or 0x7F)
    pub fn service_id(&self) -> Option<u8> {
        self.data().first().copied()
    }

    pub fn is_negative(&self) -> bool {
        self.service_id() == Some(NEGATIVE_RESPONSE)
    }

    /// Code of a negative response (`data[2]`)
    pub fn negative_code(&self) -> Option<NegativeResponseCode> {
        if !self.is_negative() {
            return None;
        }
        self.data().get(2).map(|&code| NegativeResponseCode::from(code))
    }

    /// Service a negative response refers to (`data[1]`)
    pub fn rejected_service(&self) -> Option<u8> {
        if !self.is_negative() {
            return None;
        }
        self.data().get(1).copied()
    }

    /// Framed bytes including the checksum
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = self.bytes.clone();
        frame.push(checksum(&self.bytes));
        frame
    }
}

impl AsRef<[u8]> for ResponseRecord {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
