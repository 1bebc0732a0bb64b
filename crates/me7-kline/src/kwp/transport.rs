//! KWP transport over a link adapter
//!
//! Sends framed requests, consumes the echo of every transmitted byte and
//! reads back checksummed response records. "Response pending" replies are
//! absorbed here; every other negative response is returned to the caller.

use tracing::{debug, trace, warn};

use super::frame::{checksum, encode_frame, ResponseRecord};
use super::{NrcKind, ProtocolError};
use crate::config::{TransportOptions, Verbosity};
use crate::link::LinkAdapter;

/// Framed request/response channel to the ECU
pub struct KwpTransport<L> {
    link: L,
    options: TransportOptions,
}

impl<L: LinkAdapter> KwpTransport<L> {
    pub fn new(link: L, options: TransportOptions) -> Self {
        Self { link, options }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    pub fn verbosity(&self) -> Verbosity {
        self.options.verbosity
    }

    /// Write raw bytes and consume their echo
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.link.write(bytes)?;
        let echo = self.link.read(bytes.len())?;
        if echo != bytes {
            warn!(
                sent = %hex::encode(bytes),
                received = %hex::encode(&echo),
                "Echo mismatch"
            );
            return Err(ProtocolError::EchoMismatch {
                sent: bytes.to_vec(),
                received: echo,
            });
        }
        Ok(())
    }

    /// Frame a payload, send it and validate the echo
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        let frame = encode_frame(payload)?;
        if self.options.verbosity.shows(Verbosity::FRAMES) {
            trace!(frame = %hex::encode(&frame), "Sending frame");
        }
        self.send_raw(&frame)
    }

    /// Read the next response for the request in flight
    ///
    /// Response-pending negatives are skipped until the real response
    /// arrives (bounded by `pending_limit` when set). Any other negative
    /// response is returned as [`ProtocolError::NegativeResponse`]; a
    /// negative response too short to carry its code is invalid.
    pub fn read_response(&mut self) -> Result<ResponseRecord, ProtocolError> {
        let mut pending = 0u32;
        loop {
            let record = self.read_record()?;
            if !record.is_negative() {
                return Ok(record);
            }
            let Some(nrc) = record.negative_code() else {
                return Err(ProtocolError::InvalidResponse(format!(
                    "negative response without a code: {}",
                    hex::encode(record.as_bytes())
                )));
            };
            let service_id = record.rejected_service().unwrap_or_default();

            if nrc.kind() == NrcKind::ResponsePending {
                pending += 1;
                debug!(
                    service = format!("0x{:02X}", service_id),
                    pending, "Response pending"
                );
                if let Some(limit) = self.options.pending_limit {
                    if pending > limit {
                        return Err(ProtocolError::PendingLimitExceeded(limit));
                    }
                }
                continue;
            }

            debug!(
                service = format!("0x{:02X}", service_id),
                nrc = format!("0x{:02X}", nrc),
                "Negative response: {}",
                nrc
            );
            return Err(ProtocolError::NegativeResponse { service_id, nrc });
        }
    }

    /// Send a request and read its response
    pub fn send_command(&mut self, payload: &[u8]) -> Result<ResponseRecord, ProtocolError> {
        self.send_frame(payload)?;
        self.read_response()
    }

    fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        self.link
            .read(1)?
            .first()
            .copied()
            .ok_or_else(|| ProtocolError::InvalidResponse("adapter returned no data".to_string()))
    }

    fn read_record(&mut self) -> Result<ResponseRecord, ProtocolError> {
        let frames = self.options.verbosity.shows(Verbosity::FRAMES);

        // Some ECUs pad responses with leading zero bytes
        let count = loop {
            let byte = self.read_byte()?;
            if byte != 0 {
                break byte;
            }
            if frames {
                trace!("Skipping leading zero byte");
            }
        };

        let mut bytes = Vec::with_capacity(usize::from(count) + 1);
        bytes.push(count);
        bytes.extend(self.link.read(usize::from(count))?);
        let actual = self.read_byte()?;
        let expected = checksum(&bytes);

        if frames {
            trace!(
                record = %hex::encode(&bytes),
                checksum = format!("0x{:02X}", actual),
                "Received record"
            );
        }
        if expected != actual {
            warn!(
                record = %hex::encode(&bytes),
                expected = format!("0x{:02X}", expected),
                actual = format!("0x{:02X}", actual),
                "Checksum mismatch"
            );
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }

        let record = ResponseRecord::new(&bytes[1..]);
        if self.options.verbosity.shows(Verbosity::RESPONSES) {
            debug!(response = %hex::encode(record.as_bytes()), "Response");
        }
        Ok(record)
    }
}
