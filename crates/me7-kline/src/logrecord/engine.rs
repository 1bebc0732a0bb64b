//! Log record setup and polling

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::RawRecord;
use crate::error::{ConfigError, SessionError};
use crate::kwp::{service_id, KwpTransport, ProtocolError};
use crate::link::LinkAdapter;

/// Setup sub-function following the 0xB7 service id
const SETUP_RECORD: u8 = 0x03;

/// Highest 24-bit address the ECU accepts
const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Busy setup retries logged at warn level before dropping to debug
const LOUD_RETRIES: u32 = 3;

/// Most locations a single setup frame can carry
pub const MAX_LOCATIONS: usize = (u8::MAX as usize - 2) / 4;

/// One RAM location sampled into the log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLocation {
    pub address: u32,
    pub size: u8,
}

impl MemoryLocation {
    pub fn new(address: u32, size: u8) -> Result<Self, ConfigError> {
        if address > MAX_ADDRESS {
            return Err(ConfigError::InvalidLocation(format!(
                "address 0x{:X} does not fit in 24 bits",
                address
            )));
        }
        if size == 0 {
            return Err(ConfigError::InvalidLocation(format!(
                "zero-sized location at 0x{:06X}",
                address
            )));
        }
        Ok(Self { address, size })
    }

    /// Wire form: size, then the address high byte first
    pub fn encode(&self) -> [u8; 4] {
        let [_, hi, mid, lo] = self.address.to_be_bytes();
        [self.size, hi, mid, lo]
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}/{}", self.address, self.size)
    }
}

/// Shape of the records the ECU will return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Byte count plus positive response id
    pub header_len: usize,
    /// Widths of the configured locations, in request order
    pub channel_widths: Vec<usize>,
}

impl RecordLayout {
    pub const HEADER_LEN: usize = 2;

    pub fn from_locations(locations: &[MemoryLocation]) -> Self {
        Self {
            header_len: Self::HEADER_LEN,
            channel_widths: locations.iter().map(|l| usize::from(l.size)).collect(),
        }
    }

    pub fn channel_bytes(&self) -> usize {
        self.channel_widths.iter().sum()
    }

    /// Record length including the header
    pub fn record_len(&self) -> usize {
        self.header_len + self.channel_bytes()
    }

    /// Check that decoding descriptors partition the record the same way
    pub fn check_channels(&self, widths: &[usize]) -> Result<(), ConfigError> {
        let actual: usize = widths.iter().sum();
        if actual != self.channel_bytes() {
            return Err(ConfigError::LayoutMismatch {
                expected: self.channel_bytes(),
                actual,
            });
        }
        if widths != self.channel_widths.as_slice() {
            return Err(ConfigError::InvalidLocation(format!(
                "channel widths {:?} do not match configured sizes {:?}",
                widths, self.channel_widths
            )));
        }
        Ok(())
    }

    /// Check that a polled record carries exactly the configured bytes
    pub fn check_record(&self, record: &RawRecord) -> Result<(), ConfigError> {
        let actual = record.as_bytes().len().saturating_sub(self.header_len);
        if actual != self.channel_bytes() {
            return Err(ConfigError::LayoutMismatch {
                expected: self.channel_bytes(),
                actual,
            });
        }
        Ok(())
    }
}

/// Negotiates and polls the log record
#[derive(Debug, Default)]
pub struct LogRecordEngine {
    layout: Option<RecordLayout>,
    retry_delay: Duration,
}

impl LogRecordEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that pauses `delay` between busy setup attempts
    pub fn with_retry_delay(delay: Duration) -> Self {
        Self {
            layout: None,
            retry_delay: delay,
        }
    }

    /// Layout agreed with the ECU, once configured
    pub fn layout(&self) -> Option<&RecordLayout> {
        self.layout.as_ref()
    }

    /// Build the `0xB7 0x03 <locations...>` setup request
    pub fn setup_request(locations: &[MemoryLocation]) -> Result<Vec<u8>, ConfigError> {
        if locations.is_empty() {
            return Err(ConfigError::EmptyLayout);
        }
        if locations.len() > MAX_LOCATIONS {
            return Err(ConfigError::InvalidLocation(format!(
                "{} locations exceed the limit of {}",
                locations.len(),
                MAX_LOCATIONS
            )));
        }
        let mut request = vec![service_id::LOG_RECORD, SETUP_RECORD];
        for location in locations {
            request.extend_from_slice(&location.encode());
        }
        Ok(request)
    }

    /// Tell the ECU which locations to sample
    ///
    /// Busy negatives are retried until the ECU accepts or `cancel` is set;
    /// any other error is returned.
    pub fn configure<L: LinkAdapter>(
        &mut self,
        kwp: &mut KwpTransport<L>,
        locations: &[MemoryLocation],
        cancel: &AtomicBool,
    ) -> Result<RecordLayout, SessionError> {
        let request = Self::setup_request(locations)?;
        let mut attempt = 1u32;

        let response = loop {
            match kwp.send_command(&request) {
                Ok(response) => break response,
                Err(e) if e.is_busy() => {
                    if cancel.load(Ordering::SeqCst) {
                        info!(attempts = attempt, "Log record setup cancelled");
                        return Err(SessionError::Cancelled("configuring the log record"));
                    }
                    if attempt <= LOUD_RETRIES {
                        warn!(attempt, "Log record setup busy, retrying");
                    } else {
                        debug!(attempt, "Log record setup busy, retrying");
                    }
                    attempt += 1;
                    if !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };
        expect_positive(&response)?;

        let layout = RecordLayout::from_locations(locations);
        info!(
            locations = locations.len(),
            record_len = layout.record_len(),
            attempts = attempt,
            "Log record configured"
        );
        self.layout = Some(layout.clone());
        Ok(layout)
    }

    /// Request one record
    pub fn poll<L: LinkAdapter>(&self, kwp: &mut KwpTransport<L>) -> Result<RawRecord, SessionError> {
        let layout = self.layout.as_ref().ok_or(ConfigError::NotConfigured)?;
        let record = kwp.send_command(&[service_id::LOG_RECORD])?;
        expect_positive(&record)?;
        layout.check_record(&record)?;
        debug!(record = %hex::encode(record.as_bytes()), "Log record");
        Ok(record)
    }
}

fn expect_positive(record: &RawRecord) -> Result<(), ProtocolError> {
    let expected = service_id::positive_response(service_id::LOG_RECORD);
    match record.service_id() {
        Some(id) if id == expected => Ok(()),
        other => Err(ProtocolError::InvalidResponse(format!(
            "expected response id 0x{:02X}, got {:?}",
            expected, other
        ))),
    }
}
