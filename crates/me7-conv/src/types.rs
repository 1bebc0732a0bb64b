//! Channel descriptors
//!
//! A descriptor says how to cut one value out of a log record and how to
//! scale it: `a * raw - b`, or `a / (raw - b)` for inverse channels.

use serde::{Deserialize, Serialize};

use crate::error::{ConvResult, DecodeError};

/// Widest value the decoder reassembles
pub const MAX_WIDTH: usize = 8;

/// One logged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Width in bytes
    pub size: usize,
    /// Applied when non-zero
    #[serde(default)]
    pub bitmask: u64,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub inverse: bool,
    /// Scale factor
    #[serde(default = "default_scale")]
    pub a: f64,
    /// Offset
    #[serde(default)]
    pub b: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl ChannelDescriptor {
    /// Unsigned, unmasked channel with `a = 1`, `b = 0`
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            unit: None,
            size,
            bitmask: 0,
            signed: false,
            inverse: false,
            a: 1.0,
            b: 0.0,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_scale(mut self, a: f64, b: f64) -> Self {
        self.a = a;
        self.b = b;
        self
    }

    pub fn with_mask(mut self, bitmask: u64) -> Self {
        self.bitmask = bitmask;
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// Check the width is one the decoder can reassemble
    pub fn validate(&self) -> ConvResult<()> {
        if self.size == 0 || self.size > MAX_WIDTH {
            return Err(DecodeError::InvalidDescriptor(format!(
                "{}: size {} not in 1..={}",
                self.name, self.size, MAX_WIDTH
            )));
        }
        if !self.a.is_finite() || !self.b.is_finite() {
            return Err(DecodeError::InvalidDescriptor(format!(
                "{}: scale and offset must be finite",
                self.name
            )));
        }
        Ok(())
    }

    /// Column title, with the unit when known
    pub fn title(&self) -> String {
        match &self.unit {
            Some(unit) if !unit.is_empty() => format!("{} [{}]", self.name, unit),
            _ => self.name.clone(),
        }
    }
}

/// Byte widths of a descriptor list, in order
pub fn channel_widths(descriptors: &[ChannelDescriptor]) -> Vec<usize> {
    descriptors.iter().map(|d| d.size).collect()
}
