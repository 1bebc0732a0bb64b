//! Link adapter trait and line settings

use std::time::Duration;

use super::LinkError;

/// Character size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Byte-mode line framing (defaults to 8N1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineMode {
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

/// Exclusive handle on the K-line
///
/// Implementations own the physical channel and track its baud rate and
/// open/closed state. The adapter starts in byte mode; a non-zero
/// [`set_direction`](LinkAdapter::set_direction) switches it to bit mode for
/// the wake-up pulse train and [`set_line_mode`](LinkAdapter::set_line_mode)
/// switches it back.
pub trait LinkAdapter: Send {
    fn open(&mut self) -> Result<(), LinkError>;

    fn close(&mut self) -> Result<(), LinkError>;

    fn is_open(&self) -> bool;

    /// Read exactly `n` bytes, blocking until all of them have arrived
    fn read(&mut self, n: usize) -> Result<Vec<u8>, LinkError>;

    /// Wait at most `timeout` for a single byte
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError>;

    fn baud_rate(&self) -> u32;

    /// Configure byte framing and leave bit mode
    fn set_line_mode(&mut self, mode: LineMode) -> Result<(), LinkError>;

    /// Discard anything sitting in the receive buffer
    fn flush_input(&mut self) -> Result<(), LinkError>;

    /// Select output pins for bit mode (0 leaves bit mode untouched)
    fn set_direction(&mut self, mask: u8) -> Result<(), LinkError>;

    /// Drive the output pins while in bit mode
    fn set_output_level(&mut self, bits: u8) -> Result<(), LinkError>;
}

impl<L: LinkAdapter + ?Sized> LinkAdapter for Box<L> {
    fn open(&mut self) -> Result<(), LinkError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, LinkError> {
        (**self).read(n)
    }

    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError> {
        (**self).poll_byte(timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).write(bytes)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        (**self).set_baud_rate(baud)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_line_mode(&mut self, mode: LineMode) -> Result<(), LinkError> {
        (**self).set_line_mode(mode)
    }

    fn flush_input(&mut self) -> Result<(), LinkError> {
        (**self).flush_input()
    }

    fn set_direction(&mut self, mask: u8) -> Result<(), LinkError> {
        (**self).set_direction(mask)
    }

    fn set_output_level(&mut self, bits: u8) -> Result<(), LinkError> {
        (**self).set_output_level(bits)
    }
}
