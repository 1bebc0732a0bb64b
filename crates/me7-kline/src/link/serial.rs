//! Serial-port link adapter
//!
//! Talks to FTDI-style USB K-line cables through the `serialport` crate. Bit
//! mode is emulated with the UART break condition: holding break pulls the
//! K-line low (logic 0), releasing it lets the line idle high (logic 1).

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::debug;

use super::{DataBits, LineMode, LinkAdapter, LinkError, Parity, StopBits};

/// Serial adapter configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (e.g. "/dev/ttyUSB0")
    pub path: String,
    /// Baud rate used when the port is opened
    pub baud: u32,
    /// Longest a blocking read waits before giving up
    pub read_timeout: Duration,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud: 10400,
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// K-line adapter backed by a serial port
pub struct SerialLink {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    baud: u32,
    bit_mode: bool,
}

fn adapter_failure(err: serialport::Error) -> LinkError {
    LinkError::AdapterFailure(err.to_string())
}

fn io_failure(err: io::Error) -> LinkError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout,
        _ => LinkError::AdapterFailure(err.to_string()),
    }
}

impl SerialLink {
    pub fn new(config: SerialConfig) -> Self {
        let baud = config.baud;
        Self {
            config,
            port: None,
            baud,
            bit_mode: false,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::NotOpen)
    }
}

impl LinkAdapter for SerialLink {
    fn open(&mut self) -> Result<(), LinkError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.config.path, self.baud)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.config.read_timeout)
            .open()
            .map_err(adapter_failure)?;
        debug!(path = %self.config.path, baud = self.baud, "Serial port opened");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if let Some(port) = self.port.take() {
            if self.bit_mode {
                port.clear_break().map_err(adapter_failure)?;
            }
            debug!(path = %self.config.path, "Serial port closed");
        }
        self.bit_mode = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, LinkError> {
        let mut buf = vec![0u8; n];
        self.port()?.read_exact(&mut buf).map_err(io_failure)?;
        Ok(buf)
    }

    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError> {
        let read_timeout = self.config.read_timeout;
        let port = self.port()?;
        port.set_timeout(timeout).map_err(adapter_failure)?;

        let mut buf = [0u8; 1];
        let result = port.read(&mut buf);
        port.set_timeout(read_timeout).map_err(adapter_failure)?;

        match result {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) => match io_failure(e) {
                LinkError::Timeout => Ok(None),
                other => Err(other),
            },
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port()?;
        port.write_all(bytes).map_err(io_failure)?;
        port.flush().map_err(io_failure)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(baud).map_err(adapter_failure)?;
        }
        self.baud = baud;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn set_line_mode(&mut self, mode: LineMode) -> Result<(), LinkError> {
        let leaving_bit_mode = self.bit_mode;
        let port = self.port()?;
        if leaving_bit_mode {
            port.clear_break().map_err(adapter_failure)?;
        }
        port.set_data_bits(match mode.data_bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        })
        .map_err(adapter_failure)?;
        port.set_stop_bits(match mode.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        })
        .map_err(adapter_failure)?;
        port.set_parity(match mode.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        })
        .map_err(adapter_failure)?;
        self.bit_mode = false;
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), LinkError> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(adapter_failure)
    }

    fn set_direction(&mut self, mask: u8) -> Result<(), LinkError> {
        self.port()?;
        if mask != 0 {
            self.bit_mode = true;
        }
        Ok(())
    }

    fn set_output_level(&mut self, bits: u8) -> Result<(), LinkError> {
        if !self.bit_mode {
            return Err(LinkError::AdapterFailure("not in bit mode".to_string()));
        }
        let port = self.port()?;
        if bits & 0x01 == 0 {
            port.set_break().map_err(adapter_failure)
        } else {
            port.clear_break().map_err(adapter_failure)
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
