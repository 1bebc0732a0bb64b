//! Physical link layer
//!
//! This module provides the byte/bit level access to the K-line:
//! - [`LinkAdapter`] trait the rest of the crate is written against
//! - Serial adapter for FTDI-style USB K-line cables (`serial` feature)
//! - Scripted mock adapter for testing
//! - Slow-init wake-up sequence ([`wake`])
//!
//! # Example
//!
//! ```ignore
//! use me7_kline::link::{wake, SerialConfig, SerialLink};
//! use me7_kline::WakeConfig;
//!
//! let mut link = SerialLink::new(SerialConfig::new("/dev/ttyUSB0"));
//! wake(&mut link, &WakeConfig::default())?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
mod wake;

#[cfg(feature = "serial")]
pub mod serial;

pub use adapter::{DataBits, LineMode, LinkAdapter, Parity, StopBits};
pub use error::LinkError;
pub use mock::MockLink;
pub use wake::{send_pulse_train, wait_for, wake, WaitOutcome};
