//! me7-conv - Log record decoding for ME7 telemetry
//!
//! Turns the raw records polled from an ME7 ECU into engineering units.
//! Decoding is pure: no I/O, no state, so every conversion can be checked
//! against fixed byte vectors.
//!
//! # Features
//!
//! - **Reversed byte order** - the last byte of a channel is the most significant
//! - **Bit masks** - applied before sign handling when non-zero
//! - **Signed channels** - two's complement over the channel width
//! - **Regular and inverse scaling** - `a * raw - b` or `a / (raw - b)`
//! - **Fixed precision** - every value is rounded to three decimals
//!
//! # Quick Start
//!
//! ```rust
//! use me7_conv::{decode, ChannelDescriptor};
//!
//! // Engine speed: raw 0x14 * 40 = 800 rpm
//! let channels = vec![ChannelDescriptor::new("nmot", 1).with_scale(40.0, 0.0)];
//!
//! // [byte_count, 0xF7, channel bytes...]
//! let sample = decode(&[0x02, 0xF7, 0x14], &channels, 0.5).unwrap();
//! assert_eq!(sample.values, vec![800.0]);
//! assert_eq!(sample.csv_line(), "     0.500,    800.000");
//! ```

pub mod decode;
pub mod error;
pub mod precision;
pub mod sample;
pub mod types;

// Re-export main types
pub use decode::{decode, decode_channel, header_offset, raw_value, to_signed};
pub use error::{ConvResult, DecodeError};
pub use precision::{round_sample, round_to_precision, SAMPLE_PRECISION};
pub use sample::{header_line, DecodedSample};
pub use types::{channel_widths, ChannelDescriptor};
