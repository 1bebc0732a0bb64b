//! Decoding raw log records into engineering units
//!
//! The record is `[byte_count, 0xF7, channel bytes...]`; channel data starts
//! right after the first 0xF7. Each channel's bytes are reassembled with the
//! last byte as the most significant one.

use crate::error::{ConvResult, DecodeError};
use crate::precision::round_sample;
use crate::sample::DecodedSample;
use crate::types::ChannelDescriptor;

/// Positive response id of the log record service
pub const RECORD_HEADER: u8 = 0xF7;

/// Offset of the first channel byte
pub fn header_offset(record: &[u8]) -> ConvResult<usize> {
    record
        .iter()
        .position(|&b| b == RECORD_HEADER)
        .map(|pos| pos + 1)
        .ok_or(DecodeError::MissingHeader)
}

/// Reassemble bytes into an integer, last byte most significant
pub fn raw_value(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Reinterpret the low `width * 8` bits as two's complement
pub fn to_signed(value: u64, width: usize) -> i128 {
    let half = 1u128 << (width * 8 - 1);
    let value = u128::from(value);
    (value & (half - 1)) as i128 - (value & half) as i128
}

/// Integer value of one channel after masking and sign handling
pub fn channel_integer(descriptor: &ChannelDescriptor, bytes: &[u8]) -> i128 {
    let mut value = raw_value(bytes);
    if descriptor.bitmask != 0 {
        value &= descriptor.bitmask;
    }
    if descriptor.signed {
        to_signed(value, descriptor.size)
    } else {
        i128::from(value)
    }
}

/// Physical value of one channel, rounded to three decimals
pub fn decode_channel(descriptor: &ChannelDescriptor, bytes: &[u8]) -> ConvResult<f64> {
    descriptor.validate()?;
    if bytes.len() != descriptor.size {
        return Err(DecodeError::DataTooShort {
            channel: descriptor.name.clone(),
            expected: descriptor.size,
            actual: bytes.len(),
        });
    }

    let value = channel_integer(descriptor, bytes) as f64;
    let physical = if descriptor.inverse {
        let denominator = value - descriptor.b;
        if denominator == 0.0 {
            return Err(DecodeError::DivisionByZero {
                channel: descriptor.name.clone(),
            });
        }
        descriptor.a / denominator
    } else {
        descriptor.a * value - descriptor.b
    };

    Ok(round_sample(physical))
}

/// Decode every channel of a record
///
/// `record` is the full record starting at the byte count; `elapsed` is the
/// time since logging started, in seconds.
pub fn decode(
    record: &[u8],
    descriptors: &[ChannelDescriptor],
    elapsed: f64,
) -> ConvResult<DecodedSample> {
    let mut cursor = header_offset(record)?;
    let mut values = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let end = cursor + descriptor.size;
        let bytes = record.get(cursor..end).ok_or_else(|| DecodeError::DataTooShort {
            channel: descriptor.name.clone(),
            expected: descriptor.size,
            actual: record.len().saturating_sub(cursor),
        })?;
        values.push(decode_channel(descriptor, bytes)?);
        cursor = end;
    }

    Ok(DecodedSample::new(elapsed, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_header_offset() {
        assert_eq!(header_offset(&[0x03, 0xF7, 0x01, 0x02]), Ok(2));
        assert_eq!(header_offset(&[0x00, 0x04, 0xF7, 0x01]), Ok(3));
        assert_eq!(header_offset(&[0x02, 0x01, 0x02]), Err(DecodeError::MissingHeader));
    }

    #[test]
    fn test_raw_value_last_byte_most_significant() {
        assert_eq!(raw_value(&[0x01, 0x00]), 0x0001);
        assert_eq!(raw_value(&[0x00, 0x01]), 0x0100);
        assert_eq!(raw_value(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(raw_value(&[0xFF; 8]), u64::MAX);
    }

    #[rstest]
    #[case(0xFF, 1, -1)]
    #[case(0x7F, 1, 127)]
    #[case(0x80, 1, -128)]
    #[case(0xFFFE, 2, -2)]
    #[case(0x8000_0000, 4, -2_147_483_648)]
    #[case(u64::MAX, 8, -1)]
    fn test_to_signed(#[case] value: u64, #[case] width: usize, #[case] expected: i128) {
        assert_eq!(to_signed(value, width), expected);
    }

    #[test]
    fn test_unsigned_regular() {
        let channel = ChannelDescriptor::new("x", 2);
        assert_eq!(decode_channel(&channel, &[0x01, 0x00]), Ok(1.0));
    }

    #[test]
    fn test_signed_single_byte() {
        let channel = ChannelDescriptor::new("x", 1).signed();
        assert_eq!(decode_channel(&channel, &[0xFF]), Ok(-1.0));
    }

    #[test]
    fn test_mask_applied_before_sign() {
        // 0x01FF masked to 0x00FF, then read as a positive 16-bit value
        let channel = ChannelDescriptor::new("x", 2).with_mask(0x00FF).signed();
        assert_eq!(decode_channel(&channel, &[0xFF, 0x01]), Ok(255.0));

        let bit = ChannelDescriptor::new("b_kuppl", 1).with_mask(0x04);
        assert_eq!(decode_channel(&bit, &[0x0C]), Ok(4.0));
    }

    #[test]
    fn test_scale_and_offset() {
        // tmot: 0.75 * raw - 48
        let channel = ChannelDescriptor::new("tmot", 1).with_scale(0.75, 48.0);
        assert_eq!(decode_channel(&channel, &[0xB4]), Ok(87.0));
    }

    #[test]
    fn test_inverse_mode() {
        let channel = ChannelDescriptor::new("inv", 1).with_scale(100.0, 4.0).inverse();
        assert_eq!(decode_channel(&channel, &[0x0C]), Ok(12.5));
        assert_eq!(decode_channel(&channel, &[0x07]), Ok(33.333));
    }

    #[test]
    fn test_inverse_division_by_zero() {
        let channel = ChannelDescriptor::new("inv", 1).with_scale(1.0, 4.0).inverse();
        assert_eq!(
            decode_channel(&channel, &[0x04]),
            Err(DecodeError::DivisionByZero {
                channel: "inv".into()
            })
        );
    }

    #[test]
    fn test_decode_record() {
        let channels = vec![
            ChannelDescriptor::new("nmot", 1).with_scale(40.0, 0.0),
            ChannelDescriptor::new("lambda", 2).with_scale(0.1, 0.0),
            ChannelDescriptor::new("ign", 1).signed().with_scale(0.75, 0.0),
        ];
        let record = [0x05, 0xF7, 0x14, 0x64, 0x00, 0xF0];

        let sample = decode(&record, &channels, 1.5).unwrap();
        assert_eq!(sample.elapsed, 1.5);
        assert_eq!(sample.values, vec![800.0, 10.0, -12.0]);
    }

    #[test]
    fn test_decode_short_record() {
        let channels = vec![ChannelDescriptor::new("x", 2)];
        assert_eq!(
            decode(&[0x02, 0xF7, 0x01], &channels, 0.0),
            Err(DecodeError::DataTooShort {
                channel: "x".into(),
                expected: 2,
                actual: 1
            })
        );
    }
}
