//! Decoded samples and their CSV rendering

use std::fmt;

use crate::precision::round_sample;
use crate::types::ChannelDescriptor;

/// Column width of every CSV field
pub const COLUMN_WIDTH: usize = 10;

/// One polling cycle worth of physical values
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    /// Seconds since logging started
    pub elapsed: f64,
    /// One value per channel, in descriptor order
    pub values: Vec<f64>,
}

impl DecodedSample {
    pub fn new(elapsed: f64, values: Vec<f64>) -> Self {
        Self {
            elapsed: round_sample(elapsed),
            values,
        }
    }

    /// `elapsed, value_1, ..., value_n`, each right-aligned with 3 decimals
    pub fn csv_line(&self) -> String {
        std::iter::once(self.elapsed)
            .chain(self.values.iter().copied())
            .map(|v| format!("{:>w$.3}", v, w = COLUMN_WIDTH))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DecodedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.csv_line())
    }
}

/// Header naming the time column and every channel
pub fn header_line(descriptors: &[ChannelDescriptor]) -> String {
    std::iter::once("Time [s]".to_string())
        .chain(descriptors.iter().map(ChannelDescriptor::title))
        .map(|title| format!("{:>w$}", title, w = COLUMN_WIDTH))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_line() {
        let sample = DecodedSample::new(1.23456, vec![10.0, -1.0, 12345.678]);
        assert_eq!(
            sample.csv_line(),
            "     1.235,     10.000,     -1.000,  12345.678"
        );
        assert_eq!(sample.to_string(), sample.csv_line());
    }

    #[test]
    fn test_header_line() {
        let channels = vec![
            ChannelDescriptor::new("nmot", 1).with_unit("rpm"),
            ChannelDescriptor::new("lambda", 2),
        ];
        assert_eq!(
            header_line(&channels),
            "  Time [s], nmot [rpm],     lambda"
        );
    }

    #[test]
    fn test_empty_sample() {
        assert_eq!(DecodedSample::new(0.0, vec![]).csv_line(), "     0.000");
    }
}
