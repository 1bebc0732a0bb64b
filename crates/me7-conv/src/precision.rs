//! Floating point precision handling
//!
//! Logged values are reported with three decimals, so conversions like
//! `100 * 0.1` come out as `10.0` rather than `10.000000000000002`.

/// Decimal places kept for every decoded value
pub const SAMPLE_PRECISION: u8 = 3;

/// Round a value to the specified number of decimal places
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}

/// Round a decoded value to [`SAMPLE_PRECISION`]
pub fn round_sample(value: f64) -> f64 {
    round_to_precision(value, SAMPLE_PRECISION)
}
