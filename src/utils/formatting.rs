//! Display formatting for readings.

/// Gauge channel of the inner vacuum can (1-based).
pub const IVC_CHANNEL: usize = 6;

/// Gauge channel of the still (1-based).
pub const STILL_CHANNEL: usize = 5;

/// Format a pressure as `1.2E-03`: one decimal, signed two-digit exponent.
pub fn format_pressure(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let formatted = format!("{:.1E}", value);
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

/// Pressure of a 1-based gauge channel from an ordered sequence.
pub fn channel_pressure(pressures: &[f64], channel: usize) -> Option<f64> {
    channel.checked_sub(1).and_then(|i| pressures.get(i)).copied()
}
