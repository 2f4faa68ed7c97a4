/// Round to a fixed number of decimal places.
pub fn round(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Format a float the way the remote display shows revisions: always at
/// least one decimal place ("1.0", "5.1"), no trailing zero padding beyond
/// what the value needs.
pub fn float_str(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
