//! Media timestamp parsing.
//!
//! FFmpeg reports elapsed media time as `HH:MM:SS.ff` (fractional digits vary,
//! `out_time` uses microseconds). `MM:SS` and bare seconds are also accepted.

use thiserror::Error;

/// Parse a media timestamp string to total seconds.
///
/// # Examples
/// ```
/// use vframe_models::timestamp::parse_media_time;
/// assert_eq!(parse_media_time("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_media_time("00:00:05.50").unwrap(), 5.5);
/// assert_eq!(parse_media_time("90").unwrap(), 90.0);
/// ```
pub fn parse_media_time(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }
    if ts.eq_ignore_ascii_case("N/A") {
        return Err(TimestampError::NotAvailable);
    }
    if ts.starts_with('-') {
        return Err(TimestampError::Negative);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let component = |name: &'static str, raw: &str| -> Result<f64, TimestampError> {
        raw.parse::<f64>()
            .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))
    };

    let seconds = match parts.as_slice() {
        [secs] => component("seconds", secs)?,
        [mins, secs] => component("minutes", mins)? * 60.0 + component("seconds", secs)?,
        [hours, mins, secs] => {
            component("hours", hours)? * 3600.0
                + component("minutes", mins)? * 60.0
                + component("seconds", secs)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if !seconds.is_finite() {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    Ok(seconds)
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp not available")]
    NotAvailable,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'")]
    InvalidFormat(String),
}
