//! Human-friendly durations as they appear in Stash specs and statuses
//!
//! Specs carry values such as `timeOut: 1h30m` and `delay: 5m`; statuses
//! report `sessionDuration: 2m13s`. Both use the same unit-suffixed form.

use std::time::Duration;

use crate::{Error, Result};

/// Parse a duration such as `90s`, `30m`, `2h` or `1h30m15s`.
///
/// A bare integer is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::validation("invalid duration: empty string"));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| Error::validation(format!("invalid duration: {}", s)))?;
        let unit = match ch {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => {
                return Err(Error::validation(format!(
                    "invalid duration '{}', expected e.g. 1h, 30m, 1h30m, 3600s",
                    s
                )))
            }
        };
        total += n * unit;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(Error::validation(format!(
            "invalid duration '{}': missing unit after {}",
            s, digits
        )));
    }
    Ok(Duration::from_secs(total))
}

/// Render a duration rounded to whole seconds, e.g. `1h2m3s`, `45s`, `0s`.
pub fn format_duration(d: Duration) -> String {
    let rounded = (d.as_millis() + 500) / 1000;
    let hours = rounded / 3600;
    let minutes = (rounded % 3600) / 60;
    let seconds = rounded % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", seconds));
    out
}
