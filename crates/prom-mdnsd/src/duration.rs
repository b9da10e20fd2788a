//! Go-style duration strings
//!
//! A duration is a sequence of decimal numbers, each with an optional
//! fraction and a unit suffix: `300ms`, `10s`, `1m30s`, `1.5h`.
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.
//! Only positive durations are accepted.

use std::time::Duration;
use thiserror::Error;

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1000 * NANOSECOND;
const MILLISECOND: u64 = 1000 * MICROSECOND;
const SECOND: u64 = 1000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("invalid duration")]
    InvalidDuration,

    #[error("missing unit in duration")]
    MissingUnit,

    #[error("unknown unit in duration")]
    UnknownUnit,

    #[error("duration out of range")]
    Overflow,

    #[error("duration must be positive")]
    NotPositive,
}

/// Consume the leading `[0-9]*`
fn leading_int(s: &[u8]) -> Result<(u64, &[u8]), ParseDurationError> {
    let digits = s.iter().take_while(|c| c.is_ascii_digit()).count();

    let value = s[..digits].iter().try_fold(0u64, |acc, &c| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u64::from(c - b'0')))
            .ok_or(ParseDurationError::Overflow)
    })?;

    Ok((value, &s[digits..]))
}

/// Consume the leading `[0-9]*` of a fraction
///
/// Stops accumulating precision instead of failing on overflow.
fn leading_fraction(s: &[u8]) -> (u64, f64, &[u8]) {
    let digits = s.iter().take_while(|c| c.is_ascii_digit()).count();
    let mut value = 0u64;
    let mut scale = 1.0;

    for &c in &s[..digits] {
        match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(c - b'0')))
        {
            Some(next) => {
                value = next;
                scale *= 10.0;
            }
            None => break,
        }
    }

    (value, scale, &s[digits..])
}

fn unit_nanos(unit: &[u8]) -> Option<u64> {
    match unit {
        b"ns" => Some(NANOSECOND),
        b"us" => Some(MICROSECOND),
        // "µs" U+00B5
        [0xc2, 0xb5, b's'] => Some(MICROSECOND),
        // "μs" U+03BC
        [0xce, 0xbc, b's'] => Some(MICROSECOND),
        b"ms" => Some(MILLISECOND),
        b"s" => Some(SECOND),
        b"m" => Some(MINUTE),
        b"h" => Some(HOUR),
        _ => None,
    }
}

/// Parse a duration string such as `10s` or `1m30s`
pub fn parse_duration(text: &str) -> Result<Duration, ParseDurationError> {
    let mut s = text.trim().as_bytes();

    match s.first() {
        Some(b'-') => return Err(ParseDurationError::NotPositive),
        Some(b'+') => s = &s[1..],
        _ => {}
    }

    if s == b"0" {
        return Err(ParseDurationError::NotPositive);
    }
    if s.is_empty() {
        return Err(ParseDurationError::InvalidDuration);
    }

    let mut total: u64 = 0;

    while !s.is_empty() {
        // The next character must be [0-9.]
        if !(s[0] == b'.' || s[0].is_ascii_digit()) {
            return Err(ParseDurationError::InvalidDuration);
        }

        let before = s.len();
        let (whole, rest) = leading_int(s)?;
        s = rest;
        let pre = before != s.len();

        let mut fraction = 0;
        let mut scale = 1.0;
        let mut post = false;
        if s.first() == Some(&b'.') {
            s = &s[1..];
            let before = s.len();
            let (f, sc, rest) = leading_fraction(s);
            fraction = f;
            scale = sc;
            s = rest;
            post = before != s.len();
        }
        if !pre && !post {
            // no digits (e.g. ".s")
            return Err(ParseDurationError::InvalidDuration);
        }

        let unit_len = s
            .iter()
            .take_while(|&&c| c != b'.' && !c.is_ascii_digit())
            .count();
        if unit_len == 0 {
            return Err(ParseDurationError::MissingUnit);
        }
        let unit = unit_nanos(&s[..unit_len]).ok_or(ParseDurationError::UnknownUnit)?;
        s = &s[unit_len..];

        let mut value = whole.checked_mul(unit).ok_or(ParseDurationError::Overflow)?;
        if fraction > 0 {
            value = value
                .checked_add((fraction as f64 * (unit as f64 / scale)) as u64)
                .ok_or(ParseDurationError::Overflow)?;
        }

        total = total.checked_add(value).ok_or(ParseDurationError::Overflow)?;
    }

    if total == 0 {
        return Err(ParseDurationError::NotPositive);
    }

    Ok(Duration::from_nanos(total))
}
