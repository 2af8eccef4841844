//! Human readable durations.
//!
//! A duration string is a sequence of decimal integers, each followed by a
//! unit suffix, such as `500ms`, `10s` or `1m30s`. Valid units are `ns`,
//! `us`, `ms`, `s`, `m` and `h`. A bare integer is read as seconds.

use crate::error::{ConfigError, Result};
use std::time::Duration;

const NANOSECOND: u128 = 1;
const MICROSECOND: u128 = 1000 * NANOSECOND;
const MILLISECOND: u128 = 1000 * MICROSECOND;
const SECOND: u128 = 1000 * MILLISECOND;
const MINUTE: u128 = 60 * SECOND;
const HOUR: u128 = 60 * MINUTE;

fn invalid(input: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses a duration string like `10s`, `250ms` or `1h2m`.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let s = text.trim();
    if s.is_empty() {
        return Err(invalid(text, "empty duration"));
    }

    if s.bytes().all(|c| c.is_ascii_digit()) {
        let secs = s
            .parse::<u64>()
            .map_err(|_| invalid(text, "number too large"))?;
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(invalid(text, "expected a number"));
        }
        let value = rest[..digits]
            .parse::<u128>()
            .map_err(|_| invalid(text, "number too large"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .bytes()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        if unit_len == 0 {
            return Err(invalid(text, "missing unit"));
        }
        let unit = match &rest[..unit_len] {
            "ns" => NANOSECOND,
            "us" => MICROSECOND,
            "ms" => MILLISECOND,
            "s" => SECOND,
            "m" => MINUTE,
            "h" => HOUR,
            other => return Err(invalid(text, &format!("unknown unit '{}'", other))),
        };
        rest = &rest[unit_len..];

        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| invalid(text, "duration overflow"))?;
    }

    let secs = u64::try_from(total / SECOND).map_err(|_| invalid(text, "duration overflow"))?;
    Ok(Duration::new(secs, (total % SECOND) as u32))
}

/// Formats a duration using the largest units that represent it exactly.
pub fn format_duration(duration: Duration) -> String {
    let mut nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, suffix) in [
        (HOUR, "h"),
        (MINUTE, "m"),
        (SECOND, "s"),
        (MILLISECOND, "ms"),
        (MICROSECOND, "us"),
        (NANOSECOND, "ns"),
    ] {
        if nanos >= unit {
            out.push_str(&format!("{}{}", nanos / unit, suffix));
            nanos %= unit;
        }
    }
    out
}

/// Serde adapter for `Duration` fields written as duration strings.
///
/// Integers are accepted too and read as seconds, which is what environment
/// overrides produce with `try_parsing` enabled.
pub mod serde {
    use super::{format_duration, parse_duration};
    use ::serde::de::{self, Deserializer, Visitor};
    use ::serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration such as \"10s\" or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                parse_duration(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("duration cannot be negative"))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
