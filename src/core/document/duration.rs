//! Duration values in configuration documents
//!
//! Accepts Go-style duration strings (`"30s"`, `"1m30s"`, `"250ms"`) and
//! integer nanoseconds. Use with `#[serde(with = "crate::core::document::duration")]`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

static DURATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|ms|s|m|h))+$").expect("valid duration regex")
});

static DURATION_COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h)").expect("valid duration regex")
});

const NANOS_PER_MICRO: f64 = 1_000.0;
const NANOS_PER_MILLI: f64 = 1_000_000.0;
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Parse a duration string such as `1h2m3.5s`
///
/// A bare `0` is accepted. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION_PATTERN.is_match(input) {
        return Err(format!("invalid duration {input:?}"));
    }

    let mut nanos = 0f64;
    for caps in DURATION_COMPONENT.captures_iter(input) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| format!("invalid number in duration {input:?}"))?;
        let unit = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => 60.0 * NANOS_PER_SECOND,
            "h" => 3600.0 * NANOS_PER_SECOND,
            other => return Err(format!("unknown duration unit {other:?}")),
        };
        nanos += value * unit;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration {input:?} is out of range"));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Render a duration in the same notation [`parse_duration`] accepts
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let nanos = duration.as_nanos();
    if nanos % 1_000_000_000 != 0 {
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}us", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let mut secs = duration.as_secs();
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    secs %= 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if secs > 0 {
        out.push_str(&format!("{secs}s"));
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Text(String),
    Nanos(i64),
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        RawDuration::Nanos(nanos) if nanos >= 0 => Ok(Duration::from_nanos(nanos as u64)),
        RawDuration::Nanos(nanos) => Err(serde::de::Error::custom(format!(
            "duration must not be negative, got {nanos}ns"
        ))),
    }
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}
