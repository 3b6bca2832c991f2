//! Parsing of statsd datagrams.
//!
//! A datagram holds one or more newline-delimited packets, each of the form `key:value|type[|@rate]`, optionally
//! repeating the `value|type` part as `key:v1|t1:v2|t2`. Every `value|type` field is parsed independently: a malformed
//! field yields an error for that field alone, and its siblings (and every other packet in the datagram) are still
//! parsed.
use thiserror::Error;

use crate::key::sanitize_key;

/// A single metric update carried by a datagram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// A counter delta, already scaled by the inverse of its sample rate.
    Counter(f64),

    /// A timer observation, in milliseconds.
    Timer(f64),

    /// An absolute gauge value.
    Gauge(f64),
}

/// A parsed metric update, with a sanitized key.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricUpdate {
    /// Sanitized (and possibly prefixed) metric key.
    pub key: String,

    /// Update to apply to the metric.
    pub value: MetricValue,
}

/// Errors that could occur while parsing a single `value|type` field.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    /// The value was not a finite floating-point number.
    #[error("invalid value {value:?} for metric '{key}'")]
    InvalidValue {
        /// Sanitized key of the metric.
        key: String,

        /// Raw value text.
        value: String,
    },

    /// The sample rate was not a number in `(0, 1]`.
    #[error("invalid sample rate {rate:?} for metric '{key}'")]
    InvalidSampleRate {
        /// Sanitized key of the metric.
        key: String,

        /// Raw sample rate text, without the leading `@`.
        rate: String,
    },
}

/// Parses every packet in the given datagram.
///
/// Results are returned in the order the fields appear in the datagram. Fields that are not metric updates at all --
/// fewer than two `|`-delimited parts, or an unknown metric type -- are skipped without producing a result.
pub fn parse_datagram(datagram: &[u8], prefix: &str) -> Vec<Result<MetricUpdate, ParseError>> {
    let mut results = Vec::new();
    for line in datagram.split(|b| *b == b'\n') {
        parse_packet(line, prefix, &mut results);
    }
    results
}

/// Parses a single packet, pushing one result per recognized field into `results`.
pub fn parse_packet(
    packet: &[u8],
    prefix: &str,
    results: &mut Vec<Result<MetricUpdate, ParseError>>,
) {
    let mut parts = packet.split(|b| *b == b':');

    // `split` always yields at least one item, even for an empty packet.
    let Some(raw_key) = parts.next() else {
        return;
    };

    // Don't bother sanitizing the key for a packet that carries no fields at all, which is what a trailing newline
    // looks like.
    let mut key = None;
    for field in parts {
        let key = key.get_or_insert_with(|| sanitize_key(raw_key, prefix));
        if let Some(result) = parse_field(key, field) {
            results.push(result);
        }
    }
}

fn parse_field(key: &str, field: &[u8]) -> Option<Result<MetricUpdate, ParseError>> {
    let parts = field.split(|b| *b == b'|').collect::<Vec<_>>();
    if parts.len() < 2 {
        return None;
    }
    let raw_value = parts[0];
    let metric_type = parts[1].trim_ascii();

    let result = match metric_type {
        b"ms" => parse_value(key, raw_value, 0.0).map(MetricValue::Timer),
        b"c" => parse_value(key, raw_value, 1.0).and_then(|value| match parts.as_slice() {
            // The sample rate is only honored as the third and last part.
            [_, _, raw_rate] if raw_rate.starts_with(b"@") => parse_scaled_counter(key, value, &raw_rate[1..]),
            _ => Ok(MetricValue::Counter(value)),
        }),
        b"g" => parse_value(key, raw_value, 1.0).map(MetricValue::Gauge),
        _ => return None,
    };

    Some(result.map(|value| MetricUpdate { key: key.to_owned(), value }))
}

fn parse_value(key: &str, raw: &[u8], default: f64) -> Result<f64, ParseError> {
    let raw = raw.trim_ascii();
    if raw.is_empty() {
        return Ok(default);
    }

    parse_finite(raw).ok_or_else(|| ParseError::InvalidValue {
        key: key.to_owned(),
        value: String::from_utf8_lossy(raw).into_owned(),
    })
}

fn parse_scaled_counter(key: &str, value: f64, raw_rate: &[u8]) -> Result<MetricValue, ParseError> {
    let sample_rate = parse_sample_rate(key, raw_rate)?;

    // A tiny but valid rate can still push the delta past `f64::MAX`.
    let delta = value * (1.0 / sample_rate);
    if !delta.is_finite() {
        return Err(ParseError::InvalidSampleRate {
            key: key.to_owned(),
            rate: String::from_utf8_lossy(raw_rate.trim_ascii()).into_owned(),
        });
    }

    Ok(MetricValue::Counter(delta))
}

fn parse_sample_rate(key: &str, raw: &[u8]) -> Result<f64, ParseError> {
    let raw = raw.trim_ascii();
    match parse_finite(raw) {
        Some(rate) if rate > 0.0 && rate <= 1.0 => Ok(rate),
        _ => Err(ParseError::InvalidSampleRate {
            key: key.to_owned(),
            rate: String::from_utf8_lossy(raw).into_owned(),
        }),
    }
}

fn parse_finite(raw: &[u8]) -> Option<f64> {
    std::str::from_utf8(raw).ok()?.parse::<f64>().ok().filter(|v| v.is_finite())
}
