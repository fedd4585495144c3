//! Decoding of endpoint responses.
//!
//! A body is either a single record object or an array of them. Each element
//! is decoded on its own so that one malformed record never costs its
//! siblings.

use std::net::IpAddr;

use serde_json::{Map, Value};
use spanare_core::mac::{MacAddr, MacParseError};
use spanare_core::record::{now_ns, ObservationRecord};
use thiserror::Error;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a record object or an array of records")]
    UnexpectedShape,

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing or non-string field `{0}`")]
    MissingField(&'static str),

    #[error("invalid MAC address in `{field}`: {source}")]
    Mac {
        field: &'static str,
        #[source]
        source: MacParseError,
    },
}

/// Per-record outcome of decoding a response body.
pub type Decoded = Vec<Result<ObservationRecord, DecodeError>>;

/// Decodes a whole response body.
///
/// An empty (or all-whitespace) body decodes to no records. A body that is
/// not JSON, or whose top level is a scalar, is an error for the whole body;
/// otherwise every element yields its own `Result`.
pub fn decode_body(body: &[u8]) -> Result<Decoded, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => Ok(items.iter().map(decode_record).collect()),
        obj @ Value::Object(_) => Ok(vec![decode_record(&obj)]),
        _ => Err(DecodeError::UnexpectedShape),
    }
}

/// Decodes one record object.
pub fn decode_record(value: &Value) -> Result<ObservationRecord, DecodeError> {
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let src_mac = mac_field(obj, "src_mac")?;
    let dst_mac = mac_field(obj, "dst_mac")?;
    let timestamp_ns = obj
        .get("timestamp")
        .and_then(Value::as_f64)
        .and_then(seconds_to_nanos)
        .unwrap_or_else(now_ns);

    Ok(ObservationRecord::new(src_mac, dst_mac, timestamp_ns)
        .with_ips(ip_field(obj, "src_ip"), ip_field(obj, "dst_ip")))
}

fn mac_field(obj: &Map<String, Value>, field: &'static str) -> Result<MacAddr, DecodeError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField(field))?
        .parse()
        .map_err(|source| DecodeError::Mac { field, source })
}

/// Unparseable addresses are dropped, not rejected.
fn ip_field(obj: &Map<String, Value>, field: &str) -> Option<IpAddr> {
    obj.get(field)?.as_str()?.trim().parse().ok()
}

/// Converts fractional seconds to whole nanoseconds.
///
/// The integer and fractional parts are converted separately so that large
/// epoch values keep their sub-second precision. Negative, non-finite and
/// out-of-range values yield `None`.
pub fn seconds_to_nanos(secs: f64) -> Option<u64> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc();
    if whole >= (u64::MAX / 1_000_000_000) as f64 {
        return None;
    }
    let frac = ((secs - whole) * NANOS_PER_SEC).round() as u64;
    (whole as u64)
        .checked_mul(1_000_000_000)?
        .checked_add(frac)
}
