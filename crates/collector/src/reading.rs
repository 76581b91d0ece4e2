//! Reading wire shape and ingest-time payload validation.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// `YYYY-MM-DD HH:MM:SS`, UTC, no zone suffix.
const WIRE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

// ---------------------------------------------------------------------------
// Heat coil state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeatStatus {
    On,
    Off,
}

impl HeatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for HeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact match only: `"on"` or `" ON"` are rejected.
impl FromStr for HeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(format!("heat_status must be \"ON\" or \"OFF\", got {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading + history point
// ---------------------------------------------------------------------------

/// One stored reading.  Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub methane: f64,
    pub temperature: f64,
    pub ph: f64,
    pub heat_status: HeatStatus,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: PrimitiveDateTime,
}

/// A history row.  The heat coil state is not part of the series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: PrimitiveDateTime,
    pub methane: f64,
    pub temperature: f64,
    pub ph: f64,
}

impl From<Reading> for HistoryPoint {
    fn from(r: Reading) -> Self {
        Self {
            timestamp: r.timestamp,
            methane: r.methane,
            temperature: r.temperature,
            ph: r.ph,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

fn serialize_timestamp<S: Serializer>(ts: &PrimitiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*ts))
}

pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    // Every component of WIRE_FORMAT is present on a PrimitiveDateTime.
    ts.format(WIRE_FORMAT).unwrap_or_else(|_| ts.to_string())
}

pub fn parse_timestamp(text: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(text, WIRE_FORMAT)
}

/// Seconds since the epoch, treating `ts` as UTC.
pub fn to_unix(ts: PrimitiveDateTime) -> i64 {
    ts.assume_utc().unix_timestamp()
}

pub fn from_unix(secs: i64) -> Result<PrimitiveDateTime, time::error::ComponentRange> {
    let dt = OffsetDateTime::from_unix_timestamp(secs)?;
    Ok(PrimitiveDateTime::new(dt.date(), dt.time()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Decode an ingest body.  On failure returns every violation found, not
/// just the first one.
pub fn decode_payload(body: &[u8]) -> Result<Reading, Vec<String>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| vec![format!("body is not valid JSON: {e}")])?;
    parse_reading(&value)
}

pub fn parse_reading(value: &Value) -> Result<Reading, Vec<String>> {
    let Some(obj) = value.as_object() else {
        return Err(vec![format!(
            "body must be a JSON object, got {}",
            kind_of(value)
        )]);
    };

    let mut errors: Vec<String> = Vec::new();

    let methane = number_field(obj, "methane", &mut errors);
    let temperature = number_field(obj, "temperature", &mut errors);
    let ph = number_field(obj, "ph", &mut errors);

    let heat_status = string_field(obj, "heat_status", &mut errors).and_then(|s| {
        s.parse::<HeatStatus>()
            .map_err(|e| errors.push(e))
            .ok()
    });

    let timestamp = string_field(obj, "timestamp", &mut errors).and_then(|s| {
        parse_timestamp(s)
            .map_err(|e| {
                errors.push(format!(
                    "timestamp {s:?} is not in YYYY-MM-DD HH:MM:SS form ({e})"
                ))
            })
            .ok()
    });

    match (methane, temperature, ph, heat_status, timestamp) {
        (Some(methane), Some(temperature), Some(ph), Some(heat_status), Some(timestamp))
            if errors.is_empty() =>
        {
            Ok(Reading {
                methane,
                temperature,
                ph,
                heat_status,
                timestamp,
            })
        }
        _ => Err(errors),
    }
}

fn number_field(obj: &Map<String, Value>, name: &str, errors: &mut Vec<String>) -> Option<f64> {
    match obj.get(name) {
        None | Some(Value::Null) => {
            errors.push(format!("{name} is required"));
            None
        }
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => Some(v),
            None => {
                errors.push(format!("{name} is not representable as a float"));
                None
            }
        },
        Some(other) => {
            errors.push(format!("{name} must be a number, got {}", kind_of(other)));
            None
        }
    }
}

fn string_field<'a>(
    obj: &'a Map<String, Value>,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    match obj.get(name) {
        None | Some(Value::Null) => {
            errors.push(format!("{name} is required"));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            errors.push(format!("{name} must be a string, got {}", kind_of(other)));
            None
        }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ===========================================================================
// Tests
// ===========================================================================
