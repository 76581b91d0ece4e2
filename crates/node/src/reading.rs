//! The reading a cycle produces and its JSON wire form.

use serde::{Serialize, Serializer};
use std::fmt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// `YYYY-MM-DD HH:MM:SS`, as the collector expects it.
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
    pub fn is_on(self) -> bool {
        self == HeatStatus::On
    }
}

impl fmt::Display for HeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One sampling cycle's worth of data.  Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub methane: f64,
    pub temperature: f64,
    pub ph: f64,
    pub heat_status: HeatStatus,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: PrimitiveDateTime,
}

impl Reading {
    /// Build a reading, rounding the measurements to two decimals.
    pub fn new(
        methane: f64,
        temperature: f64,
        ph: f64,
        heat_status: HeatStatus,
        timestamp: PrimitiveDateTime,
    ) -> Self {
        Self {
            methane: round2(methane),
            temperature: round2(temperature),
            ph: round2(ph),
            heat_status,
            timestamp,
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &PrimitiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    let text = ts.format(WIRE_FORMAT).map_err(serde::ser::Error::custom)?;
    s.serialize_str(&text)
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Current UTC wall-clock time truncated to whole seconds.
pub fn now_utc_seconds() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    let now = PrimitiveDateTime::new(now.date(), now.time());
    now.replace_nanosecond(0).unwrap_or(now)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn serializes_in_wire_shape() {
        let r = Reading::new(
            433.8709,
            200.0,
            6.987,
            HeatStatus::Off,
            datetime!(2024-03-05 07:08:09),
        );
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["methane"], 433.87);
        assert_eq!(json["temperature"], 200.0);
        assert_eq!(json["ph"], 6.99);
        assert_eq!(json["heat_status"], "OFF");
        assert_eq!(json["timestamp"], "2024-03-05 07:08:09");
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[test]
    fn serialized_field_order_matches_wire() {
        let r = Reading::new(1.0, 2.0, 3.0, HeatStatus::On, datetime!(2024-01-01 00:00:00));
        let text = serde_json::to_string(&r).unwrap();
        assert_eq!(
            text,
            r#"{"methane":1.0,"temperature":2.0,"ph":3.0,"heat_status":"ON","timestamp":"2024-01-01 00:00:00"}"#
        );
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(-2.345_6), -2.35);
        assert_eq!(round2(7.0), 7.0);
    }

    #[test]
    fn now_has_no_subsecond_part() {
        let now = now_utc_seconds();
        assert_eq!(now.nanosecond(), 0);
        assert!(now.year() >= 2024);
    }

    #[test]
    fn heat_status_display() {
        assert_eq!(HeatStatus::On.to_string(), "ON");
        assert_eq!(HeatStatus::Off.to_string(), "OFF");
        assert!(HeatStatus::On.is_on());
        assert!(!HeatStatus::Off.is_on());
    }
}
