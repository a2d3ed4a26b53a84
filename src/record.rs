//! Raw rows exchanged with the remote table store.
//!
//! Both tables are fetched in full and never mutated once decoded. The
//! insert payload the collector submits is [`EnvironmentalReading`]; the
//! store fills in `timestamp` server-side.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of an order. The store may hand it out as text or as an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Int(n) => Self(n.to_string()),
        })
    }
}

/// One row of `order_fulfillment_data`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FulfillmentRecord {
    pub order_id: OrderId,
    /// Absent or `null` rows decode as `None`.
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    /// `None` until the order ships.
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub ship_date: Option<DateTime<Utc>>,
    /// Join key against the environmental readings.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub pack_date: DateTime<Utc>,
    /// Present iff a defect was reported for the order.
    #[serde(default)]
    pub defect_reported: Option<serde_json::Value>,
    /// Remaining order metadata, carried through untouched.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl FulfillmentRecord {
    /// Whether a defect was reported. A JSON `null` counts as no defect.
    pub fn has_defect(&self) -> bool {
        matches!(&self.defect_reported, Some(v) if !v.is_null())
    }
}

/// One row of `shipdock_environmental_data`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EnvironmentalRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Decibels.
    pub noise_level: f64,
    /// Degrees Fahrenheit.
    pub temperature: f64,
}

/// Insert payload submitted by the collector once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvironmentalReading {
    pub noise_level: f64,
    pub temperature: i32,
}

/// Parses the timestamp shapes the table store emits.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f][±HH:MM]`, naive date-times and
/// bare dates. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp {raw:?}")))
}

fn deserialize_optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp {raw:?}"))),
        _ => Ok(None),
    }
}
