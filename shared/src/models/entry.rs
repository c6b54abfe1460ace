//! CGM entry data model.
//!
//! Defines the raw `Entry` structure returned by the Nightscout entries API
//! and the validated `Reading` that is forwarded to the metrics backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A raw CGM entry as returned by `GET /api/v1/entries.json`.
///
/// Every field is optional at the serde layer: upstream payloads are not
/// trusted, and a record missing its required fields must still deserialize
/// so it can be rejected (and logged in full) by [`Entry::to_reading`].
/// Unknown upstream fields are ignored.
///
/// # Example
///
/// ```
/// use shared::models::Entry;
///
/// let entry: Entry = serde_json::from_str(
///     r#"{"date": 1700000000000, "sgv": 120, "direction": "Flat"}"#,
/// )
/// .unwrap();
///
/// assert_eq!(entry.date, Some(1_700_000_000_000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Record timestamp, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,

    /// Sensor glucose value in mg/dL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sgv: Option<f64>,

    /// Human-readable timestamp as reported by the uploader.
    #[serde(
        default,
        rename = "dateString",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_string: Option<String>,

    /// Glucose trend direction (e.g. "Flat", "FortyFiveUp").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,

    /// Identifier of the uploading device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Errors that can occur when validating an entry into a reading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryValidationError {
    /// The record has no `date` field.
    #[error("Missing 'date' field in record")]
    MissingDate,

    /// The record has no `sgv` field.
    #[error("Missing 'sgv' field in record")]
    MissingValue,
}

impl Entry {
    /// Validates this entry into a [`Reading`].
    ///
    /// # Errors
    ///
    /// Returns an error if the `date` or `sgv` field is absent.
    pub fn to_reading(&self) -> Result<Reading, EntryValidationError> {
        let timestamp_ms = self.date.ok_or(EntryValidationError::MissingDate)?;
        let value = self.sgv.ok_or(EntryValidationError::MissingValue)?;

        Ok(Reading {
            timestamp_ms,
            value,
        })
    }
}

/// A validated CGM reading: the only shape the emitter ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Timestamp of the reading, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,

    /// Glucose value in mg/dL.
    pub value: f64,
}

impl Reading {
    /// Returns the reading timestamp as a UTC datetime, if representable.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }

    /// Returns the reading timestamp rendered as RFC 3339 for log output.
    ///
    /// Falls back to the raw millisecond value if the timestamp does not fit
    /// the chrono range.
    #[must_use]
    pub fn timestamp_rfc3339(&self) -> String {
        match self.timestamp() {
            Some(dt) => dt.to_rfc3339(),
            None => format!("{}ms", self.timestamp_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_reading_valid() {
        let entry = Entry {
            date: Some(1_700_000_000_000),
            sgv: Some(120.0),
            ..Entry::default()
        };

        let reading = entry.to_reading().unwrap();
        assert_eq!(reading.timestamp_ms, 1_700_000_000_000);
        assert_eq!(reading.value, 120.0);
    }

    #[test]
    fn test_to_reading_missing_date() {
        let entry = Entry {
            sgv: Some(120.0),
            ..Entry::default()
        };

        assert_eq!(
            entry.to_reading().unwrap_err(),
            EntryValidationError::MissingDate
        );
    }

    #[test]
    fn test_to_reading_missing_value() {
        let entry = Entry {
            date: Some(1_700_000_000_000),
            ..Entry::default()
        };

        assert_eq!(
            entry.to_reading().unwrap_err(),
            EntryValidationError::MissingValue
        );
    }

    #[test]
    fn test_deserialize_realistic_payload() {
        // A realistic upstream record, including fields we do not model.
        let json = r#"{
            "_id": "65f1c2d3e4a5b6c7d8e9f0a1",
            "type": "sgv",
            "date": 1700000000000,
            "dateString": "2023-11-14T22:13:20.000Z",
            "sgv": 118,
            "direction": "Flat",
            "device": "xDrip-DexcomG6",
            "utcOffset": 0,
            "sysTime": "2023-11-14T22:13:20.000Z"
        }"#;

        let entry: Entry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.date, Some(1_700_000_000_000));
        assert_eq!(entry.sgv, Some(118.0));
        assert_eq!(entry.date_string.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(entry.direction.as_deref(), Some("Flat"));
        assert_eq!(entry.device.as_deref(), Some("xDrip-DexcomG6"));
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let entry: Entry = serde_json::from_str(r#"{"sgv": 120}"#).unwrap();
        assert_eq!(entry.date, None);
        assert_eq!(entry.sgv, Some(120.0));
        assert!(entry.to_reading().is_err());
    }

    #[test]
    fn test_deserialize_entry_array() {
        let entries: Vec<Entry> =
            serde_json::from_str(r#"[{"date": 1000, "sgv": 120}]"#).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, Some(1000));
    }

    #[test]
    fn test_reading_rfc3339() {
        let reading = Reading {
            timestamp_ms: 1_700_000_000_000,
            value: 120.0,
        };

        assert_eq!(reading.timestamp_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn test_reading_rfc3339_out_of_range() {
        let reading = Reading {
            timestamp_ms: i64::MAX,
            value: 120.0,
        };

        assert_eq!(reading.timestamp_rfc3339(), format!("{}ms", i64::MAX));
    }

    #[test]
    fn test_entry_serialization_roundtrip() {
        let entry = Entry {
            date: Some(1000),
            sgv: Some(99.0),
            direction: Some("Flat".to_string()),
            ..Entry::default()
        };

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, deserialized);
    }
}
