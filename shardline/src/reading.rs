//! The reading value type.
//!
//! A [`Reading`] is one scalar sensor measurement: the source it came from,
//! the UTC instant it was taken at, and the measured value.
//!
//! # Identity
//!
//! A reading's identity is its [`key`](Reading::key): the source joined with
//! the canonical timestamp text. Two readings with the same key describe the
//! same measurement slot even if their values differ, which is what lets a
//! newer value supersede a stored one during a merge. The derived
//! `PartialEq` compares all three fields; use [`Reading::same_key`] and
//! [`Reading::key_cmp`] for identity and ordering.
//!
//! # Sources
//!
//! Sources follow the `NETWORK_STATION_LOCATION_CHANNEL` convention. The
//! parts are available through [`Reading::network`] and friends; missing
//! parts read as empty strings.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};

use crate::codec::Precision;
use crate::error::FormatError;

/// Number of fields in an encoded reading.
pub const FIELD_COUNT: usize = 3;

const EPOCH_FIELD: usize = 0;
const SOURCE_FIELD: usize = 1;
const VALUE_FIELD: usize = 2;

// RFC3339 only has room for four-digit years.
const MIN_YEAR: i32 = 0;
const MAX_YEAR: i32 = 9999;

const NETWORK_PART: usize = 0;
const STATION_PART: usize = 1;
const LOCATION_PART: usize = 2;
const CHANNEL_PART: usize = 3;

/// A single time-stamped sensor measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Source identifier, `NETWORK_STATION_LOCATION_CHANNEL` by convention.
    pub source: String,
    /// When the measurement was taken.
    pub epoch: DateTime<Utc>,
    /// The measured value.
    pub value: f64,
}

impl Reading {
    /// Creates a reading.
    pub fn new(source: impl Into<String>, epoch: DateTime<Utc>, value: f64) -> Self {
        Self {
            source: source.into(),
            epoch,
            value,
        }
    }

    fn source_part(&self, index: usize) -> &str {
        self.source.split('_').nth(index).unwrap_or("")
    }

    /// Network code, the first `_` separated part of the source.
    pub fn network(&self) -> &str {
        self.source_part(NETWORK_PART)
    }

    /// Station code, the second part of the source.
    pub fn station(&self) -> &str {
        self.source_part(STATION_PART)
    }

    /// Location code, the third part of the source.
    pub fn location(&self) -> &str {
        self.source_part(LOCATION_PART)
    }

    /// Channel code, the fourth part of the source.
    pub fn channel(&self) -> &str {
        self.source_part(CHANNEL_PART)
    }

    /// Canonical RFC3339 UTC text of the epoch, as persisted.
    pub fn timestamp(&self) -> String {
        format_timestamp(&self.epoch)
    }

    /// The deduplication key: source and canonical timestamp.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.timestamp())
    }

    /// Canonical ordering: source bytes ascending, then epoch ascending.
    ///
    /// Returns `Equal` exactly when both readings have the same key,
    /// regardless of value.
    pub fn key_cmp(&self, other: &Self) -> Ordering {
        self.source
            .cmp(&other.source)
            .then_with(|| self.epoch.cmp(&other.epoch))
    }

    /// Whether both readings share a key.
    pub fn same_key(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }

    /// Encodes the reading as `[timestamp, source, value]`.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::EpochRange`] at line 0 if the epoch falls
    /// outside years 0000 to 9999, which RFC3339 text cannot carry.
    pub fn encode(&self, precision: Precision) -> Result<[String; FIELD_COUNT], FormatError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.epoch.year()) {
            return Err(FormatError::EpochRange {
                line: 0,
                value: self.timestamp(),
            });
        }
        Ok([
            self.timestamp(),
            self.source.clone(),
            precision.format_value(self.value),
        ])
    }

    /// Decodes a reading from `[timestamp, source, value]`.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] at line 0 if the field count is wrong, the
    /// timestamp is not RFC3339, or the value is not a float.
    pub fn decode<S: AsRef<str>>(fields: &[S]) -> Result<Self, FormatError> {
        if fields.len() != FIELD_COUNT {
            return Err(FormatError::FieldCount {
                line: 0,
                count: fields.len(),
            });
        }

        let epoch = parse_timestamp(fields[EPOCH_FIELD].as_ref())?;

        let text = fields[VALUE_FIELD].as_ref();
        let value = text.parse::<f64>().map_err(|e| FormatError::Value {
            line: 0,
            value: text.to_string(),
            source: e,
        })?;

        Ok(Self {
            source: fields[SOURCE_FIELD].as_ref().to_string(),
            epoch,
            value,
        })
    }

    /// Returns a copy with the value multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        self.calibrated(factor, 0.0)
    }

    /// Returns a copy with the value mapped through `value * scale + offset`.
    #[must_use]
    pub fn calibrated(&self, scale: f64, offset: f64) -> Self {
        Self {
            source: self.source.clone(),
            epoch: self.epoch,
            value: self.value * scale + offset,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp(),
            self.source,
            Precision::Shortest.format_value(self.value)
        )
    }
}

/// Multiplies every reading's value by `factor`.
pub fn scale_all(readings: &[Reading], factor: f64) -> Vec<Reading> {
    readings.iter().map(|r| r.scaled(factor)).collect()
}

/// Formats an instant as `YYYY-MM-DDTHH:MM:SS[.fraction]Z`.
///
/// The fraction carries nanoseconds with trailing zeros trimmed and is left
/// out entirely for whole seconds.
pub fn format_timestamp(epoch: &DateTime<Utc>) -> String {
    let mut text = epoch.format("%Y-%m-%dT%H:%M:%S").to_string();

    // leap seconds report nanos past 1e9
    let nanos = epoch.timestamp_subsec_nanos() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }

    text.push('Z');
    text
}

/// Parses RFC3339 text into a UTC instant.
///
/// # Errors
///
/// Returns [`FormatError::Timestamp`] at line 0 if the text is not RFC3339.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, FormatError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FormatError::Timestamp {
            line: 0,
            value: text.to_string(),
            source: e,
        })
}
