//! Record codecs for shard files.
//!
//! The storage engine never touches the persisted format directly; it goes
//! through the [`Codec`] capability so an alternate serialization can be
//! swapped in without changing merge or store logic.
//!
//! # CSV format
//!
//! [`CsvCodec`] writes one reading per row, no header, three fields:
//!
//! ```text
//! 2016-08-02T04:00:00Z,NZ_APIM_50_LFZ,-41221
//! 2016-08-02T04:00:01Z,NZ_APIM_50_LFZ,-41220.5
//! ```
//!
//! Re-encoding decoded content at the same precision reproduces the input
//! byte for byte.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result, StorageIoError};
use crate::reading::Reading;

/// How values are rendered as text.
///
/// Serializes as a signed integer: `-1` (or any negative) for
/// [`Precision::Shortest`], `n >= 0` for [`Precision::Fixed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Precision {
    /// Shortest decimal text that parses back to the same float.
    #[default]
    Shortest,
    /// Fixed-point with this many digits after the decimal point.
    Fixed(usize),
}

impl Precision {
    /// Formats `value` at this precision.
    pub fn format_value(self, value: f64) -> String {
        match self {
            Self::Shortest => format!("{value}"),
            Self::Fixed(places) => format!("{value:.places$}"),
        }
    }
}

impl From<i32> for Precision {
    fn from(places: i32) -> Self {
        usize::try_from(places).map_or(Self::Shortest, Self::Fixed)
    }
}

impl From<Precision> for i32 {
    fn from(precision: Precision) -> Self {
        match precision {
            Precision::Shortest => -1,
            Precision::Fixed(places) => i32::try_from(places).unwrap_or(i32::MAX),
        }
    }
}

/// Decode/encode capability for a collection of readings.
pub trait Codec {
    /// Decodes every record in `input`.
    ///
    /// Decoding is all-or-nothing: the first bad record fails the call and
    /// no readings are returned.
    ///
    /// # Errors
    ///
    /// Returns a format error naming the line of the first bad record.
    fn decode(&self, input: &[u8]) -> Result<Vec<Reading>>;

    /// Encodes `readings` in the order given.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder cannot produce its output.
    fn encode(&self, readings: &[Reading]) -> Result<Vec<u8>>;
}

/// Comma-separated `timestamp,source,value` rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvCodec {
    /// Precision used when encoding values.
    pub precision: Precision,
}

impl CsvCodec {
    /// Creates a codec writing values at `precision`.
    pub fn new(precision: Precision) -> Self {
        Self { precision }
    }
}

impl Codec for CsvCodec {
    fn decode(&self, input: &[u8]) -> Result<Vec<Reading>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut readings = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| FormatError::Csv { source: e })?;
            let line = record
                .position()
                .map_or(index as u64 + 1, csv::Position::line);
            let fields: Vec<&str> = record.iter().collect();
            let reading = Reading::decode(&fields).map_err(|e| e.at_line(line))?;
            readings.push(reading);
        }

        Ok(readings)
    }

    fn encode(&self, readings: &[Reading]) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        for (index, reading) in readings.iter().enumerate() {
            let fields = reading
                .encode(self.precision)
                .map_err(|e| e.at_line(index as u64 + 1))?;
            writer
                .write_record(fields)
                .map_err(|e| FormatError::Csv { source: e })?;
        }

        let bytes = writer.into_inner().map_err(|e| StorageIoError::Encode {
            source: e.into_error(),
        })?;
        Ok(bytes)
    }
}

/// Reads all of `reader` and decodes it with `codec`.
///
/// # Errors
///
/// Returns an I/O error if reading fails, or the codec's decode error.
pub fn read_readings<R: Read, C: Codec + ?Sized>(mut reader: R, codec: &C) -> Result<Vec<Reading>> {
    let mut input = Vec::new();
    reader
        .read_to_end(&mut input)
        .map_err(|e| StorageIoError::Read {
            path: "<stream>".into(),
            source: e,
        })?;
    codec.decode(&input)
}

/// Encodes `readings` with `codec` and writes them to `writer`.
///
/// # Errors
///
/// Returns the codec's encode error, or an I/O error if writing fails.
pub fn write_readings<W: Write, C: Codec + ?Sized>(
    mut writer: W,
    codec: &C,
    readings: &[Reading],
) -> Result<()> {
    let bytes = codec.encode(readings)?;
    writer
        .write_all(&bytes)
        .and_then(|()| writer.flush())
        .map_err(|e| StorageIoError::Write {
            path: "<stream>".into(),
            source: e,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "2016-08-02T04:00:00Z,NZ_APIM_50_LFZ,-41221\n\
                          2016-08-02T04:00:01Z,NZ_APIM_50_LFZ,-41220.5\n\
                          2016-08-02T04:00:02.25Z,NZ_APIM_50_LFZ,-37449\n";

    #[test]
    fn test_precision_from_i32() {
        assert_eq!(Precision::from(-1), Precision::Shortest);
        assert_eq!(Precision::from(-7), Precision::Shortest);
        assert_eq!(Precision::from(0), Precision::Fixed(0));
        assert_eq!(Precision::from(3), Precision::Fixed(3));
        assert_eq!(i32::from(Precision::Shortest), -1);
        assert_eq!(i32::from(Precision::Fixed(4)), 4);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(Precision::Shortest.format_value(1.0), "1");
        assert_eq!(Precision::Shortest.format_value(0.1), "0.1");
        assert_eq!(Precision::Shortest.format_value(-41220.5), "-41220.5");
        assert_eq!(Precision::Fixed(0).format_value(2.7), "3");
        assert_eq!(Precision::Fixed(3).format_value(1.0), "1.000");
        assert_eq!(Precision::Fixed(2).format_value(-0.1), "-0.10");
    }

    #[test]
    fn test_precision_serde() {
        let p: Precision = serde_json::from_str("-1").unwrap();
        assert_eq!(p, Precision::Shortest);
        let p: Precision = serde_json::from_str("2").unwrap();
        assert_eq!(p, Precision::Fixed(2));
        assert_eq!(serde_json::to_string(&Precision::Fixed(5)).unwrap(), "5");
    }

    #[test]
    fn test_decode_sample() {
        let readings = CsvCodec::default().decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].source, "NZ_APIM_50_LFZ");
        assert_eq!(
            readings[0].epoch,
            Utc.with_ymd_and_hms(2016, 8, 2, 4, 0, 0).unwrap()
        );
        assert!((readings[1].value + 41220.5).abs() < 1.0e-9);
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let codec = CsvCodec::default();
        let readings = codec.decode(SAMPLE.as_bytes()).unwrap();
        let encoded = codec.encode(&readings).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), SAMPLE);
    }

    #[test]
    fn test_fixed_precision_encode() {
        let codec = CsvCodec::new(Precision::Fixed(1));
        let readings = vec![Reading::new(
            "a",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            2.0,
        )];
        let encoded = codec.encode(&readings).unwrap();
        assert_eq!(encoded, b"2020-01-01T00:00:00Z,a,2.0\n");
    }

    #[test]
    fn test_empty_input() {
        let codec = CsvCodec::default();
        assert!(codec.decode(b"").unwrap().is_empty());
        assert!(codec.encode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_is_all_or_nothing() {
        let input = "2016-08-02T04:00:00Z,a,1\n\
                     2016-08-02T04:00:01Z,a,2\n\
                     2016-08-02T04:00:02Z,a,oops\n\
                     2016-08-02T04:00:03Z,a,4\n";
        let err = CsvCodec::default().decode(input.as_bytes()).unwrap_err();
        match err {
            crate::ShardError::Format(e) => {
                assert!(matches!(e, FormatError::Value { .. }));
                assert_eq!(e.line(), Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_reports_field_count_line() {
        let input = "2016-08-02T04:00:00Z,a,1\n2016-08-02T04:00:01Z,a\n";
        let err = CsvCodec::default().decode(input.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "format error: line 2: invalid sample element length: 2"
        );
    }

    #[test]
    fn test_source_with_comma_is_quoted() {
        let codec = CsvCodec::default();
        let readings = vec![Reading::new(
            "odd,source",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            1.0,
        )];
        let encoded = codec.encode(&readings).unwrap();
        assert_eq!(encoded, b"2020-01-01T00:00:00Z,\"odd,source\",1\n");
        assert_eq!(codec.decode(&encoded).unwrap(), readings);
    }

    #[test]
    fn test_encode_refuses_unreadable_epoch() {
        let codec = CsvCodec::default();
        let readings = vec![
            Reading::new("a", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(), 1.0),
            Reading::new("a", Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap(), 1.0),
        ];
        match codec.encode(&readings).unwrap_err() {
            crate::ShardError::Format(e) => {
                assert!(matches!(e, FormatError::EpochRange { .. }));
                assert_eq!(e.line(), Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stream_helpers() {
        let codec = CsvCodec::default();
        let readings = read_readings(SAMPLE.as_bytes(), &codec).unwrap();

        let mut out = Vec::new();
        write_readings(&mut out, &codec, &readings).unwrap();
        assert_eq!(out, SAMPLE.as_bytes());
    }
}
