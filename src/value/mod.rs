// Copyright (c) 2025 Snowflake Rust Driver Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cell value decoding.
//!
//! Two wire encodings exist for row data: textual JSON cells and binary
//! columnar batches. Both decode into the same [`TypedValue`] variant, so a
//! consumer sees identical values regardless of encoding. `text` handles the
//! JSON path, `arrow` the columnar path.

pub mod arrow;
pub mod text;

use crate::error::{Error, Result};
use crate::types::wire::RowType;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

/// Minutes-bias applied to the timezone field of zoned timestamps on the
/// wire: stored offset = actual offset in minutes + 1440.
pub(crate) const TIMEZONE_OFFSET_BIAS_MINUTES: i64 = 1440;

/// A decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Int(i64),
    Float(f64),
    /// Arbitrary-precision numeric; produced in higher-precision mode and
    /// for fixed-point values exceeding the native integer range.
    Decimal(BigDecimal),
    Bool(bool),
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timezone-aware instant. Naive timestamps carry a zero offset.
    Timestamp(DateTime<FixedOffset>),
}

impl TypedValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }
}

/// Logical column types of the warehouse type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalType {
    Fixed,
    Real,
    Text,
    Boolean,
    Binary,
    Date,
    Time,
    TimestampNtz,
    TimestampLtz,
    TimestampTz,
    Object,
    Variant,
    Array,
}

impl LogicalType {
    pub(crate) fn from_row_type(meta: &RowType) -> Result<Self> {
        Ok(match meta.column_type.as_str() {
            "fixed" => LogicalType::Fixed,
            "real" => LogicalType::Real,
            "text" => LogicalType::Text,
            "boolean" => LogicalType::Boolean,
            "binary" => LogicalType::Binary,
            "date" => LogicalType::Date,
            "time" => LogicalType::Time,
            "timestamp_ntz" => LogicalType::TimestampNtz,
            "timestamp_ltz" => LogicalType::TimestampLtz,
            "timestamp_tz" => LogicalType::TimestampTz,
            "object" => LogicalType::Object,
            "variant" => LogicalType::Variant,
            "array" => LogicalType::Array,
            other => {
                return Err(Error::protocol(format!(
                    "unknown column type {other:?} for column {}",
                    meta.name
                )))
            }
        })
    }
}

/// Build a UTC instant from epoch seconds and a nanosecond part, surfacing a
/// conversion error when the instant falls outside the representable range
/// instead of wrapping.
pub(crate) fn instant_from_epoch(
    secs: i64,
    nanos: u32,
    meta: &RowType,
    raw: &str,
) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        Error::conversion(
            raw,
            meta.column_type.clone(),
            format!("epoch {secs}s {nanos}ns is outside the representable instant range"),
        )
    })
}

/// Resolve the wire timezone field of a zoned timestamp into a fixed offset.
pub(crate) fn offset_from_biased_minutes(
    biased: i64,
    meta: &RowType,
    raw: &str,
) -> Result<FixedOffset> {
    let minutes = biased - TIMEZONE_OFFSET_BIAS_MINUTES;
    let seconds = i32::try_from(minutes * 60).ok();
    seconds
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            Error::conversion(
                raw,
                meta.column_type.clone(),
                format!("invalid timezone offset {minutes} minutes"),
            )
        })
}

/// Convert a scaled epoch integer (units of 10^-scale seconds) into
/// (seconds, nanoseconds).
pub(crate) fn split_scaled_epoch(value: i64, scale: i64) -> (i64, u32) {
    let pow = 10i128.pow(scale.clamp(0, 9) as u32);
    let value = value as i128;
    let secs = value.div_euclid(pow);
    let frac = value.rem_euclid(pow);
    let nanos = frac * 10i128.pow(9 - scale.clamp(0, 9) as u32);
    // secs fits in i64 because |secs| <= |value| and value came from an i64
    (secs as i64, nanos as u32)
}

/// Date from days since the Unix epoch.
pub(crate) fn date_from_epoch_days(days: i64, meta: &RowType, raw: &str) -> Result<NaiveDate> {
    let secs = days.checked_mul(86_400).ok_or_else(|| {
        Error::conversion(raw, meta.column_type.clone(), "day count out of range")
    })?;
    Ok(instant_from_epoch(secs, 0, meta, raw)?.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(column_type: &str) -> RowType {
        RowType {
            column_type: column_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn split_scaled_epoch_variants() {
        assert_eq!(split_scaled_epoch(1_549_491_451, 0), (1_549_491_451, 0));
        assert_eq!(
            split_scaled_epoch(1_549_491_451_123, 3),
            (1_549_491_451, 123_000_000)
        );
        assert_eq!(
            split_scaled_epoch(1_549_491_451_123_456_789, 9),
            (1_549_491_451, 123_456_789)
        );
        // negative epochs round toward negative infinity, nanos stay positive
        assert_eq!(split_scaled_epoch(-1_500, 3), (-2, 500_000_000));
    }

    #[test]
    fn instant_out_of_range_is_an_error() {
        let err = instant_from_epoch(i64::MAX, 0, &meta("timestamp_ntz"), "raw").unwrap_err();
        assert!(matches!(err, Error::ValueConversion { .. }));
    }

    #[test]
    fn biased_offset_resolution() {
        let utc = offset_from_biased_minutes(1440, &meta("timestamp_tz"), "raw").unwrap();
        assert_eq!(utc.local_minus_utc(), 0);
        let pacific = offset_from_biased_minutes(960, &meta("timestamp_tz"), "raw").unwrap();
        assert_eq!(pacific.local_minus_utc(), -480 * 60);
    }

    #[test]
    fn date_from_days() {
        let date = date_from_epoch_days(0, &meta("date"), "0").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let date = date_from_epoch_days(18_262, &meta("date"), "18262").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    }

    #[test]
    fn unknown_logical_type_is_protocol_violation() {
        let err = LogicalType::from_row_type(&meta("geometry")).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
