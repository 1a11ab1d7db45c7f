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

//! Textual (JSON) cell decoding.
//!
//! JSON result sets deliver every cell as a nullable string. The encodings:
//! fixed-point numbers as decimal strings, booleans as `1`/`0` or
//! `true`/`false`, binary as hex, dates as days since the epoch, times as
//! `<seconds>.<fraction>` since midnight, naive and local timestamps as
//! `<epoch-seconds>.<fraction>`, and zoned timestamps with a trailing
//! space-separated biased offset in minutes.

use crate::error::{Error, Result};
use crate::types::options::QueryOptions;
use crate::types::wire::RowType;
use crate::value::{
    date_from_epoch_days, instant_from_epoch, offset_from_biased_minutes, LogicalType, TypedValue,
};
use bigdecimal::BigDecimal;
use chrono::{FixedOffset, NaiveTime, Utc};
use std::str::FromStr;

/// Decode one textual cell into a [`TypedValue`].
pub fn decode_text(
    cell: Option<&str>,
    meta: &RowType,
    options: &QueryOptions,
) -> Result<TypedValue> {
    let Some(raw) = cell else {
        return Ok(TypedValue::Null);
    };

    match LogicalType::from_row_type(meta)? {
        LogicalType::Fixed => decode_fixed(raw, meta, options),
        LogicalType::Real => raw
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string())),
        LogicalType::Text | LogicalType::Object | LogicalType::Variant | LogicalType::Array => {
            Ok(TypedValue::Text(raw.to_string()))
        }
        LogicalType::Boolean => match raw {
            "1" | "true" | "TRUE" => Ok(TypedValue::Bool(true)),
            "0" | "false" | "FALSE" => Ok(TypedValue::Bool(false)),
            _ => Err(Error::conversion(raw, &meta.column_type, "not a boolean")),
        },
        LogicalType::Binary => hex::decode(raw)
            .map(TypedValue::Binary)
            .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string())),
        LogicalType::Date => {
            let days = raw
                .parse::<i64>()
                .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))?;
            Ok(TypedValue::Date(date_from_epoch_days(days, meta, raw)?))
        }
        LogicalType::Time => decode_time(raw, meta),
        LogicalType::TimestampNtz => {
            let (secs, nanos) = extract_timestamp(raw, meta)?;
            let instant = instant_from_epoch(secs, nanos, meta, raw)?;
            Ok(TypedValue::Timestamp(instant.fixed_offset()))
        }
        LogicalType::TimestampLtz => {
            let (secs, nanos) = extract_timestamp(raw, meta)?;
            let instant = instant_from_epoch(secs, nanos, meta, raw)?;
            Ok(TypedValue::Timestamp(localize(instant, options)))
        }
        LogicalType::TimestampTz => decode_timestamp_tz(raw, meta),
    }
}

/// Apply the session timezone to a local-timezone instant. The instant itself
/// is unchanged; only the displayed offset moves.
pub(crate) fn localize(
    instant: chrono::DateTime<Utc>,
    options: &QueryOptions,
) -> chrono::DateTime<FixedOffset> {
    match options.timezone {
        Some(tz) if !options.original_timestamp => instant.with_timezone(&tz),
        _ => instant.fixed_offset(),
    }
}

fn decode_fixed(raw: &str, meta: &RowType, options: &QueryOptions) -> Result<TypedValue> {
    if meta.scale == 0 {
        if let Ok(v) = raw.parse::<i64>() {
            return Ok(TypedValue::Int(v));
        }
        // beyond the native integer range; preserve exactly
        return BigDecimal::from_str(raw)
            .map(TypedValue::Decimal)
            .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()));
    }
    if options.higher_precision {
        BigDecimal::from_str(raw)
            .map(TypedValue::Decimal)
            .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))
    } else {
        raw.parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))
    }
}

fn decode_time(raw: &str, meta: &RowType) -> Result<TypedValue> {
    let (secs, nanos) = extract_timestamp(raw, meta)?;
    let secs = u32::try_from(secs)
        .ok()
        .filter(|s| *s < 86_400)
        .ok_or_else(|| Error::conversion(raw, &meta.column_type, "seconds out of day range"))?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(TypedValue::Time)
        .ok_or_else(|| Error::conversion(raw, &meta.column_type, "invalid time of day"))
}

fn decode_timestamp_tz(raw: &str, meta: &RowType) -> Result<TypedValue> {
    let (epoch_part, offset_part) = raw
        .split_once(' ')
        .ok_or_else(|| Error::conversion(raw, &meta.column_type, "missing timezone offset"))?;
    let (secs, nanos) = extract_timestamp(epoch_part, meta)?;
    let biased = offset_part
        .parse::<i64>()
        .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))?;
    let offset = offset_from_biased_minutes(biased, meta, raw)?;
    let instant = instant_from_epoch(secs, nanos, meta, raw)?;
    Ok(TypedValue::Timestamp(instant.with_timezone(&offset)))
}

/// Split an `<epoch-seconds>.<fraction>` string into seconds and nanoseconds.
/// The fraction is right-padded to nine digits; both parts must be numeric.
fn extract_timestamp(raw: &str, meta: &RowType) -> Result<(i64, u32)> {
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (raw, None),
    };

    let secs = whole
        .parse::<i64>()
        .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))?;

    let nanos = match frac {
        None | Some("") => 0,
        Some(f) => {
            if f.len() > 9 || !f.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::conversion(
                    raw,
                    &meta.column_type,
                    "malformed fractional seconds",
                ));
            }
            let digits = f
                .parse::<u32>()
                .map_err(|e| Error::conversion(raw, &meta.column_type, e.to_string()))?;
            digits * 10u32.pow(9 - f.len() as u32)
        }
    };

    if secs < 0 && nanos != 0 {
        // wire encoding for negative epochs carries the fraction as a
        // magnitude past the next lower second
        return Ok((secs - 1, 1_000_000_000 - nanos));
    }
    Ok((secs, nanos))
}
