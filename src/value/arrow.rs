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

//! Columnar (Arrow) cell decoding.
//!
//! The warehouse encodes each logical type in one of several physical
//! layouts: fixed-point as 8/16/32/64-bit integers or 128-bit decimals,
//! naive and local timestamps as scaled epoch integers or
//! `{epoch, fraction}` structs, zoned timestamps as structs carrying a
//! biased timezone field. Every layout maps to the same [`TypedValue`]
//! output as the textual path.

use crate::error::{Error, Result};
use crate::types::options::QueryOptions;
use crate::types::wire::RowType;
use crate::value::text::localize;
use crate::value::{
    date_from_epoch_days, instant_from_epoch, offset_from_biased_minutes, split_scaled_epoch,
    LogicalType, TypedValue,
};
use arrow_array::{
    Array, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, RecordBatch, StringArray, StructArray,
    Time64NanosecondArray,
};
use arrow_schema::DataType;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::NaiveTime;

/// Decode every row of a record batch into typed rows aligned with the
/// declared row-type metadata.
pub fn decode_batch_rows(
    batch: &RecordBatch,
    row_type: &[RowType],
    options: &QueryOptions,
) -> Result<Vec<Vec<TypedValue>>> {
    if batch.num_columns() != row_type.len() {
        return Err(Error::protocol(format!(
            "batch has {} columns but the result set declares {}",
            batch.num_columns(),
            row_type.len()
        )));
    }

    let mut columns = Vec::with_capacity(batch.num_columns());
    for (array, meta) in batch.columns().iter().zip(row_type) {
        columns.push(decode_column(array.as_ref(), meta, options)?);
    }

    let rows = batch.num_rows();
    let mut out = Vec::with_capacity(rows);
    for row_idx in 0..rows {
        let mut row = Vec::with_capacity(columns.len());
        for column in &columns {
            row.push(column[row_idx].clone());
        }
        out.push(row);
    }
    Ok(out)
}

/// Decode a single Arrow column into typed values.
pub fn decode_column(
    array: &dyn Array,
    meta: &RowType,
    options: &QueryOptions,
) -> Result<Vec<TypedValue>> {
    match LogicalType::from_row_type(meta)? {
        LogicalType::Fixed => decode_fixed(array, meta, options),
        LogicalType::Real => {
            let arr = downcast::<Float64Array>(array, meta)?;
            Ok(each(arr, |a, i| Ok(TypedValue::Float(a.value(i))))?)
        }
        LogicalType::Boolean => {
            let arr = downcast::<BooleanArray>(array, meta)?;
            Ok(each(arr, |a, i| Ok(TypedValue::Bool(a.value(i))))?)
        }
        LogicalType::Text | LogicalType::Object | LogicalType::Variant | LogicalType::Array => {
            let arr = downcast::<StringArray>(array, meta)?;
            Ok(each(arr, |a, i| {
                Ok(TypedValue::Text(a.value(i).to_string()))
            })?)
        }
        LogicalType::Binary => {
            let arr = downcast::<BinaryArray>(array, meta)?;
            Ok(each(arr, |a, i| {
                Ok(TypedValue::Binary(a.value(i).to_vec()))
            })?)
        }
        LogicalType::Date => {
            let arr = downcast::<Date32Array>(array, meta)?;
            Ok(each(arr, |a, i| {
                let days = a.value(i) as i64;
                Ok(TypedValue::Date(date_from_epoch_days(
                    days,
                    meta,
                    &days.to_string(),
                )?))
            })?)
        }
        LogicalType::Time => decode_time(array, meta),
        LogicalType::TimestampNtz | LogicalType::TimestampLtz => {
            decode_timestamp(array, meta, options)
        }
        LogicalType::TimestampTz => decode_timestamp_tz(array, meta),
    }
}

fn decode_fixed(array: &dyn Array, meta: &RowType, options: &QueryOptions) -> Result<Vec<TypedValue>> {
    match array.data_type() {
        DataType::Decimal128(_, _) => {
            let arr = downcast::<Decimal128Array>(array, meta)?;
            each(arr, |a, i| fixed_value_i128(a.value(i), meta, options))
        }
        DataType::Int8 => {
            let arr = downcast::<Int8Array>(array, meta)?;
            each(arr, |a, i| fixed_value(a.value(i) as i64, meta, options))
        }
        DataType::Int16 => {
            let arr = downcast::<Int16Array>(array, meta)?;
            each(arr, |a, i| fixed_value(a.value(i) as i64, meta, options))
        }
        DataType::Int32 => {
            let arr = downcast::<Int32Array>(array, meta)?;
            each(arr, |a, i| fixed_value(a.value(i) as i64, meta, options))
        }
        DataType::Int64 => {
            let arr = downcast::<Int64Array>(array, meta)?;
            each(arr, |a, i| fixed_value(a.value(i), meta, options))
        }
        other => Err(Error::protocol(format!(
            "unexpected physical type {other:?} for fixed column {}",
            meta.name
        ))),
    }
}

/// Fixed-point value from a native-width integer mantissa.
fn fixed_value(mantissa: i64, meta: &RowType, options: &QueryOptions) -> Result<TypedValue> {
    if meta.scale == 0 {
        return Ok(TypedValue::Int(mantissa));
    }
    if options.higher_precision {
        Ok(TypedValue::Decimal(BigDecimal::new(
            BigInt::from(mantissa),
            meta.scale,
        )))
    } else {
        Ok(TypedValue::Float(
            mantissa as f64 / 10f64.powi(meta.scale as i32),
        ))
    }
}

/// Fixed-point value from a 128-bit decimal mantissa.
fn fixed_value_i128(mantissa: i128, meta: &RowType, options: &QueryOptions) -> Result<TypedValue> {
    if meta.scale == 0 {
        if let Ok(v) = i64::try_from(mantissa) {
            return Ok(TypedValue::Int(v));
        }
        return Ok(TypedValue::Decimal(BigDecimal::new(
            BigInt::from(mantissa),
            0,
        )));
    }
    if options.higher_precision {
        Ok(TypedValue::Decimal(BigDecimal::new(
            BigInt::from(mantissa),
            meta.scale,
        )))
    } else {
        Ok(TypedValue::Float(
            mantissa as f64 / 10f64.powi(meta.scale as i32),
        ))
    }
}

fn decode_time(array: &dyn Array, meta: &RowType) -> Result<Vec<TypedValue>> {
    let to_time = |secs: i64, nanos: u32| -> Result<TypedValue> {
        let raw = format!("{secs}.{nanos}");
        u32::try_from(secs)
            .ok()
            .filter(|s| *s < 86_400)
            .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos))
            .map(TypedValue::Time)
            .ok_or_else(|| Error::conversion(raw, &meta.column_type, "invalid time of day"))
    };

    match array.data_type() {
        DataType::Time64(_) => {
            let arr = downcast::<Time64NanosecondArray>(array, meta)?;
            each(arr, |a, i| {
                let (secs, nanos) = split_scaled_epoch(a.value(i), 9);
                to_time(secs, nanos)
            })
        }
        DataType::Int64 => {
            let arr = downcast::<Int64Array>(array, meta)?;
            each(arr, |a, i| {
                let (secs, nanos) = split_scaled_epoch(a.value(i), meta.scale);
                to_time(secs, nanos)
            })
        }
        DataType::Int32 => {
            let arr = downcast::<Int32Array>(array, meta)?;
            each(arr, |a, i| {
                let (secs, nanos) = split_scaled_epoch(a.value(i) as i64, meta.scale);
                to_time(secs, nanos)
            })
        }
        other => Err(Error::protocol(format!(
            "unexpected physical type {other:?} for time column {}",
            meta.name
        ))),
    }
}

/// Naive and local-timezone timestamps: either a scaled epoch integer or an
/// `{epoch, fraction}` struct for values exceeding 64-bit nanoseconds.
fn decode_timestamp(
    array: &dyn Array,
    meta: &RowType,
    options: &QueryOptions,
) -> Result<Vec<TypedValue>> {
    let local = meta.column_type == "timestamp_ltz";
    let finish = |secs: i64, nanos: u32| -> Result<TypedValue> {
        let raw = format!("{secs}.{nanos}");
        let instant = instant_from_epoch(secs, nanos, meta, &raw)?;
        Ok(TypedValue::Timestamp(if local {
            localize(instant, options)
        } else {
            instant.fixed_offset()
        }))
    };

    match array.data_type() {
        DataType::Int64 => {
            let arr = downcast::<Int64Array>(array, meta)?;
            each(arr, |a, i| {
                let (secs, nanos) = split_scaled_epoch(a.value(i), meta.scale);
                finish(secs, nanos)
            })
        }
        DataType::Struct(_) => {
            let arr = downcast::<StructArray>(array, meta)?;
            let epoch = struct_i64_field(arr, "epoch", meta)?;
            let fraction = struct_i32_field(arr, "fraction", meta)?;
            each(arr, |_, i| {
                let secs = epoch.value(i);
                let nanos = fraction.value(i) as u32;
                finish(secs, nanos)
            })
        }
        other => Err(Error::protocol(format!(
            "unexpected physical type {other:?} for {} column {}",
            meta.column_type, meta.name
        ))),
    }
}

/// Zoned timestamps: `{epoch, timezone}` (epoch scaled) or
/// `{epoch, fraction, timezone}` (epoch in whole seconds).
fn decode_timestamp_tz(array: &dyn Array, meta: &RowType) -> Result<Vec<TypedValue>> {
    let arr = downcast::<StructArray>(array, meta)?;
    let epoch = struct_i64_field(arr, "epoch", meta)?;
    let timezone = struct_i32_field(arr, "timezone", meta)?;
    let fraction = arr
        .column_by_name("fraction")
        .map(|col| {
            col.as_any().downcast_ref::<Int32Array>().ok_or_else(|| {
                Error::protocol(format!(
                    "fraction field of column {} is not int32",
                    meta.name
                ))
            })
        })
        .transpose()?;

    each(arr, |_, i| {
        let (secs, nanos) = match fraction {
            Some(frac) => (epoch.value(i), frac.value(i) as u32),
            None => split_scaled_epoch(epoch.value(i), meta.scale),
        };
        let raw = format!("{secs}.{nanos} {}", timezone.value(i));
        let offset = offset_from_biased_minutes(timezone.value(i) as i64, meta, &raw)?;
        let instant = instant_from_epoch(secs, nanos, meta, &raw)?;
        Ok(TypedValue::Timestamp(instant.with_timezone(&offset)))
    })
}

fn struct_i64_field<'a>(
    arr: &'a StructArray,
    name: &str,
    meta: &RowType,
) -> Result<&'a Int64Array> {
    arr.column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| {
            Error::protocol(format!(
                "missing int64 {name:?} field in struct column {}",
                meta.name
            ))
        })
}

fn struct_i32_field<'a>(
    arr: &'a StructArray,
    name: &str,
    meta: &RowType,
) -> Result<&'a Int32Array> {
    arr.column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| {
            Error::protocol(format!(
                "missing int32 {name:?} field in struct column {}",
                meta.name
            ))
        })
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, meta: &RowType) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::protocol(format!(
            "physical layout {:?} does not match logical type {} of column {}",
            array.data_type(),
            meta.column_type,
            meta.name
        ))
    })
}

fn each<A: Array, F>(array: &A, mut f: F) -> Result<Vec<TypedValue>>
where
    F: FnMut(&A, usize) -> Result<TypedValue>,
{
    let mut out = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        if array.is_null(i) {
            out.push(TypedValue::Null);
        } else {
            out.push(f(array, i)?);
        }
    }
    Ok(out)
}
