//! Column decoder
//!
//! Decoding runs in two steps. The wire value is first turned into the
//! plain host value for its wire type. When casting is enabled, that value
//! is then reinterpreted by the column's declared type: DECIMAL, DATE,
//! TIMESTAMP, TIME and BIT get richer host types, every other declared
//! type passes through.

use crate::core::column::ColumnInfo;
use crate::core::decimal::Decimal;
use crate::core::driver::WireValue;
use crate::core::error::{DatabaseError, Result};
use crate::core::options::Settings;
use crate::core::types::{Charset, DeclaredType, Timezone};
use crate::core::value::HostValue;
use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};

/// Date that TIME values are placed on
pub fn default_time_only_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

/// How column values are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub cast: bool,
    pub database_timezone: Timezone,
    pub time_only_date: NaiveDate,
    pub charset: Charset,
}

impl DecodeOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cast: settings.cast,
            database_timezone: settings.database_timezone,
            time_only_date: default_time_only_date(),
            charset: settings.charset,
        }
    }

    /// Raw wire-typed values, no casting
    pub fn raw() -> Self {
        Self {
            cast: false,
            ..Self::default()
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Decode one column value
pub fn decode(value: WireValue, column: &ColumnInfo, options: &DecodeOptions) -> Result<HostValue> {
    let raw = decode_raw(value, options.charset)?;
    if !options.cast || raw.is_null() {
        return Ok(raw);
    }
    cast(raw, column, options)
}

fn decode_raw(value: WireValue, charset: Charset) -> Result<HostValue> {
    let decoded = match value {
        WireValue::Null => HostValue::Null,
        WireValue::Binary(bytes) => HostValue::Bytes(bytes),
        WireValue::String(bytes) => HostValue::Text(charset.decode(&bytes)),
        WireValue::Double(v) => HostValue::Double(v),
        WireValue::Val64(v) => HostValue::Integer(v.into()),
        WireValue::UVal64(v) => HostValue::Integer(v.into()),
        WireValue::Val32(v) => HostValue::Integer(v.into()),
        WireValue::UVal32(v) => HostValue::Integer(v.into()),
        WireValue::Val16(v) => HostValue::Integer(v.into()),
        WireValue::UVal16(v) => HostValue::Integer(v.into()),
        WireValue::Val8(v) => HostValue::Integer(v.into()),
        WireValue::UVal8(v) => HostValue::Integer(v.into()),
        WireValue::Invalid => return Err(DatabaseError::type_error("Invalid Data Type")),
    };
    Ok(decoded)
}

fn cast(raw: HostValue, column: &ColumnInfo, options: &DecodeOptions) -> Result<HostValue> {
    let value = match column.declared_type {
        DeclaredType::Decimal => HostValue::Decimal(to_decimal(&raw, column)?),
        DeclaredType::Date => HostValue::Date(parse_date(text_of(&raw, column)?)?),
        DeclaredType::Timestamp => {
            let parsed = parse_timestamp(text_of(&raw, column)?)?;
            HostValue::Timestamp(convert_zone(parsed, options.database_timezone))
        }
        DeclaredType::Time => {
            let parsed = parse_time(text_of(&raw, column)?, options.time_only_date)?;
            HostValue::Timestamp(convert_zone(parsed, options.database_timezone))
        }
        DeclaredType::Bit => match raw {
            HostValue::Integer(v) => HostValue::Bool(v == 1),
            other => return Err(cast_error(&other, column)),
        },
        _ => raw,
    };
    Ok(value)
}

fn cast_error(raw: &HostValue, column: &ColumnInfo) -> DatabaseError {
    DatabaseError::type_error(format!(
        "Cannot cast {} value of column '{}' to {:?}",
        raw.type_name(),
        column.name,
        column.declared_type
    ))
}

fn text_of<'a>(raw: &'a HostValue, column: &ColumnInfo) -> Result<&'a str> {
    raw.as_str().ok_or_else(|| cast_error(raw, column))
}

fn to_decimal(raw: &HostValue, column: &ColumnInfo) -> Result<Decimal> {
    match raw {
        HostValue::Text(text) => text.parse(),
        HostValue::Integer(v) => Ok(Decimal::from(*v)),
        HostValue::Double(v) if v.is_finite() => v.to_string().parse(),
        other => Err(cast_error(other, column)),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| parse_naive_datetime(text).map(|dt| dt.date()))
        .ok_or_else(|| DatabaseError::type_error(format!("invalid date value '{}'", text)))
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Parse a timestamp; text without an offset is taken as host local time
fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
    {
        return Ok(dt);
    }

    let naive = parse_naive_datetime(text)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| DatabaseError::type_error(format!("invalid timestamp value '{}'", text)))?;
    Ok(local_to_fixed(naive))
}

/// Parse a time of day placed on `date`
fn parse_time(text: &str, date: NaiveDate) -> Result<DateTime<FixedOffset>> {
    let trimmed = text.trim();
    match TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
    {
        Some(time) => Ok(local_to_fixed(date.and_time(time))),
        None => parse_timestamp(trimmed)
            .map_err(|_| DatabaseError::type_error(format!("invalid time value '{}'", trimmed))),
    }
}

fn local_to_fixed(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&dt.offset().fix()),
        // wall-clock time skipped by a DST transition
        None => utc_fixed(Utc.from_utc_datetime(&naive)),
    }
}

fn convert_zone(dt: DateTime<FixedOffset>, timezone: Timezone) -> DateTime<FixedOffset> {
    match timezone {
        Timezone::Local => {
            let local = dt.with_timezone(&Local);
            local.with_timezone(&local.offset().fix())
        }
        Timezone::Utc => utc_fixed(dt.with_timezone(&Utc)),
    }
}

fn utc_fixed(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.with_timezone(&Utc.fix())
}
