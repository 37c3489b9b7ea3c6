//! Host value types
//!
//! This module defines the values a host hands to a statement as bind
//! arguments and gets back from a result set.

use super::decimal::Decimal;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Host-side value that can be bound or read back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    /// Absence of a value
    Null,
    /// Boolean value, produced by casting BIT columns
    Bool(bool),
    /// Integer of any width the driver can carry, plus host-side big integers
    Integer(i128),
    /// 64-bit floating point
    Double(f64),
    /// Text in the connection's character set
    Text(String),
    /// Raw binary data
    Bytes(Vec<u8>),
    /// Arbitrary-precision decimal, produced by casting DECIMAL columns
    Decimal(Decimal),
    /// Calendar date, produced by casting DATE columns
    Date(NaiveDate),
    /// Point in time, produced by casting TIMESTAMP and TIME columns
    Timestamp(DateTime<FixedOffset>),
}

impl HostValue {
    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64 when it fits
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Integer(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as an i128
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            HostValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Double(v) => Some(*v),
            HostValue::Integer(v) => Some(*v as f64),
            HostValue::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    /// Get the value as a string slice (zero-copy for Text values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as bytes (zero-copy)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Bytes(b) => Some(b),
            HostValue::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Get the value as a decimal
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            HostValue::Decimal(d) => Some(d),
            _ => None,
        }
    }

    /// Get the value as a date
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            HostValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Get the value as a timestamp
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            HostValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Integer(_) => "integer",
            HostValue::Double(_) => "double",
            HostValue::Text(_) => "text",
            HostValue::Bytes(_) => "bytes",
            HostValue::Decimal(_) => "decimal",
            HostValue::Date(_) => "date",
            HostValue::Timestamp(_) => "timestamp",
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Integer(v as i128)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Integer(v as i128)
    }
}

impl From<u64> for HostValue {
    fn from(v: u64) -> Self {
        HostValue::Integer(v as i128)
    }
}

impl From<i128> for HostValue {
    fn from(v: i128) -> Self {
        HostValue::Integer(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Double(v)
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Text(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(v: Vec<u8>) -> Self {
        HostValue::Bytes(v)
    }
}

impl From<Decimal> for HostValue {
    fn from(v: Decimal) -> Self {
        HostValue::Decimal(v)
    }
}

impl From<NaiveDate> for HostValue {
    fn from(v: NaiveDate) -> Self {
        HostValue::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for HostValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        HostValue::Timestamp(v)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => HostValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let val = HostValue::Integer(42);
        assert_eq!(val.as_i64(), Some(42));
        assert_eq!(val.as_f64(), Some(42.0));
        assert_eq!(val.as_str(), None);

        let val = HostValue::Integer(u64::MAX as i128);
        assert_eq!(val.as_i64(), None);
        assert_eq!(val.as_i128(), Some(18_446_744_073_709_551_615));

        let val = HostValue::Text("abc".to_string());
        assert_eq!(val.as_str(), Some("abc"));
        assert_eq!(val.as_bytes(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_value_from_types() {
        let val: HostValue = 42.into();
        assert_eq!(val, HostValue::Integer(42));

        let val: HostValue = "hello".into();
        assert_eq!(val, HostValue::Text("hello".to_string()));

        let val: HostValue = vec![1u8, 2].into();
        assert_eq!(val, HostValue::Bytes(vec![1, 2]));

        let val: HostValue = Some(1.5).into();
        assert_eq!(val, HostValue::Double(1.5));

        let val: HostValue = Option::<i64>::None.into();
        assert!(val.is_null());
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(HostValue::Null.type_name(), "null");
        assert_eq!(HostValue::Bool(true).type_name(), "bool");
        assert_eq!(HostValue::Integer(1).type_name(), "integer");
        assert_eq!(HostValue::Decimal(Decimal::zero()).type_name(), "decimal");
        assert_eq!(
            HostValue::Date(NaiveDate::from_ymd_opt(1999, 1, 2).unwrap()).type_name(),
            "date"
        );
    }
}
