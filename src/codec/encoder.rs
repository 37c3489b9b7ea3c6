//! Parameter encoder
//!
//! Turns a [`HostValue`] into a [`BindParameter`] the driver can bind.
//! Integers use the smallest native width that holds the value; anything
//! beyond the unsigned 64-bit range travels as decimal digits in a string
//! parameter so nothing is truncated.

use crate::core::driver::{BindParamInfo, BindParameter, WireValue};
use crate::core::error::{DatabaseError, Result};
use crate::core::types::{Charset, WireType};
use crate::core::value::HostValue;

/// Encode one bind argument
pub fn encode(value: &HostValue, info: BindParamInfo, charset: Charset) -> Result<BindParameter> {
    let (wire_type, buffer, is_null) = match value {
        HostValue::Null => (WireType::Val32, Vec::new(), true),
        HostValue::Text(text) => (WireType::String, charset.encode(text)?, false),
        HostValue::Bytes(bytes) => (WireType::Binary, bytes.clone(), false),
        HostValue::Double(v) => (WireType::Double, v.to_ne_bytes().to_vec(), false),
        HostValue::Integer(v) => {
            let (wire_type, buffer) = encode_integer(*v);
            (wire_type, buffer, false)
        }
        HostValue::Bool(_)
        | HostValue::Decimal(_)
        | HostValue::Date(_)
        | HostValue::Timestamp(_) => {
            return Err(DatabaseError::type_error(format!(
                "Cannot convert type {}. Must be text, bytes, integer, double or null",
                value.type_name()
            )));
        }
    };

    Ok(BindParameter {
        info,
        wire_type,
        buffer,
        is_null,
    })
}

fn encode_integer(v: i128) -> (WireType, Vec<u8>) {
    if let Ok(v) = i32::try_from(v) {
        (WireType::Val32, v.to_ne_bytes().to_vec())
    } else if let Ok(v) = i64::try_from(v) {
        (WireType::Val64, v.to_ne_bytes().to_vec())
    } else if let Ok(v) = u64::try_from(v) {
        (WireType::UVal64, v.to_ne_bytes().to_vec())
    } else {
        (WireType::String, v.to_string().into_bytes())
    }
}

/// Read an encoded parameter back as the wire value it carries
///
/// This is the driver's view of a bound buffer. Drivers implemented in Rust
/// use it to interpret what they were asked to bind.
pub fn bound_value(param: &BindParameter) -> Result<WireValue> {
    if param.is_null {
        return Ok(WireValue::Null);
    }

    let buffer = param.buffer.as_slice();
    let value = match param.wire_type {
        WireType::Binary => WireValue::Binary(buffer.to_vec()),
        WireType::String => WireValue::String(buffer.to_vec()),
        WireType::Double => WireValue::Double(f64::from_ne_bytes(fixed(param)?)),
        WireType::Val64 => WireValue::Val64(i64::from_ne_bytes(fixed(param)?)),
        WireType::UVal64 => WireValue::UVal64(u64::from_ne_bytes(fixed(param)?)),
        WireType::Val32 => WireValue::Val32(i32::from_ne_bytes(fixed(param)?)),
        WireType::UVal32 => WireValue::UVal32(u32::from_ne_bytes(fixed(param)?)),
        WireType::Val16 => WireValue::Val16(i16::from_ne_bytes(fixed(param)?)),
        WireType::UVal16 => WireValue::UVal16(u16::from_ne_bytes(fixed(param)?)),
        WireType::Val8 => WireValue::Val8(i8::from_ne_bytes(fixed(param)?)),
        WireType::UVal8 => WireValue::UVal8(u8::from_ne_bytes(fixed(param)?)),
        WireType::Invalid => WireValue::Invalid,
    };
    Ok(value)
}

fn fixed<const N: usize>(param: &BindParameter) -> Result<[u8; N]> {
    param.buffer.as_slice().try_into().map_err(|_| {
        DatabaseError::type_error(format!(
            "Bind buffer for {:?} holds {} bytes, expected {}",
            param.wire_type,
            param.length(),
            N
        ))
    })
}
