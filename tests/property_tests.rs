//! Property-based tests for the value codecs
//!
//! These tests use proptest to check encoding, decoding and decimal
//! handling across a wide range of inputs.

use proptest::prelude::*;
use sqlany_bridge::codec::{bound_value, decode, encode, DecodeOptions};
use sqlany_bridge::core::driver::BindParamInfo;
use sqlany_bridge::core::{Charset, ColumnInfo, Decimal, DeclaredType, HostValue, WireType, WireValue};

fn wire_of(value: &HostValue, charset: Charset) -> WireValue {
    let param = encode(value, BindParamInfo::default(), charset).expect("encode failed");
    bound_value(&param).expect("bound value unreadable")
}

fn column_for(wire: &WireValue) -> ColumnInfo {
    ColumnInfo::new("c", DeclaredType::Varchar, wire.wire_type())
}

fn raw_round_trip(value: &HostValue) -> HostValue {
    let wire = wire_of(value, Charset::Utf8);
    let column = column_for(&wire);
    decode(wire, &column, &DecodeOptions::raw()).expect("decode failed")
}

// ============================================================================
// Encoder / decoder round trips
// ============================================================================

proptest! {
    /// Integers that fit a native width come back unchanged
    #[test]
    fn test_integer_round_trip(v in (i64::MIN as i128)..=(u64::MAX as i128)) {
        prop_assert_eq!(raw_round_trip(&HostValue::Integer(v)), HostValue::Integer(v));
    }

    /// Integers wider than the driver carries travel as their decimal digits
    #[test]
    fn test_wide_integer_travels_as_text(v in prop_oneof![
        (u64::MAX as i128 + 1)..=i128::MAX,
        i128::MIN..(i64::MIN as i128),
    ]) {
        prop_assert_eq!(
            raw_round_trip(&HostValue::Integer(v)),
            HostValue::Text(v.to_string())
        );
    }

    /// Finite doubles are bit-exact after a round trip
    #[test]
    fn test_double_round_trip(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        match raw_round_trip(&HostValue::Double(v)) {
            HostValue::Double(back) => prop_assert_eq!(back.to_bits(), v.to_bits()),
            other => prop_assert!(false, "expected a double, got {:?}", other),
        }
    }

    #[test]
    fn test_text_round_trip(s in "\\PC{0,64}") {
        prop_assert_eq!(raw_round_trip(&HostValue::Text(s.clone())), HostValue::Text(s));
    }

    #[test]
    fn test_bytes_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(raw_round_trip(&HostValue::Bytes(bytes.clone())), HostValue::Bytes(bytes));
    }

    /// Latin-1 text survives when every character fits one byte
    #[test]
    fn test_latin1_round_trip(s in "[\\x20-\\x7e\\u{a0}-\\u{ff}]{0,32}") {
        let wire = wire_of(&HostValue::Text(s.clone()), Charset::Latin1);
        if let WireValue::String(bytes) = &wire {
            prop_assert_eq!(bytes.len(), s.chars().count());
        }
        let options = DecodeOptions {
            charset: Charset::Latin1,
            ..DecodeOptions::raw()
        };
        let back = decode(wire.clone(), &column_for(&wire), &options).unwrap();
        prop_assert_eq!(back, HostValue::Text(s));
    }
}

// ============================================================================
// Integer width selection
// ============================================================================

proptest! {
    #[test]
    fn test_i32_range_uses_val32(v in any::<i32>()) {
        prop_assert_eq!(wire_of(&HostValue::from(v), Charset::Utf8), WireValue::Val32(v));
    }

    #[test]
    fn test_i64_outside_i32_uses_val64(v in any::<i64>().prop_filter("outside i32", |v| i32::try_from(*v).is_err())) {
        prop_assert_eq!(wire_of(&HostValue::from(v), Charset::Utf8), WireValue::Val64(v));
    }

    #[test]
    fn test_u64_above_i64_uses_uval64(v in (i64::MAX as u64 + 1)..=u64::MAX) {
        prop_assert_eq!(wire_of(&HostValue::from(v), Charset::Utf8), WireValue::UVal64(v));
    }

    /// The encoded buffer is exactly as wide as its wire type
    #[test]
    fn test_buffer_length_matches_width(v in any::<i64>()) {
        let param = encode(&HostValue::from(v), BindParamInfo::default(), Charset::Utf8).unwrap();
        let expected = match param.wire_type {
            WireType::Val32 => 4,
            WireType::Val64 => 8,
            other => return Err(TestCaseError::fail(format!("unexpected width {:?}", other))),
        };
        prop_assert_eq!(param.length(), expected);
        prop_assert!(!param.is_null);
    }
}

// ============================================================================
// Decimal values
// ============================================================================

proptest! {
    /// Display output parses back to the same value
    #[test]
    fn test_decimal_display_round_trip(int in any::<i64>(), frac in 0u32..1_000_000, scale in 0usize..6) {
        let text = format!("{}.{:0width$}", int, frac, width = scale + 1);
        let d: Decimal = text.parse().unwrap();
        let again: Decimal = d.to_string().parse().unwrap();
        prop_assert_eq!(d, again);
    }

    /// Trailing fractional zeros never change the value
    #[test]
    fn test_decimal_trailing_zeros(int in any::<i64>(), zeros in 0usize..10) {
        let plain: Decimal = int.to_string().parse().unwrap();
        let padded: Decimal = format!("{}.{}", int, "0".repeat(zeros)).parse().unwrap();
        prop_assert_eq!(&plain, &padded);
        prop_assert_eq!(plain.to_i128(), Some(int as i128));
    }

    /// Any exponent either parses into a bounded value or is a type error
    #[test]
    fn test_decimal_exponent_is_bounded(mantissa in "[0-9]{1,6}(\\.[0-9]{1,6})?", exp in any::<i64>()) {
        match format!("{}e{}", mantissa, exp).parse::<Decimal>() {
            Ok(d) => {
                prop_assert!(d.scale() <= 4096);
                prop_assert!(d.to_string().len() <= 4096 + 16);
            }
            Err(e) => prop_assert!(matches!(e, sqlany_bridge::DatabaseError::TypeError(_))),
        }
    }

    /// Integer columns cast to DECIMAL equal the parsed digits
    #[test]
    fn test_decimal_cast_of_integers(v in any::<i64>()) {
        let column = ColumnInfo::new("amount", DeclaredType::Decimal, WireType::Val64);
        let cast = decode(WireValue::Val64(v), &column, &DecodeOptions::default()).unwrap();
        prop_assert_eq!(cast, HostValue::Decimal(v.to_string().parse().unwrap()));
    }

    /// Text that is not a number never casts to DECIMAL
    #[test]
    fn test_decimal_rejects_non_numeric(s in "[a-df-z]{1,12}") {
        let column = ColumnInfo::new("amount", DeclaredType::Decimal, WireType::String);
        let result = decode(WireValue::String(s.into_bytes()), &column, &DecodeOptions::default());
        prop_assert!(result.is_err());
    }
}
