//! Arbitrary-precision decimal values
//!
//! DECIMAL columns arrive from the driver as text. `Decimal` keeps every
//! digit of that text and normalizes trailing fractional zeros away, so two
//! values compare equal exactly when they are numerically equal.

use super::error::{DatabaseError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest decimal point shift a parsed exponent may produce
const MAX_SCALE: u64 = 4096;

/// Arbitrary-precision decimal number
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    negative: bool,
    /// Unscaled magnitude, no leading zeros, "0" for zero
    digits: String,
    /// Number of digits after the decimal point
    scale: u32,
}

impl Decimal {
    /// The value zero
    pub fn zero() -> Self {
        Decimal {
            negative: false,
            digits: "0".to_string(),
            scale: 0,
        }
    }

    fn normalized(negative: bool, digits: String, scale: u32) -> Self {
        let mut digits = digits.trim_start_matches('0').to_string();
        let mut scale = scale;
        if digits.is_empty() {
            return Decimal::zero();
        }
        while scale > 0 && digits.ends_with('0') {
            digits.pop();
            scale -= 1;
        }
        Decimal {
            negative,
            digits,
            scale,
        }
    }

    /// Check if the value is negative
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Check if the value is zero
    pub fn is_zero(&self) -> bool {
        self.digits == "0"
    }

    /// Digits after the decimal point once trailing zeros are removed
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Nearest `f64`, may lose precision
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// The value as an integer when it has no fractional part and fits
    pub fn to_i128(&self) -> Option<i128> {
        if self.scale != 0 {
            return None;
        }
        let magnitude: i128 = self.digits.parse().ok()?;
        Some(if self.negative { -magnitude } else { magnitude })
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal::zero()
    }
}

impl FromStr for Decimal {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DatabaseError::type_error(format!("invalid decimal value '{}'", s));
        let text = s.trim();

        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };

        let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => {
                let exp: i64 = unsigned[pos + 1..].parse().map_err(|_| invalid())?;
                (&unsigned[..pos], exp)
            }
            None => (unsigned, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let scale = i64::try_from(frac_part.len())
            .ok()
            .and_then(|len| len.checked_sub(exponent))
            .filter(|scale| scale.unsigned_abs() <= MAX_SCALE)
            .ok_or_else(invalid)?;

        let mut digits = format!("{}{}", int_part, frac_part);
        if scale < 0 {
            digits.push_str(&"0".repeat(scale.unsigned_abs() as usize));
        }
        let scale = u32::try_from(scale.max(0)).map_err(|_| invalid())?;

        Ok(Decimal::normalized(negative, digits, scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        let scale = self.scale as usize;
        if scale == 0 {
            return f.write_str(&self.digits);
        }
        if self.digits.len() <= scale {
            let padding = "0".repeat(scale - self.digits.len());
            return write!(f, "0.{}{}", padding, self.digits);
        }
        let (int_part, frac_part) = self.digits.split_at(self.digits.len() - scale);
        write!(f, "{}.{}", int_part, frac_part)
    }
}

impl From<i128> for Decimal {
    fn from(v: i128) -> Self {
        Decimal::normalized(v < 0, v.unsigned_abs().to_string(), 0)
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal::from(v as i128)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let d: Decimal = "123.45".parse().unwrap();
        assert_eq!(d.to_string(), "123.45");
        assert_eq!(d.scale(), 2);

        let d: Decimal = "-0.0012".parse().unwrap();
        assert_eq!(d.to_string(), "-0.0012");

        let d: Decimal = "1.1".parse().unwrap();
        assert_eq!(d.to_string(), "1.1");
    }

    #[test]
    fn test_normalized_equality() {
        let a: Decimal = "123.45".parse().unwrap();
        let b: Decimal = "0123.4500".parse().unwrap();
        assert_eq!(a, b);

        let zero: Decimal = "-0.000".parse().unwrap();
        assert_eq!(zero, Decimal::zero());
        assert!(!zero.is_negative());
    }

    #[test]
    fn test_exponent() {
        let d: Decimal = "1.5e3".parse().unwrap();
        assert_eq!(d.to_string(), "1500");
        let d: Decimal = "15E-3".parse().unwrap();
        assert_eq!(d.to_string(), "0.015");
    }

    #[test]
    fn test_invalid() {
        assert!("".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
        assert!("12a".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_extreme_exponents_are_rejected() {
        for text in [
            "1e-9223372036854775808",
            "1e9223372036854775807",
            "1e100000000",
            "1e-100000000",
            "0.5e4098",
        ] {
            assert!(
                matches!(text.parse::<Decimal>(), Err(DatabaseError::TypeError(_))),
                "{} should not parse",
                text
            );
        }

        let d: Decimal = "1e4096".parse().unwrap();
        assert_eq!(d.to_string().len(), 4097);
        let d: Decimal = "1e-4096".parse().unwrap();
        assert_eq!(d.scale(), 4096);
    }

    #[test]
    fn test_large_values_keep_precision() {
        let text = "98765432109876543210987654321.123456789";
        let d: Decimal = text.parse().unwrap();
        assert_eq!(d.to_string(), text);
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(Decimal::from(-42i64).to_string(), "-42");
        assert_eq!(Decimal::from(0i128), Decimal::zero());
        assert_eq!("42.000".parse::<Decimal>().unwrap().to_i128(), Some(42));
        assert_eq!("42.5".parse::<Decimal>().unwrap().to_i128(), None);
        assert!(("123.45".parse::<Decimal>().unwrap().to_f64() - 123.45).abs() < 1e-12);
    }

    #[test]
    fn test_serde_as_string() {
        let d: Decimal = "1.10".parse().unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"1.1\"");
        let back: Decimal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
