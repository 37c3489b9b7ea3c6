//! Native type codes and connection-level enums
//!
//! `WireType` is the representation the driver uses for a value in flight,
//! `DeclaredType` is the column type the database declared for it.

use super::error::{DatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error code the driver leaves in the error slot once a cursor is exhausted
pub const ROW_NOT_FOUND: i32 = 100;

/// Wire representation of a value exchanged with the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum WireType {
    /// Sentinel for a value the driver could not type
    #[default]
    Invalid = 0,
    Binary = 1,
    String = 2,
    Double = 3,
    Val64 = 4,
    UVal64 = 5,
    Val32 = 6,
    UVal32 = 7,
    Val16 = 8,
    UVal16 = 9,
    Val8 = 10,
    UVal8 = 11,
}

impl WireType {
    /// Raw driver code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a raw driver code, unknown codes become `Invalid`
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => WireType::Binary,
            2 => WireType::String,
            3 => WireType::Double,
            4 => WireType::Val64,
            5 => WireType::UVal64,
            6 => WireType::Val32,
            7 => WireType::UVal32,
            8 => WireType::Val16,
            9 => WireType::UVal16,
            10 => WireType::Val8,
            11 => WireType::UVal8,
            _ => WireType::Invalid,
        }
    }

    /// Check if this wire type carries an integer
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            WireType::Val64
                | WireType::UVal64
                | WireType::Val32
                | WireType::UVal32
                | WireType::Val16
                | WireType::UVal16
                | WireType::Val8
                | WireType::UVal8
        )
    }
}

/// Column type as declared by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclaredType {
    NoType,
    Date,
    Time,
    Timestamp,
    Varchar,
    Fixchar,
    LongVarchar,
    String,
    Double,
    Float,
    Decimal,
    Int,
    SmallInt,
    Binary,
    LongBinary,
    TinyInt,
    BigInt,
    UnsignedInt,
    UnsignedSmallInt,
    UnsignedBigInt,
    Bit,
    NString,
    NFixchar,
    NVarchar,
    LongNVarchar,
    /// A code this crate does not know about, kept verbatim
    Other(i32),
}

impl DeclaredType {
    /// Raw driver code
    pub fn code(self) -> i32 {
        match self {
            DeclaredType::NoType => 0,
            DeclaredType::Date => 384,
            DeclaredType::Time => 388,
            DeclaredType::Timestamp => 392,
            DeclaredType::Varchar => 448,
            DeclaredType::Fixchar => 452,
            DeclaredType::LongVarchar => 456,
            DeclaredType::String => 460,
            DeclaredType::Double => 480,
            DeclaredType::Float => 482,
            DeclaredType::Decimal => 484,
            DeclaredType::Int => 496,
            DeclaredType::SmallInt => 500,
            DeclaredType::Binary => 524,
            DeclaredType::LongBinary => 528,
            DeclaredType::TinyInt => 604,
            DeclaredType::BigInt => 608,
            DeclaredType::UnsignedInt => 612,
            DeclaredType::UnsignedSmallInt => 616,
            DeclaredType::UnsignedBigInt => 620,
            DeclaredType::Bit => 624,
            DeclaredType::NString => 628,
            DeclaredType::NFixchar => 632,
            DeclaredType::NVarchar => 636,
            DeclaredType::LongNVarchar => 640,
            DeclaredType::Other(code) => code,
        }
    }

    /// Map a raw driver code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DeclaredType::NoType,
            384 => DeclaredType::Date,
            388 => DeclaredType::Time,
            392 => DeclaredType::Timestamp,
            448 => DeclaredType::Varchar,
            452 => DeclaredType::Fixchar,
            456 => DeclaredType::LongVarchar,
            460 => DeclaredType::String,
            480 => DeclaredType::Double,
            482 => DeclaredType::Float,
            484 => DeclaredType::Decimal,
            496 => DeclaredType::Int,
            500 => DeclaredType::SmallInt,
            524 => DeclaredType::Binary,
            528 => DeclaredType::LongBinary,
            604 => DeclaredType::TinyInt,
            608 => DeclaredType::BigInt,
            612 => DeclaredType::UnsignedInt,
            616 => DeclaredType::UnsignedSmallInt,
            620 => DeclaredType::UnsignedBigInt,
            624 => DeclaredType::Bit,
            628 => DeclaredType::NString,
            632 => DeclaredType::NFixchar,
            636 => DeclaredType::NVarchar,
            640 => DeclaredType::LongNVarchar,
            other => DeclaredType::Other(other),
        }
    }
}

/// Zone that timestamps read from the database are converted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timezone {
    #[default]
    Local,
    Utc,
}

impl Timezone {
    pub fn to_str(&self) -> &'static str {
        match self {
            Timezone::Local => "local",
            Timezone::Utc => "utc",
        }
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for Timezone {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Timezone::Local),
            "utc" => Ok(Timezone::Utc),
            _ => Err(DatabaseError::config(format!(
                "database timezone must be 'utc' or 'local', got '{}'",
                s
            ))),
        }
    }
}

/// Character set used for text exchanged with the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    /// Canonical name written into the connection string
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Decode driver bytes into host text
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(e) => {
                    log::warn!("Replacing invalid UTF-8 in column text: {}", e);
                    String::from_utf8_lossy(bytes).into_owned()
                }
            },
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Encode host text into driver bytes
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        DatabaseError::type_error(format!(
                            "character '{}' cannot be represented in {}",
                            c,
                            self.name()
                        ))
                    })
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Charset {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            _ => Err(DatabaseError::config(format!("Unknown encoding: '{}'", s))),
        }
    }
}
