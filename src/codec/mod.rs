//! Conversion between host values and driver wire values

pub mod decoder;
pub mod encoder;

pub use decoder::{decode, default_time_only_date, DecodeOptions};
pub use encoder::{bound_value, encode};
