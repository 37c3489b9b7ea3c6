//! Driver implementations shipped with the crate
//!
//! Production hosts implement [`NativeDriver`](crate::core::NativeDriver)
//! over their native client library. The scripted driver answers from
//! canned queries and needs no server.

#[cfg(feature = "scripted")]
pub mod scripted;

#[cfg(feature = "scripted")]
pub use scripted::{DriverStats, ScriptedDriver, ScriptedError, ScriptedQuery};
