//! # sqlany_bridge
//!
//! Client binding layer between async Rust hosts and a native SQL Anywhere
//! style client library. The native library does the wire protocol; this
//! crate manages what sits on top of it:
//!
//! - **Handles**: a reference-counted native connection shared by every
//!   statement prepared against it, freed exactly once.
//! - **Blocking calls**: connect, commit, rollback, the execute family and
//!   row fetches run on tokio's blocking pool, with cooperative cancel.
//! - **Marshalling**: host values are encoded into bind parameters, column
//!   values are decoded (and optionally cast to decimal, date, timestamp or
//!   boolean) into host values.
//! - **Results**: every execution is materialized into an immutable
//!   [`QueryResult`] snapshot.
//!
//! ## Quick Start
//!
//! The example runs against the in-memory driver from the `scripted`
//! feature; production hosts pass their own [`NativeDriver`](crate::core::NativeDriver).
//!
//! ```rust,no_run
//! use sqlany_bridge::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = Arc::new(ScriptedDriver::new());
//!     driver.register(
//!         ScriptedQuery::new("SELECT id, name FROM t WHERE id = ?")
//!             .params(1)
//!             .column(ColumnInfo::new("id", DeclaredType::Int, WireType::Val32))
//!             .column(ColumnInfo::new("name", DeclaredType::Varchar, WireType::String))
//!             .row([WireValue::Val32(1), WireValue::String(b"a".to_vec())]),
//!     );
//!
//!     let env = Arc::new(DriverEnvironment::new(driver));
//!     let conn = Connection::open(env, &ConnectOptions::new("ServerName=demo")).await?;
//!
//!     let stmt = conn.prepare("SELECT id, name FROM t WHERE id = ?")?;
//!     if let Some(result) = stmt.execute(&[HostValue::from(1)]).await? {
//!         for row in result.iter() {
//!             println!("{:?}", row);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Cancelling a long call
//!
//! ```rust,no_run
//! use sqlany_bridge::prelude::*;
//!
//! # async fn run(conn: Connection) -> Result<()> {
//! let interrupt = conn.interrupt_handle();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     interrupt.interrupt();
//! });
//! // fails with the driver's "interrupted" error if it takes longer
//! conn.execute_immediate("CALL long_running_report()").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/        # errors, values, driver contract, dispatcher, options
//! ├── codec/       # parameter encoder and column decoder
//! ├── engine/      # connection, statement, result materializer
//! ├── backends/    # bundled driver implementations
//! └── lib.rs
//! ```

/// Core types and traits
pub mod core;

/// Host value <-> wire value conversion
pub mod codec;

/// Connection and statement lifecycle
pub mod engine;

/// Bundled driver implementations
pub mod backends;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::core::{
        BlockingDispatcher, Charset, ColumnInfo, ConnectOptions, DatabaseError, Decimal,
        DeclaredType, DriverEnvironment, HostValue, InterruptHandle, NativeDriver, QueryResult,
        Result, Row, Settings, Timezone, TokioDispatcher, WireType, WireValue,
    };
    pub use crate::engine::{Connection, Statement};

    #[cfg(feature = "scripted")]
    pub use crate::backends::{ScriptedDriver, ScriptedError, ScriptedQuery};
}

// Re-export at root level for convenience
pub use crate::core::{
    ColumnInfo, ConnectOptions, DatabaseError, DriverEnvironment, HostValue, QueryResult, Result,
    Settings,
};
pub use crate::engine::{Connection, Statement};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let tz: Timezone = "utc".parse().unwrap();
        assert_eq!(tz.to_str(), "utc");
        assert_eq!(Charset::default().name(), "UTF-8");
    }

    #[test]
    fn test_value_conversions() {
        use prelude::*;

        let val: HostValue = 42.into();
        assert_eq!(val.as_i64(), Some(42));

        let val: HostValue = "test".into();
        assert_eq!(val.as_str(), Some("test"));

        let val: HostValue = true.into();
        assert_eq!(val.as_bool(), Some(true));
    }
}
