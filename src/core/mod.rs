//! Core types shared by the codec and the engine
//!
//! Errors, value types, the driver contract, the blocking call dispatcher
//! and connection configuration.

pub mod column;
pub mod decimal;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod options;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use column::{ColumnInfo, QueryResult, Row};
pub use decimal::Decimal;
pub use dispatcher::{
    BlockingCall, BlockingDispatcher, CancelOp, InlineDispatcher, InterruptHandle,
    TokioDispatcher,
};
pub use driver::{
    BindParamInfo, BindParameter, ConnectionPtr, DriverEnvironment, NativeDriver, NativeError,
    ParamDirection, StatementPtr, WireValue,
};
pub use error::{DatabaseError, Result};
pub use options::{ConnectOptions, ConnectionString, Settings};
pub use types::{Charset, DeclaredType, Timezone, WireType, ROW_NOT_FOUND};
pub use value::HostValue;
