//! Contract with the native client library
//!
//! Every primitive the bridge consumes from the driver is a method on
//! [`NativeDriver`]. Implementations are thin: they forward to the library
//! and report success or failure, leaving the details of a failure in the
//! connection's error slot (`error`, `sqlstate`, `clear_error`).
//!
//! Native connections and statements are identified by opaque copyable
//! tokens. The bridge guarantees it never uses a token after freeing it and
//! never issues two calls against the same connection concurrently.

use super::column::ColumnInfo;
use super::error::{DatabaseError, Result};
use super::types::WireType;
use parking_lot::Mutex;
use std::sync::Arc;

/// API level requested from the library at init
pub const API_VERSION: u32 = 2;

/// Opaque native connection token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionPtr(pub usize);

/// Opaque native statement token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementPtr(pub usize);

/// A column value as the driver hands it over
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Binary(Vec<u8>),
    String(Vec<u8>),
    Double(f64),
    Val64(i64),
    UVal64(u64),
    Val32(i32),
    UVal32(u32),
    Val16(i16),
    UVal16(u16),
    Val8(i8),
    UVal8(u8),
    /// The driver could not type the value
    Invalid,
}

impl WireValue {
    /// Wire type tag of the value, `Invalid` for null
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Null | WireValue::Invalid => WireType::Invalid,
            WireValue::Binary(_) => WireType::Binary,
            WireValue::String(_) => WireType::String,
            WireValue::Double(_) => WireType::Double,
            WireValue::Val64(_) => WireType::Val64,
            WireValue::UVal64(_) => WireType::UVal64,
            WireValue::Val32(_) => WireType::Val32,
            WireValue::UVal32(_) => WireType::UVal32,
            WireValue::Val16(_) => WireType::Val16,
            WireValue::UVal16(_) => WireType::UVal16,
            WireValue::Val8(_) => WireType::Val8,
            WireValue::UVal8(_) => WireType::UVal8,
        }
    }
}

/// Direction of a bind slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

/// What the driver reports about a bind slot before it is bound
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindParamInfo {
    pub name: String,
    pub direction: ParamDirection,
}

/// An encoded input value ready to be bound
///
/// The buffer holds the value in native byte order. It must stay alive
/// until the statement's execute call returns, after which it is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BindParameter {
    pub info: BindParamInfo,
    pub wire_type: WireType,
    pub buffer: Vec<u8>,
    pub is_null: bool,
}

impl BindParameter {
    /// Byte length handed to the driver
    pub fn length(&self) -> usize {
        self.buffer.len()
    }
}

/// Code and message read from a connection's error slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

/// Native database client library
///
/// Calls returning `bool`, `Option` or a negative count signal failure;
/// the failure details are then available through [`NativeDriver::error`].
pub trait NativeDriver: Send + Sync + 'static {
    /// One-time library initialization for the current process
    fn init(&self, app_name: &str, api_version: u32) -> bool;

    fn new_connection(&self) -> Option<ConnectionPtr>;
    fn free_connection(&self, conn: ConnectionPtr);
    fn connect(&self, conn: ConnectionPtr, options: &str) -> bool;
    fn disconnect(&self, conn: ConnectionPtr) -> bool;
    fn commit(&self, conn: ConnectionPtr) -> bool;
    fn rollback(&self, conn: ConnectionPtr) -> bool;
    /// Ask the driver to abort whatever call is running on `conn`
    fn cancel(&self, conn: ConnectionPtr);
    fn execute_immediate(&self, conn: ConnectionPtr, sql: &str) -> bool;

    fn prepare(&self, conn: ConnectionPtr, sql: &str) -> Option<StatementPtr>;
    fn execute_direct(&self, conn: ConnectionPtr, sql: &str) -> Option<StatementPtr>;
    fn describe_bind_param(&self, stmt: StatementPtr, index: usize) -> Option<BindParamInfo>;
    fn bind_param(&self, stmt: StatementPtr, index: usize, param: &BindParameter) -> bool;
    fn execute(&self, stmt: StatementPtr) -> bool;
    /// Return the statement to its freshly prepared state
    fn reset(&self, stmt: StatementPtr) -> bool;
    fn free_statement(&self, stmt: StatementPtr);

    fn fetch_next(&self, stmt: StatementPtr) -> bool;
    fn get_column(&self, stmt: StatementPtr, index: usize) -> Option<WireValue>;
    fn get_column_info(&self, stmt: StatementPtr, index: usize) -> Option<ColumnInfo>;
    fn num_cols(&self, stmt: StatementPtr) -> i32;
    fn num_params(&self, stmt: StatementPtr) -> i32;
    fn affected_rows(&self, stmt: StatementPtr) -> i32;

    fn error(&self, conn: ConnectionPtr) -> NativeError;
    fn sqlstate(&self, conn: ConnectionPtr) -> String;
    fn clear_error(&self, conn: ConnectionPtr);
}

/// Process-wide driver state
///
/// The library must be initialized once per process before any connection
/// is allocated, and again in a child after `fork`. Create one environment
/// per driver and hand it to every [`Connection`](crate::engine::Connection);
/// each connection calls [`ensure_initialized`](Self::ensure_initialized)
/// before allocating its native handle.
pub struct DriverEnvironment {
    driver: Arc<dyn NativeDriver>,
    app_name: String,
    initialized_pid: Mutex<Option<u32>>,
}

impl DriverEnvironment {
    pub fn new(driver: Arc<dyn NativeDriver>) -> Self {
        Self::with_app_name(driver, "RUST")
    }

    pub fn with_app_name(driver: Arc<dyn NativeDriver>, app_name: impl Into<String>) -> Self {
        Self {
            driver,
            app_name: app_name.into(),
            initialized_pid: Mutex::new(None),
        }
    }

    /// Initialize the library unless this process already did
    pub fn ensure_initialized(&self) -> Result<()> {
        let pid = std::process::id();
        let mut initialized = self.initialized_pid.lock();
        if *initialized == Some(pid) {
            return Ok(());
        }

        if !self.driver.init(&self.app_name, API_VERSION) {
            return Err(DatabaseError::initialization(
                "Could not initialize the native client library",
            ));
        }

        log::debug!("Native client library initialized for process {}", pid);
        *initialized = Some(pid);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized_pid.lock() == Some(std::process::id())
    }

    pub fn driver(&self) -> Arc<dyn NativeDriver> {
        Arc::clone(&self.driver)
    }
}

impl std::fmt::Debug for DriverEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverEnvironment")
            .field("app_name", &self.app_name)
            .field("initialized_pid", &*self.initialized_pid.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "scripted"))]
mod tests {
    use super::*;
    use crate::backends::ScriptedDriver;

    #[test]
    fn test_environment_initializes_once() {
        let driver = Arc::new(ScriptedDriver::new());
        let env = DriverEnvironment::new(driver.clone());
        assert!(!env.is_initialized());

        env.ensure_initialized().unwrap();
        env.ensure_initialized().unwrap();

        assert!(env.is_initialized());
        assert_eq!(driver.stats().init, 1);
    }

    #[test]
    fn test_environment_init_failure() {
        let driver = Arc::new(ScriptedDriver::new());
        driver.fail_init();
        let env = DriverEnvironment::new(driver);

        assert!(matches!(
            env.ensure_initialized(),
            Err(DatabaseError::Initialization(_))
        ));
        assert!(!env.is_initialized());
    }

    #[test]
    fn test_wire_value_types() {
        assert_eq!(WireValue::Val16(1).wire_type(), WireType::Val16);
        assert_eq!(WireValue::String(vec![]).wire_type(), WireType::String);
        assert_eq!(WireValue::Null.wire_type(), WireType::Invalid);
    }
}
