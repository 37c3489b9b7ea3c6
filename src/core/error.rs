//! Error types for the bridge
//!
//! This module defines every error that can surface from a connection, a
//! statement or the value codecs.

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for bridge operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatabaseError {
    /// A native driver call signalled failure.
    ///
    /// `message` and `sql_state` are read from the connection's error slot,
    /// which is cleared afterwards so each error reflects exactly one call.
    #[error("Driver error {code} ({sql_state}): {message}")]
    Driver {
        message: String,
        code: i32,
        sql_state: String,
    },

    /// Argument count given to `execute` differs from the statement's bind count
    #[error("Bind parameter count ({expected}) doesn't match number of arguments ({actual})")]
    ParameterCount { expected: usize, actual: usize },

    /// Unsupported host value on encode, or invalid wire value on decode
    #[error("Type error: {0}")]
    TypeError(String),

    /// Operation attempted on a closed, freed or busy handle
    #[error("Invalid state: {0}")]
    State(String),

    /// SQL text rejected before reaching the driver
    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    /// Invalid connection options
    #[error("Configuration error: {0}")]
    Config(String),

    /// Native library initialization failed
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// The blocking call could not be run to completion
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl DatabaseError {
    /// Create a driver error from the parts read out of an error slot
    pub fn driver(message: impl Into<String>, code: i32, sql_state: impl Into<String>) -> Self {
        DatabaseError::Driver {
            message: message.into(),
            code,
            sql_state: sql_state.into(),
        }
    }

    /// Create a parameter count mismatch error
    pub fn parameter_count(expected: usize, actual: usize) -> Self {
        DatabaseError::ParameterCount { expected, actual }
    }

    /// Create a new type error
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TypeError(msg.into())
    }

    /// Create a new state error
    pub fn state<S: Into<String>>(msg: S) -> Self {
        DatabaseError::State(msg.into())
    }

    /// Create a new invalid SQL error
    pub fn invalid_sql<S: Into<String>>(msg: S) -> Self {
        DatabaseError::InvalidSql(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Config(msg.into())
    }

    /// Create a new initialization error
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Initialization(msg.into())
    }

    /// Create a new dispatch error
    pub fn dispatch<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Dispatch(msg.into())
    }

    /// Native error code, or 0 when the error did not come from the driver
    pub fn native_code(&self) -> i32 {
        match self {
            DatabaseError::Driver { code, .. } => *code,
            _ => 0,
        }
    }

    /// SQL state, or an empty string when the error did not come from the driver
    pub fn sql_state(&self) -> &str {
        match self {
            DatabaseError::Driver { sql_state, .. } => sql_state,
            _ => "",
        }
    }

    /// Check if this error was raised by a failing native call
    pub fn is_driver_error(&self) -> bool {
        matches!(self, DatabaseError::Driver { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DatabaseError::driver("Syntax error near 'SUCH'", -131, "42000");
        assert!(matches!(err, DatabaseError::Driver { code: -131, .. }));

        let err = DatabaseError::parameter_count(2, 1);
        assert!(matches!(
            err,
            DatabaseError::ParameterCount {
                expected: 2,
                actual: 1
            }
        ));

        let err = DatabaseError::state("Statement handle already closed");
        assert!(matches!(err, DatabaseError::State(_)));
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::parameter_count(2, 1);
        assert_eq!(
            err.to_string(),
            "Bind parameter count (2) doesn't match number of arguments (1)"
        );

        let err = DatabaseError::driver("Table 'nope' not found", -141, "42S02");
        assert_eq!(
            err.to_string(),
            "Driver error -141 (42S02): Table 'nope' not found"
        );
    }

    #[test]
    fn test_driver_accessors() {
        let err = DatabaseError::driver("Cannot convert 'abc' to a numeric", -157, "53018");
        assert!(err.is_driver_error());
        assert_eq!(err.native_code(), -157);
        assert_eq!(err.sql_state(), "53018");

        let err = DatabaseError::type_error("Invalid Data Type");
        assert!(!err.is_driver_error());
        assert_eq!(err.native_code(), 0);
        assert_eq!(err.sql_state(), "");
    }
}
