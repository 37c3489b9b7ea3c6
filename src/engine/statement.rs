//! Prepared statements
//!
//! A [`Statement`] owns one native statement and holds a reference on the
//! connection it was prepared against. Executing it binds the arguments,
//! runs the native execute through the dispatcher, materializes the result
//! and resets the native statement so it can be executed again.

use super::handle::{CallGuard, ConnectionHandle};
use super::materializer::materialize;
use crate::codec::encode;
use crate::core::column::{ColumnInfo, QueryResult};
use crate::core::driver::{BindParameter, StatementPtr};
use crate::core::error::{DatabaseError, Result};
use crate::core::value::HostValue;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct StatementState {
    closed: bool,
    fetched: bool,
    cached: Option<Arc<QueryResult>>,
}

pub(crate) struct StatementHandle {
    conn: Arc<ConnectionHandle>,
    native: StatementPtr,
    state: Mutex<StatementState>,
}

impl StatementHandle {
    /// Take ownership of `native` and retain the connection
    pub(crate) fn new(conn: Arc<ConnectionHandle>, native: StatementPtr) -> Arc<Self> {
        conn.retain();
        Arc::new(Self {
            conn,
            native,
            state: Mutex::new(StatementState::default()),
        })
    }

    pub(crate) fn native(&self) -> StatementPtr {
        self.native
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.fetched = false;
            state.cached = None;
        }
        self.conn.free_statement(self.native);
    }

    /// Claim the connection and check both handles are usable
    fn begin(&self, label: &'static str) -> Result<Arc<CallGuard>> {
        let guard = self.conn.acquire(label)?;
        if self.is_closed() {
            return Err(DatabaseError::state("statement is closed"));
        }
        guard.ensure_open()?;
        Ok(guard)
    }

    fn count(&self, value: i32) -> Result<usize> {
        usize::try_from(value).map_err(|_| self.conn.take_error())
    }

    pub(crate) fn num_params(&self) -> Result<usize> {
        let _guard = self.begin("num_params")?;
        self.count(self.conn.driver().num_params(self.native))
    }

    pub(crate) fn num_columns(&self) -> Result<usize> {
        let _guard = self.begin("num_columns")?;
        self.count(self.conn.driver().num_cols(self.native))
    }

    pub(crate) fn affected_rows(&self) -> Result<u64> {
        let _guard = self.begin("affected_rows")?;
        let affected = self.count(self.conn.driver().affected_rows(self.native))?;
        Ok(affected as u64)
    }

    pub(crate) fn columns(&self) -> Result<Vec<ColumnInfo>> {
        let _guard = self.begin("columns")?;
        let driver = self.conn.driver();
        let count = self.count(driver.num_cols(self.native))?;
        (0..count)
            .map(|index| {
                driver
                    .get_column_info(self.native, index)
                    .ok_or_else(|| self.conn.take_error())
            })
            .collect()
    }

    pub(crate) async fn execute(
        self: &Arc<Self>,
        args: &[HostValue],
    ) -> Result<Option<Arc<QueryResult>>> {
        let guard = self.begin("execute")?;
        let driver = self.conn.driver();

        let expected = self.count(driver.num_params(self.native))?;
        if args.len() != expected {
            return Err(DatabaseError::parameter_count(expected, args.len()));
        }

        let charset = self.conn.settings().charset;
        let mut binds: Vec<BindParameter> = Vec::with_capacity(expected);
        for (index, arg) in args.iter().enumerate() {
            let info = driver
                .describe_bind_param(self.native, index)
                .ok_or_else(|| self.conn.take_error())?;
            let param = encode(arg, info, charset)?;
            if !driver.bind_param(self.native, index, &param) {
                return Err(self.conn.take_error());
            }
            binds.push(param);
        }

        let executing = Arc::clone(self);
        let executed = guard
            .dispatch("execute", true, move |h| {
                let ok = h.driver().execute(executing.native);
                // buffers stay bound until the native execute returns
                drop(binds);
                ok
            })
            .await?;
        if !executed {
            return Err(self.conn.take_error());
        }

        {
            let mut state = self.state.lock();
            state.fetched = false;
            state.cached = None;
        }
        let result = self.last_result_locked(&guard).await;

        if self.is_closed() {
            return result;
        }
        let reset = driver.reset(self.native);
        match result {
            Ok(result) if reset => Ok(result),
            Ok(_) => Err(self.conn.take_error()),
            Err(err) => {
                if !reset {
                    let reset_err = self.conn.take_error();
                    log::warn!("Statement reset failed after '{}': {}", err, reset_err);
                }
                Err(err)
            }
        }
    }

    pub(crate) async fn last_result(self: &Arc<Self>) -> Result<Option<Arc<QueryResult>>> {
        let guard = self.begin("last_result")?;
        self.last_result_locked(&guard).await
    }

    /// Memoized result of the last execution, materializing it on first use
    pub(crate) async fn last_result_locked(
        self: &Arc<Self>,
        guard: &Arc<CallGuard>,
    ) -> Result<Option<Arc<QueryResult>>> {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(DatabaseError::state("statement is closed"));
            }
            if state.fetched {
                return Ok(state.cached.clone());
            }
        }

        let result = materialize(self, guard).await?.map(Arc::new);

        let mut state = self.state.lock();
        if !state.closed {
            state.cached = result.clone();
            state.fetched = true;
        }
        Ok(result)
    }
}

impl Drop for StatementHandle {
    fn drop(&mut self) {
        if !self.state.get_mut().closed {
            self.conn.free_statement(self.native);
        }
        self.conn.release();
    }
}

impl std::fmt::Debug for StatementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementHandle")
            .field("native", &self.native)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// A prepared statement
///
/// Dropping the statement frees the native statement and releases its
/// reference on the connection. Closing it first frees the native side
/// straight away.
#[derive(Debug)]
pub struct Statement {
    handle: Arc<StatementHandle>,
}

impl Statement {
    pub(crate) fn new(handle: Arc<StatementHandle>) -> Self {
        Self { handle }
    }

    /// Bind `args`, execute and return the materialized result
    ///
    /// Returns `None` when the statement produces no result set. The
    /// statement is reset afterwards and can be executed again.
    pub async fn execute(&self, args: &[HostValue]) -> Result<Option<Arc<QueryResult>>> {
        self.handle.execute(args).await
    }

    /// Result of the most recent execution
    pub async fn last_result(&self) -> Result<Option<Arc<QueryResult>>> {
        self.handle.last_result().await
    }

    /// Free the native statement; calling it again does nothing
    pub fn close(&self) {
        self.handle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Rows changed, deleted or inserted by the last execution
    pub fn affected_rows(&self) -> Result<u64> {
        self.handle.affected_rows()
    }

    /// Number of bind parameters the statement expects
    pub fn num_params(&self) -> Result<usize> {
        self.handle.num_params()
    }

    pub fn num_columns(&self) -> Result<usize> {
        self.handle.num_columns()
    }

    /// Descriptors of the columns the statement returns
    pub fn columns(&self) -> Result<Vec<ColumnInfo>> {
        self.handle.columns()
    }
}
