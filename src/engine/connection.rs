//! Host-facing connection

use super::handle::{CallGuard, ConnectionHandle};
use super::statement::{Statement, StatementHandle};
use crate::core::column::QueryResult;
use crate::core::dispatcher::{BlockingDispatcher, InterruptHandle, TokioDispatcher};
use crate::core::driver::DriverEnvironment;
use crate::core::error::{DatabaseError, Result};
use crate::core::options::{check_sql, ConnectOptions, Settings, CRASH_FIX_VARIABLE_SQL};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum TransactionEnd {
    Commit,
    Rollback,
}

impl TransactionEnd {
    fn label(self) -> &'static str {
        match self {
            TransactionEnd::Commit => "commit",
            TransactionEnd::Rollback => "rollback",
        }
    }
}

/// A connection to the database through the native driver
///
/// Operations on one connection, including those on its statements, run
/// one at a time. Starting an operation while another is in flight fails
/// with a [`DatabaseError::State`] error.
///
/// # Example
///
/// ```rust,no_run
/// use sqlany_bridge::prelude::*;
/// use std::sync::Arc;
///
/// # async fn run(env: Arc<DriverEnvironment>) -> Result<()> {
/// let options = ConnectOptions::new("ServerName=demo;UserID=dba;Password=sql");
/// let conn = Connection::open(env, &options).await?;
///
/// let stmt = conn.prepare("SELECT id, name FROM customers WHERE id = ?")?;
/// if let Some(result) = stmt.execute(&[HostValue::from(1)]).await? {
///     for row in result.iter() {
///         println!("{:?}", row);
///     }
/// }
/// stmt.close();
/// conn.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Connection {
    handle: Arc<ConnectionHandle>,
}

impl Connection {
    /// Allocate a native connection; it is not connected yet
    pub fn new(env: Arc<DriverEnvironment>, settings: Settings) -> Result<Self> {
        Self::with_dispatcher(env, settings, Arc::new(TokioDispatcher))
    }

    pub fn with_dispatcher(
        env: Arc<DriverEnvironment>,
        settings: Settings,
        dispatcher: Arc<dyn BlockingDispatcher>,
    ) -> Result<Self> {
        env.ensure_initialized()?;
        let driver = env.driver();
        let native = driver.new_connection().ok_or_else(|| {
            DatabaseError::initialization("Could not allocate a native connection")
        })?;
        log::debug!("Allocated native connection {:?}", native);

        Ok(Self {
            handle: ConnectionHandle::new(driver, native, dispatcher, settings),
        })
    }

    /// Validate `options`, allocate a connection and connect it
    pub async fn open(env: Arc<DriverEnvironment>, options: &ConnectOptions) -> Result<Self> {
        let (conn_string, settings) = options.build()?;
        let conn = Self::new(env, settings)?;
        conn.connect(&conn_string).await?;
        Ok(conn)
    }

    /// Connect with a driver connection string
    pub async fn connect(&self, conn_string: &str) -> Result<()> {
        let guard = self.handle.acquire("connect")?;
        if !guard.is_closed() {
            return Err(DatabaseError::state("connection is already open"));
        }

        let options = conn_string.to_string();
        let connected = guard
            .dispatch("connect", true, move |h| {
                h.driver().connect(h.native(), &options)
            })
            .await?;
        if !connected {
            return Err(guard.take_error());
        }
        guard.mark_open();
        log::debug!("Connected native connection {:?}", guard.native());

        if guard.settings().enable_crash_fix {
            Self::execute_immediate_locked(&guard, CRASH_FIX_VARIABLE_SQL).await?;
        }
        Ok(())
    }

    /// Disconnect; calling it again does nothing
    ///
    /// Statements prepared on this connection fail once it is closed.
    pub fn close(&self) {
        self.handle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn settings(&self) -> &Settings {
        self.handle.settings()
    }

    /// Handle that cancels whichever call is in flight on this connection
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.handle.interrupt().clone()
    }

    async fn end_transaction(&self, end: TransactionEnd) -> Result<Option<DatabaseError>> {
        let guard = self.handle.acquire(end.label())?;
        guard.ensure_open()?;

        let ok = guard
            .dispatch(end.label(), false, move |h| match end {
                TransactionEnd::Commit => h.driver().commit(h.native()),
                TransactionEnd::Rollback => h.driver().rollback(h.native()),
            })
            .await?;
        Ok(if ok { None } else { Some(guard.take_error()) })
    }

    /// Commit; `Ok(false)` when the driver refuses
    pub async fn commit(&self) -> Result<bool> {
        match self.end_transaction(TransactionEnd::Commit).await? {
            None => Ok(true),
            Some(err) => {
                log::warn!("Commit failed: {}", err);
                Ok(false)
            }
        }
    }

    /// Commit, raising the driver error on failure
    pub async fn commit_checked(&self) -> Result<()> {
        match self.end_transaction(TransactionEnd::Commit).await? {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Roll back; `Ok(false)` when the driver refuses
    pub async fn rollback(&self) -> Result<bool> {
        match self.end_transaction(TransactionEnd::Rollback).await? {
            None => Ok(true),
            Some(err) => {
                log::warn!("Rollback failed: {}", err);
                Ok(false)
            }
        }
    }

    /// Roll back, raising the driver error on failure
    pub async fn rollback_checked(&self) -> Result<()> {
        match self.end_transaction(TransactionEnd::Rollback).await? {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Prepare `sql` for execution
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        check_sql(sql)?;
        let sql = self.settings().preprocess_sql(sql);

        let guard = self.handle.acquire("prepare")?;
        guard.ensure_open()?;
        match guard.driver().prepare(guard.native(), &sql) {
            Some(native) => Ok(Statement::new(StatementHandle::new(
                Arc::clone(&self.handle),
                native,
            ))),
            None => Err(guard.take_error()),
        }
    }

    /// Run `sql` directly, discarding any result set
    pub async fn execute_immediate(&self, sql: &str) -> Result<()> {
        check_sql(sql)?;
        let guard = self.handle.acquire("execute_immediate")?;
        guard.ensure_open()?;
        Self::execute_immediate_locked(&guard, sql).await
    }

    async fn execute_immediate_locked(guard: &Arc<CallGuard>, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        let ok = guard
            .dispatch("execute_immediate", true, move |h| {
                h.driver().execute_immediate(h.native(), &sql)
            })
            .await?;
        if !ok {
            return Err(guard.take_error());
        }
        Ok(())
    }

    /// Run `sql` directly and materialize its result
    ///
    /// The returned statement owns the native statement the driver created
    /// for the call.
    pub async fn execute_direct(
        &self,
        sql: &str,
    ) -> Result<(Statement, Option<Arc<QueryResult>>)> {
        check_sql(sql)?;
        let sql = self.settings().preprocess_sql(sql).into_owned();

        let guard = self.handle.acquire("execute_direct")?;
        guard.ensure_open()?;

        let conn = Arc::clone(&self.handle);
        let handle = guard
            .dispatch("execute_direct", true, move |h| {
                h.driver()
                    .execute_direct(h.native(), &sql)
                    .map(|native| StatementHandle::new(conn, native))
            })
            .await?
            .ok_or_else(|| guard.take_error())?;

        let result = handle.last_result_locked(&guard).await?;
        Ok((Statement::new(handle), result))
    }

    #[cfg(test)]
    pub(crate) fn refcount(&self) -> usize {
        self.handle.refcount()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handle.release();
    }
}
