//! In-memory scripted driver
//!
//! `ScriptedDriver` answers by SQL text from registered [`ScriptedQuery`]
//! definitions instead of talking to a server. It keeps a per-connection
//! error slot the way the native library does, counts every call and
//! records the values bound to each execution, which makes it useful for
//! testing code written against the bridge.
//!
//! Unregistered SQL fails to prepare or execute directly, but succeeds
//! through `execute_immediate`.

use crate::codec::bound_value;
use crate::core::column::ColumnInfo;
use crate::core::driver::{
    BindParamInfo, BindParameter, ConnectionPtr, NativeDriver, NativeError, ParamDirection,
    StatementPtr, WireValue,
};
use crate::core::types::ROW_NOT_FOUND;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::Duration;

/// Longest a blocking query waits for a cancel before failing on its own
const BLOCK_LIMIT: Duration = Duration::from_secs(30);

/// Error a scripted call leaves in the connection's error slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedError {
    pub code: i32,
    pub message: String,
    pub sql_state: String,
}

impl ScriptedError {
    pub fn new(code: i32, message: impl Into<String>, sql_state: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sql_state: sql_state.into(),
        }
    }

    fn row_not_found() -> Self {
        Self::new(ROW_NOT_FOUND, "Row not found", "02000")
    }

    fn unknown_sql(sql: &str) -> Self {
        Self::new(-131, format!("Syntax error near '{}'", sql), "42000")
    }

    fn not_connected() -> Self {
        Self::new(-101, "Not connected to a database", "08003")
    }

    fn interrupted() -> Self {
        Self::new(-299, "Statement interrupted by user", "57014")
    }
}

/// Canned answer for one SQL text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptedQuery {
    sql: String,
    params: usize,
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<WireValue>>,
    affected_rows: i32,
    prepare_error: Option<ScriptedError>,
    bind_error: Option<(usize, ScriptedError)>,
    execute_error: Option<ScriptedError>,
    fetch_error: Option<ScriptedError>,
    introspection_error: Option<ScriptedError>,
    block_until_cancel: bool,
}

impl ScriptedQuery {
    pub fn new<S: Into<String>>(sql: S) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Number of bind parameters
    pub fn params(mut self, params: usize) -> Self {
        self.params = params;
        self
    }

    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row<I: IntoIterator<Item = WireValue>>(mut self, row: I) -> Self {
        self.rows.push(row.into_iter().collect());
        self
    }

    pub fn affected_rows(mut self, affected: i32) -> Self {
        self.affected_rows = affected;
        self
    }

    pub fn fail_prepare(mut self, error: ScriptedError) -> Self {
        self.prepare_error = Some(error);
        self
    }

    /// Fail binding the parameter at `index`
    pub fn fail_bind(mut self, index: usize, error: ScriptedError) -> Self {
        self.bind_error = Some((index, error));
        self
    }

    pub fn fail_execute(mut self, error: ScriptedError) -> Self {
        self.execute_error = Some(error);
        self
    }

    /// Report `error` once the rows run out, instead of "row not found"
    pub fn fail_on_fetch(mut self, error: ScriptedError) -> Self {
        self.fetch_error = Some(error);
        self
    }

    /// Make column, parameter and affected-row counts report failure
    pub fn fail_introspection(mut self, error: ScriptedError) -> Self {
        self.introspection_error = Some(error);
        self
    }

    /// Block execution until the connection is cancelled
    pub fn block_until_cancel(mut self) -> Self {
        self.block_until_cancel = true;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Number of calls the driver has seen, per primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub init: usize,
    pub new_connection: usize,
    pub free_connection: usize,
    pub connect: usize,
    pub disconnect: usize,
    pub commit: usize,
    pub rollback: usize,
    pub cancel: usize,
    pub execute_immediate: usize,
    pub prepare: usize,
    pub execute_direct: usize,
    pub bind: usize,
    pub execute: usize,
    pub reset: usize,
    pub free_statement: usize,
    pub fetch: usize,
}

#[derive(Debug, Default)]
struct ConnState {
    connected: bool,
    error: Option<ScriptedError>,
    blocked: bool,
    cancel_requested: bool,
}

#[derive(Debug)]
struct StmtState {
    conn: usize,
    query: ScriptedQuery,
    binds: Vec<Option<WireValue>>,
    executed: bool,
    cursor: usize,
    current: Option<usize>,
    affected: i32,
}

#[derive(Debug, Default)]
struct DriverState {
    queries: HashMap<String, ScriptedQuery>,
    connections: HashMap<usize, ConnState>,
    statements: HashMap<usize, StmtState>,
    next_handle: usize,
    stats: DriverStats,
    fail_init: bool,
    connect_error: Option<ScriptedError>,
    commit_error: Option<ScriptedError>,
    rollback_error: Option<ScriptedError>,
    connect_strings: Vec<String>,
    immediate_log: Vec<String>,
    executions: Vec<Vec<WireValue>>,
}

impl DriverState {
    fn allocate(&mut self) -> usize {
        self.next_handle += 1;
        self.next_handle
    }

    fn set_error(&mut self, conn: usize, error: ScriptedError) {
        if let Some(state) = self.connections.get_mut(&conn) {
            state.error = Some(error);
        }
    }

    fn is_connected(&self, conn: usize) -> bool {
        self.connections.get(&conn).is_some_and(|c| c.connected)
    }

    /// Look up `sql`, leaving an error in the slot when it is not usable
    fn lookup(&mut self, conn: usize, sql: &str) -> Option<ScriptedQuery> {
        if !self.is_connected(conn) {
            self.set_error(conn, ScriptedError::not_connected());
            return None;
        }
        match self.queries.get(sql).cloned() {
            Some(query) => match query.prepare_error.clone() {
                Some(error) => {
                    self.set_error(conn, error);
                    None
                }
                None => Some(query),
            },
            None => {
                self.set_error(conn, ScriptedError::unknown_sql(sql));
                None
            }
        }
    }

    fn new_statement(&mut self, conn: usize, query: ScriptedQuery) -> StatementPtr {
        let id = self.allocate();
        let binds = vec![None; query.params];
        self.statements.insert(
            id,
            StmtState {
                conn,
                query,
                binds,
                executed: false,
                cursor: 0,
                current: None,
                affected: 0,
            },
        );
        StatementPtr(id)
    }
}

/// [`NativeDriver`] backed by canned query answers
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    state: Mutex<DriverState>,
    cancelled: Condvar,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the answer for one SQL text, replacing any earlier one
    pub fn register(&self, query: ScriptedQuery) {
        let mut state = self.state.lock();
        state.queries.insert(query.sql.clone(), query);
    }

    pub fn fail_init(&self) {
        self.state.lock().fail_init = true;
    }

    pub fn fail_connect(&self, error: ScriptedError) {
        self.state.lock().connect_error = Some(error);
    }

    pub fn fail_commit(&self, error: ScriptedError) {
        self.state.lock().commit_error = Some(error);
    }

    pub fn fail_rollback(&self, error: ScriptedError) {
        self.state.lock().rollback_error = Some(error);
    }

    pub fn stats(&self) -> DriverStats {
        self.state.lock().stats
    }

    /// Values bound to each successful execution, in order
    pub fn executions(&self) -> Vec<Vec<WireValue>> {
        self.state.lock().executions.clone()
    }

    /// SQL passed to `execute_immediate`, in order
    pub fn immediate_log(&self) -> Vec<String> {
        self.state.lock().immediate_log.clone()
    }

    /// Connection strings passed to `connect`, in order
    pub fn connect_strings(&self) -> Vec<String> {
        self.state.lock().connect_strings.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn open_statements(&self) -> usize {
        self.state.lock().statements.len()
    }

    /// Check if some call is waiting for a cancel
    pub fn is_blocked(&self) -> bool {
        self.state.lock().connections.values().any(|c| c.blocked)
    }

    /// Wait for a cancel on `conn`; false when none arrived in time
    fn block(&self, state: &mut MutexGuard<'_, DriverState>, conn: usize) -> bool {
        if let Some(c) = state.connections.get_mut(&conn) {
            c.blocked = true;
        }
        let mut cancelled = false;
        loop {
            let requested = state
                .connections
                .get(&conn)
                .is_some_and(|c| c.cancel_requested);
            if requested {
                cancelled = true;
                break;
            }
            if self.cancelled.wait_for(state, BLOCK_LIMIT).timed_out() {
                break;
            }
        }
        if let Some(c) = state.connections.get_mut(&conn) {
            c.blocked = false;
            c.cancel_requested = false;
        }
        cancelled
    }

    fn run_blocking(&self, state: &mut MutexGuard<'_, DriverState>, conn: usize) -> bool {
        if self.block(state, conn) {
            state.set_error(conn, ScriptedError::interrupted());
        } else {
            state.set_error(
                conn,
                ScriptedError::new(-1, "Timed out waiting for cancel", "HYT00"),
            );
        }
        false
    }

    /// Read a count from a statement, -1 when it is gone or scripted to fail
    fn count(&self, stmt: StatementPtr, read: impl FnOnce(&StmtState) -> i32) -> i32 {
        let mut state = self.state.lock();
        let Some(s) = state.statements.get(&stmt.0) else {
            return -1;
        };
        let conn = s.conn;
        let value = read(s);
        match s.query.introspection_error.clone() {
            Some(error) => {
                state.set_error(conn, error);
                -1
            }
            None => value,
        }
    }

    fn execute_statement(&self, state: &mut MutexGuard<'_, DriverState>, id: usize) -> bool {
        let Some(stmt) = state.statements.get(&id) else {
            return false;
        };
        let conn = stmt.conn;
        let query = stmt.query.clone();

        if query.block_until_cancel {
            return self.run_blocking(state, conn);
        }
        if let Some(error) = query.execute_error {
            state.set_error(conn, error);
            return false;
        }

        let Some(stmt) = state.statements.get_mut(&id) else {
            return false;
        };
        if stmt.binds.iter().any(Option::is_none) {
            state.set_error(
                conn,
                ScriptedError::new(-188, "Not enough values for host variables", "07002"),
            );
            return false;
        }
        let bound: Vec<WireValue> = stmt.binds.iter().flatten().cloned().collect();
        stmt.executed = true;
        stmt.cursor = 0;
        stmt.current = None;
        stmt.affected = query.affected_rows;
        state.executions.push(bound);
        true
    }
}

impl NativeDriver for ScriptedDriver {
    fn init(&self, _app_name: &str, _api_version: u32) -> bool {
        let mut state = self.state.lock();
        state.stats.init += 1;
        !state.fail_init
    }

    fn new_connection(&self) -> Option<ConnectionPtr> {
        let mut state = self.state.lock();
        state.stats.new_connection += 1;
        let id = state.allocate();
        state.connections.insert(id, ConnState::default());
        Some(ConnectionPtr(id))
    }

    fn free_connection(&self, conn: ConnectionPtr) {
        let mut state = self.state.lock();
        state.stats.free_connection += 1;
        state.connections.remove(&conn.0);
    }

    fn connect(&self, conn: ConnectionPtr, options: &str) -> bool {
        let mut state = self.state.lock();
        state.stats.connect += 1;
        state.connect_strings.push(options.to_string());
        if let Some(error) = state.connect_error.clone() {
            state.set_error(conn.0, error);
            return false;
        }
        match state.connections.get_mut(&conn.0) {
            Some(c) => {
                c.connected = true;
                true
            }
            None => false,
        }
    }

    fn disconnect(&self, conn: ConnectionPtr) -> bool {
        let mut state = self.state.lock();
        state.stats.disconnect += 1;
        match state.connections.get_mut(&conn.0) {
            Some(c) if c.connected => {
                c.connected = false;
                true
            }
            _ => false,
        }
    }

    fn commit(&self, conn: ConnectionPtr) -> bool {
        let mut state = self.state.lock();
        state.stats.commit += 1;
        if !state.is_connected(conn.0) {
            state.set_error(conn.0, ScriptedError::not_connected());
            return false;
        }
        match state.commit_error.clone() {
            Some(error) => {
                state.set_error(conn.0, error);
                false
            }
            None => true,
        }
    }

    fn rollback(&self, conn: ConnectionPtr) -> bool {
        let mut state = self.state.lock();
        state.stats.rollback += 1;
        if !state.is_connected(conn.0) {
            state.set_error(conn.0, ScriptedError::not_connected());
            return false;
        }
        match state.rollback_error.clone() {
            Some(error) => {
                state.set_error(conn.0, error);
                false
            }
            None => true,
        }
    }

    fn cancel(&self, conn: ConnectionPtr) {
        let mut state = self.state.lock();
        state.stats.cancel += 1;
        if let Some(c) = state.connections.get_mut(&conn.0) {
            if c.blocked {
                c.cancel_requested = true;
            }
        }
        self.cancelled.notify_all();
    }

    fn execute_immediate(&self, conn: ConnectionPtr, sql: &str) -> bool {
        let mut state = self.state.lock();
        state.stats.execute_immediate += 1;
        state.immediate_log.push(sql.to_string());
        if !state.is_connected(conn.0) {
            state.set_error(conn.0, ScriptedError::not_connected());
            return false;
        }
        match state.queries.get(sql).cloned() {
            Some(query) if query.block_until_cancel => self.run_blocking(&mut state, conn.0),
            Some(ScriptedQuery {
                execute_error: Some(error),
                ..
            }) => {
                state.set_error(conn.0, error);
                false
            }
            _ => true,
        }
    }

    fn prepare(&self, conn: ConnectionPtr, sql: &str) -> Option<StatementPtr> {
        let mut state = self.state.lock();
        state.stats.prepare += 1;
        let query = state.lookup(conn.0, sql)?;
        Some(state.new_statement(conn.0, query))
    }

    fn execute_direct(&self, conn: ConnectionPtr, sql: &str) -> Option<StatementPtr> {
        let mut state = self.state.lock();
        state.stats.execute_direct += 1;
        let query = state.lookup(conn.0, sql)?;
        let stmt = state.new_statement(conn.0, query.params(0));
        if self.execute_statement(&mut state, stmt.0) {
            Some(stmt)
        } else {
            state.statements.remove(&stmt.0);
            None
        }
    }

    fn describe_bind_param(&self, stmt: StatementPtr, index: usize) -> Option<BindParamInfo> {
        let state = self.state.lock();
        let s = state.statements.get(&stmt.0)?;
        (index < s.query.params).then(|| BindParamInfo {
            name: format!("param{}", index + 1),
            direction: ParamDirection::Input,
        })
    }

    fn bind_param(&self, stmt: StatementPtr, index: usize, param: &BindParameter) -> bool {
        let mut state = self.state.lock();
        state.stats.bind += 1;
        let Some(s) = state.statements.get_mut(&stmt.0) else {
            return false;
        };
        let conn = s.conn;

        let failure = match &s.query.bind_error {
            Some((at, error)) if *at == index => Some(error.clone()),
            _ if index >= s.binds.len() => Some(ScriptedError::new(
                -689,
                format!("Input parameter index {} out of range", index),
                "07009",
            )),
            _ => None,
        };
        let failure = match failure {
            Some(error) => Some(error),
            None => match bound_value(param) {
                Ok(value) => {
                    s.binds[index] = Some(value);
                    None
                }
                Err(e) => Some(ScriptedError::new(-157, e.to_string(), "53018")),
            },
        };

        match failure {
            Some(error) => {
                state.set_error(conn, error);
                false
            }
            None => true,
        }
    }

    fn execute(&self, stmt: StatementPtr) -> bool {
        let mut state = self.state.lock();
        state.stats.execute += 1;
        self.execute_statement(&mut state, stmt.0)
    }

    fn reset(&self, stmt: StatementPtr) -> bool {
        let mut state = self.state.lock();
        state.stats.reset += 1;
        match state.statements.get_mut(&stmt.0) {
            Some(s) => {
                s.binds.iter_mut().for_each(|b| *b = None);
                s.executed = false;
                s.cursor = 0;
                s.current = None;
                true
            }
            None => false,
        }
    }

    fn free_statement(&self, stmt: StatementPtr) {
        let mut state = self.state.lock();
        state.stats.free_statement += 1;
        state.statements.remove(&stmt.0);
    }

    fn fetch_next(&self, stmt: StatementPtr) -> bool {
        let mut state = self.state.lock();
        state.stats.fetch += 1;
        let Some(s) = state.statements.get_mut(&stmt.0) else {
            return false;
        };
        let conn = s.conn;
        if !s.executed {
            state.set_error(
                conn,
                ScriptedError::new(-180, "Cursor not open", "24501"),
            );
            return false;
        }
        if s.cursor < s.query.rows.len() {
            s.current = Some(s.cursor);
            s.cursor += 1;
            return true;
        }

        s.current = None;
        let error = s
            .query
            .fetch_error
            .clone()
            .unwrap_or_else(ScriptedError::row_not_found);
        state.set_error(conn, error);
        false
    }

    fn get_column(&self, stmt: StatementPtr, index: usize) -> Option<WireValue> {
        let state = self.state.lock();
        let s = state.statements.get(&stmt.0)?;
        let row = s.query.rows.get(s.current?)?;
        row.get(index).cloned()
    }

    fn get_column_info(&self, stmt: StatementPtr, index: usize) -> Option<ColumnInfo> {
        let state = self.state.lock();
        state.statements.get(&stmt.0)?.query.columns.get(index).cloned()
    }

    fn num_cols(&self, stmt: StatementPtr) -> i32 {
        self.count(stmt, |s| s.query.columns.len() as i32)
    }

    fn num_params(&self, stmt: StatementPtr) -> i32 {
        self.count(stmt, |s| s.query.params as i32)
    }

    fn affected_rows(&self, stmt: StatementPtr) -> i32 {
        self.count(stmt, |s| s.affected)
    }

    fn error(&self, conn: ConnectionPtr) -> NativeError {
        let state = self.state.lock();
        match state.connections.get(&conn.0).and_then(|c| c.error.as_ref()) {
            Some(error) => NativeError {
                code: error.code,
                message: error.message.clone(),
            },
            None => NativeError::default(),
        }
    }

    fn sqlstate(&self, conn: ConnectionPtr) -> String {
        let state = self.state.lock();
        state
            .connections
            .get(&conn.0)
            .and_then(|c| c.error.as_ref())
            .map_or_else(|| "00000".to_string(), |e| e.sql_state.clone())
    }

    fn clear_error(&self, conn: ConnectionPtr) {
        let mut state = self.state.lock();
        if let Some(c) = state.connections.get_mut(&conn.0) {
            c.error = None;
        }
    }
}
