//! Shared native connection handle
//!
//! A [`ConnectionHandle`] exclusively owns one native connection. Its
//! lifetime is governed by an explicit reference count: the host-facing
//! [`Connection`](super::Connection) holds one reference, every live
//! statement holds one, and every call in flight holds one. The native
//! connection is disconnected and freed exactly once, when the count drops
//! to zero.
//!
//! The native connection must not see two calls at once. Every operation
//! takes a [`CallGuard`] for its whole duration; a second operation fails
//! fast while the guard is held. Closing a connection or a statement never
//! fails. When a call is in flight, the native disconnect or free is queued
//! and performed as that call finishes.

use crate::core::dispatcher::{self, BlockingDispatcher, CancelOp, InterruptHandle};
use crate::core::driver::{ConnectionPtr, NativeDriver, StatementPtr};
use crate::core::error::{DatabaseError, Result};
use crate::core::options::Settings;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Native work that must wait until the connection is idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Disconnect,
    FreeStatement(StatementPtr),
}

#[derive(Debug)]
struct HandleState {
    closed: bool,
    /// Label of the call holding the connection
    busy: Option<&'static str>,
    deferred: Vec<Deferred>,
    freed: bool,
}

pub(crate) struct ConnectionHandle {
    driver: Arc<dyn NativeDriver>,
    native: ConnectionPtr,
    dispatcher: Arc<dyn BlockingDispatcher>,
    interrupt: InterruptHandle,
    settings: Settings,
    refcount: AtomicUsize,
    state: Mutex<HandleState>,
}

impl ConnectionHandle {
    /// Wrap a freshly allocated native connection, not yet connected
    pub(crate) fn new(
        driver: Arc<dyn NativeDriver>,
        native: ConnectionPtr,
        dispatcher: Arc<dyn BlockingDispatcher>,
        settings: Settings,
    ) -> Arc<Self> {
        Arc::new(Self {
            driver,
            native,
            dispatcher,
            interrupt: InterruptHandle::new(),
            settings,
            refcount: AtomicUsize::new(1),
            state: Mutex::new(HandleState {
                closed: true,
                busy: None,
                deferred: Vec::new(),
                freed: false,
            }),
        })
    }

    pub(crate) fn driver(&self) -> &dyn NativeDriver {
        self.driver.as_ref()
    }

    pub(crate) fn native(&self) -> ConnectionPtr {
        self.native
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn interrupt(&self) -> &InterruptHandle {
        &self.interrupt
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn refcount(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_open(&self) {
        self.state.lock().closed = false;
    }

    pub(crate) fn retain(&self) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop one reference; the last one disconnects and frees the native connection
    pub(crate) fn release(&self) {
        let previous = self
            .refcount
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.teardown(),
            Ok(_) => {}
            Err(_) => log::warn!("Released a connection handle that holds no references"),
        }
    }

    fn teardown(&self) {
        self.close();

        {
            let mut state = self.state.lock();
            if state.freed {
                return;
            }
            state.freed = true;
        }
        self.driver.free_connection(self.native);
        log::debug!("Native connection {:?} freed", self.native);
    }

    /// Disconnect unless already closed
    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.when_idle(Deferred::Disconnect);
    }

    /// Free a native statement, now or once the in-flight call finishes
    pub(crate) fn free_statement(&self, stmt: StatementPtr) {
        self.when_idle(Deferred::FreeStatement(stmt));
    }

    fn when_idle(&self, work: Deferred) {
        {
            let mut state = self.state.lock();
            if let Some(label) = state.busy {
                log::debug!("Deferring {:?} until '{}' finishes", work, label);
                state.deferred.push(work);
                return;
            }
            state.busy = Some("close");
        }
        self.perform(work);
        self.finish_call();
    }

    fn perform(&self, work: Deferred) {
        match work {
            Deferred::Disconnect => {
                if !self.driver.disconnect(self.native) {
                    let err = self.take_error();
                    log::warn!("Disconnect failed: {}", err);
                } else {
                    log::debug!("Native connection {:?} disconnected", self.native);
                }
            }
            Deferred::FreeStatement(stmt) => {
                self.driver.free_statement(stmt);
                log::debug!("Native statement {:?} freed", stmt);
            }
        }
    }

    /// Run queued work, then mark the connection idle
    fn finish_call(&self) {
        loop {
            let pending = {
                let mut state = self.state.lock();
                if state.deferred.is_empty() {
                    state.busy = None;
                    return;
                }
                std::mem::take(&mut state.deferred)
            };
            for work in pending {
                self.perform(work);
            }
        }
    }

    /// Claim the connection for one operation
    pub(crate) fn acquire(self: &Arc<Self>, label: &'static str) -> Result<Arc<CallGuard>> {
        {
            let mut state = self.state.lock();
            if state.freed {
                return Err(DatabaseError::state("connection handle has been freed"));
            }
            if let Some(current) = state.busy {
                return Err(DatabaseError::state(format!(
                    "connection is busy running '{}', cannot start '{}'",
                    current, label
                )));
            }
            state.busy = Some(label);
        }
        self.retain();
        Ok(Arc::new(CallGuard {
            handle: Arc::clone(self),
        }))
    }

    /// Read the connection's error slot into an error and clear the slot
    pub(crate) fn take_error(&self) -> DatabaseError {
        let native = self.driver.error(self.native);
        let sql_state = self.driver.sqlstate(self.native);
        self.driver.clear_error(self.native);
        DatabaseError::driver(native.message, native.code, sql_state)
    }

    /// Code currently in the error slot, left in place
    pub(crate) fn error_code(&self) -> i32 {
        self.driver.error(self.native).code
    }

    pub(crate) fn clear_error(&self) {
        self.driver.clear_error(self.native);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("native", &self.native)
            .field("refcount", &self.refcount())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Exclusive claim on a connection for the duration of one operation
///
/// Blocking closures hold a clone, so the claim (and the reference it
/// carries) outlives an abandoned future until the native call returns.
pub(crate) struct CallGuard {
    handle: Arc<ConnectionHandle>,
}

impl CallGuard {
    pub(crate) fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Err(DatabaseError::state("connection is closed"));
        }
        Ok(())
    }

    /// Run `op` through the connection's dispatcher
    ///
    /// With `cancellable` set, an interrupt asks the driver to cancel
    /// whatever is running on the connection.
    pub(crate) async fn dispatch<T, F>(
        self: &Arc<Self>,
        label: &'static str,
        cancellable: bool,
        op: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ConnectionHandle) -> T + Send + 'static,
    {
        let handle = &self.handle;
        let cancel: Option<CancelOp> = if cancellable {
            let driver = Arc::clone(&handle.driver);
            let native = handle.native;
            Some(Box::new(move || driver.cancel(native)))
        } else {
            None
        };

        let guard = Arc::clone(self);
        dispatcher::run(
            handle.dispatcher.as_ref(),
            &handle.interrupt,
            label,
            move || op(&guard.handle),
            cancel,
        )
        .await
    }
}

impl std::ops::Deref for CallGuard {
    type Target = ConnectionHandle;

    fn deref(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.handle.finish_call();
        self.handle.release();
    }
}

#[cfg(all(test, feature = "scripted"))]
mod tests {
    use super::*;
    use crate::backends::ScriptedDriver;
    use crate::core::dispatcher::TokioDispatcher;

    fn handle(driver: &Arc<ScriptedDriver>) -> Arc<ConnectionHandle> {
        let native = driver.new_connection().unwrap();
        assert!(driver.connect(native, "ServerName=test"));
        let handle = ConnectionHandle::new(
            driver.clone(),
            native,
            Arc::new(TokioDispatcher),
            Settings::default(),
        );
        handle.mark_open();
        handle
    }

    #[test]
    fn test_last_release_frees_once() {
        let driver = Arc::new(ScriptedDriver::new());
        let handle = handle(&driver);

        handle.retain();
        handle.retain();
        assert_eq!(handle.refcount(), 3);

        handle.release();
        handle.release();
        assert_eq!(driver.stats().free_connection, 0);
        assert!(!handle.is_closed());

        handle.release();
        assert!(handle.is_closed());
        assert_eq!(driver.stats().disconnect, 1);
        assert_eq!(driver.stats().free_connection, 1);

        handle.release();
        assert_eq!(driver.stats().free_connection, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let driver = Arc::new(ScriptedDriver::new());
        let handle = handle(&driver);

        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(driver.stats().disconnect, 1);

        handle.release();
        assert_eq!(driver.stats().disconnect, 1);
        assert_eq!(driver.stats().free_connection, 1);
    }

    #[test]
    fn test_busy_connection_rejects_second_call() {
        let driver = Arc::new(ScriptedDriver::new());
        let handle = handle(&driver);

        let guard = handle.acquire("execute").unwrap();
        assert_eq!(handle.refcount(), 2);

        match handle.acquire("commit") {
            Err(DatabaseError::State(msg)) => {
                assert!(msg.contains("busy"));
                assert!(msg.contains("execute"));
            }
            other => panic!("Expected busy State error, got {:?}", other.map(|_| ())),
        }

        drop(guard);
        assert_eq!(handle.refcount(), 1);
        assert!(handle.acquire("commit").is_ok());
    }

    #[test]
    fn test_close_while_busy_is_deferred() {
        let driver = Arc::new(ScriptedDriver::new());
        let handle = handle(&driver);

        let guard = handle.acquire("fetch").unwrap();
        handle.close();
        assert!(handle.is_closed());
        assert!(guard.ensure_open().is_err());
        assert_eq!(driver.stats().disconnect, 0);

        drop(guard);
        assert_eq!(driver.stats().disconnect, 1);
    }

    #[tokio::test]
    async fn test_dispatch_runs_with_handle() {
        let driver = Arc::new(ScriptedDriver::new());
        let handle = handle(&driver);

        let guard = handle.acquire("commit").unwrap();
        let ok = guard
            .dispatch("commit", false, |h| h.driver().commit(h.native()))
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(driver.stats().commit, 1);
    }
}
