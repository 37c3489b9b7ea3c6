//! Blocking call dispatcher
//!
//! Native calls that may wait on the network (connect, commit, rollback,
//! the execute family and row fetches) are never run on an async worker
//! thread. A [`BlockingDispatcher`] moves them elsewhere and keeps the
//! caller's task suspended until the call returns.
//!
//! Cancellation is cooperative. When the connection's [`InterruptHandle`]
//! fires while a call is in flight, the call's cancel hook runs once (it
//! usually asks the driver to abort the statement) and the dispatcher then
//! keeps waiting for the in-flight call to come back. Nothing is killed.

use super::error::{DatabaseError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// Hook that asks the driver to abort an in-flight call
pub type CancelOp = Box<dyn FnOnce() + Send + 'static>;

/// Interrupts whichever blocking call is in flight on a connection
///
/// Interrupting while no call is in flight has no effect on later calls.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    notify: Arc<Notify>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.notify.notify_waiters();
    }
}

/// A blocking operation plus the hook that can abort it
pub struct BlockingCall {
    label: &'static str,
    op: Box<dyn FnOnce() + Send + 'static>,
    cancel: Option<CancelOp>,
}

impl BlockingCall {
    pub fn new(label: &'static str, op: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            op: Box::new(op),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelOp>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl std::fmt::Debug for BlockingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingCall")
            .field("label", &self.label)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Runs blocking native calls off the async scheduler
///
/// Implementations run `op` exactly once and the cancel hook at most once,
/// and only return after `op` has returned.
#[async_trait]
pub trait BlockingDispatcher: Send + Sync {
    async fn dispatch(&self, call: BlockingCall, interrupt: &InterruptHandle) -> Result<()>;
}

/// Fires the cancel hook at most once; dropping it while armed fires it
struct CancelGuard {
    label: &'static str,
    cancel: Option<CancelOp>,
}

impl CancelGuard {
    fn fire(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            log::debug!("Cancelling in-flight blocking call '{}'", self.label);
            cancel();
        }
    }

    fn disarm(&mut self) {
        self.cancel = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        // the awaiting future went away while the call was still running
        self.fire();
    }
}

/// Dispatcher backed by tokio's blocking thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDispatcher;

#[async_trait]
impl BlockingDispatcher for TokioDispatcher {
    async fn dispatch(&self, call: BlockingCall, interrupt: &InterruptHandle) -> Result<()> {
        let BlockingCall { label, op, cancel } = call;
        let mut guard = CancelGuard { label, cancel };

        let notified = interrupt.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        log::debug!("Dispatching blocking call '{}'", label);
        let mut task = tokio::task::spawn_blocking(op);

        let joined = tokio::select! {
            biased;
            joined = &mut task => joined,
            _ = &mut notified => {
                guard.fire();
                // cooperative: the call still has to come back on its own
                (&mut task).await
            }
        };
        guard.disarm();

        joined.map_err(|e| DatabaseError::dispatch(format!("Blocking call '{}' failed: {}", label, e)))
    }
}

/// Dispatcher that runs the call on the current thread
///
/// For hosts that drive the bridge from a thread they are happy to block.
/// Interrupts cannot reach a call run this way.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

#[async_trait]
impl BlockingDispatcher for InlineDispatcher {
    async fn dispatch(&self, call: BlockingCall, _interrupt: &InterruptHandle) -> Result<()> {
        let BlockingCall { label, op, .. } = call;
        log::debug!("Running blocking call '{}' inline", label);
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(op))
            .map_err(|_| DatabaseError::dispatch(format!("Blocking call '{}' panicked", label)))
    }
}

/// Run `op` through `dispatcher` and return its outcome
pub async fn run<T, F>(
    dispatcher: &dyn BlockingDispatcher,
    interrupt: &InterruptHandle,
    label: &'static str,
    op: F,
    cancel: Option<CancelOp>,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
    let out = Arc::clone(&slot);
    let call = BlockingCall::new(label, move || {
        let value = op();
        *out.lock() = Some(value);
    })
    .with_cancel(cancel);

    dispatcher.dispatch(call, interrupt).await?;

    let value = slot.lock().take();
    value.ok_or_else(|| {
        DatabaseError::dispatch(format!("Blocking call '{}' produced no outcome", label))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting_cancel(counter: &Arc<AtomicUsize>) -> Option<CancelOp> {
        let counter = Arc::clone(counter);
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[tokio::test]
    async fn test_run_returns_outcome() {
        let interrupt = InterruptHandle::new();
        let value = run(&TokioDispatcher, &interrupt, "answer", || 42, None)
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_inline_dispatcher() {
        let interrupt = InterruptHandle::new();
        let value = run(&InlineDispatcher, &interrupt, "inline", || "done", None)
            .await
            .unwrap();
        assert_eq!(value, "done");

        let result: Result<()> =
            run(&InlineDispatcher, &interrupt, "boom", || panic!("boom"), None).await;
        assert!(matches!(result, Err(DatabaseError::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_interrupt_cancels_once_and_waits_for_call() {
        let interrupt = InterruptHandle::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (abort_tx, abort_rx) = mpsc::channel::<()>();

        let cancel: Option<CancelOp> = {
            let cancels = Arc::clone(&cancels);
            Some(Box::new(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
                let _ = abort_tx.send(());
            }))
        };

        let op = {
            let finished = Arc::clone(&finished);
            move || {
                let _ = started_tx.send(());
                abort_rx.recv().unwrap();
                std::thread::sleep(Duration::from_millis(20));
                finished.fetch_add(1, Ordering::SeqCst);
                "aborted"
            }
        };

        let task = {
            let interrupt = interrupt.clone();
            tokio::spawn(async move { run(&TokioDispatcher, &interrupt, "slow", op, cancel).await })
        };

        started_rx.await.unwrap();
        interrupt.interrupt();
        interrupt.interrupt();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, "aborted");
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupt_without_call_in_flight_is_ignored() {
        let interrupt = InterruptHandle::new();
        let cancels = Arc::new(AtomicUsize::new(0));

        interrupt.interrupt();
        let value = run(
            &TokioDispatcher,
            &interrupt,
            "quick",
            || 7,
            counting_cancel(&cancels),
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_future_fires_cancel() {
        let interrupt = InterruptHandle::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let fut = run(
            &TokioDispatcher,
            &interrupt,
            "abandoned",
            move || {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            },
            counting_cancel(&cancels),
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(50), fut).await;

        assert!(timed_out.is_err());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_panicking_call_is_dispatch_error() {
        let interrupt = InterruptHandle::new();
        let result: Result<()> =
            run(&TokioDispatcher, &interrupt, "panics", || panic!("driver crashed"), None).await;
        match result {
            Err(DatabaseError::Dispatch(msg)) => assert!(msg.contains("panics")),
            other => panic!("Expected Dispatch error, got {:?}", other),
        }
    }
}
