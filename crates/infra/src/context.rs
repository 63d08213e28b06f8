//! Per-call deadline and cancellation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::LedgerError;

#[derive(Debug, Default)]
struct Signal {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation flag. Every clone observes the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<Signal>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent `cancel` is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Carried by every engine operation; each store call is raced against it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationSignal,
}

impl CallContext {
    /// No deadline, never cancelled unless the returned context's signal is.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancel
    }

    /// Fail fast if the call is already dead.
    pub fn check(&self, operation: &'static str) -> Result<(), LedgerError> {
        if self.cancel.is_cancelled() {
            return Err(LedgerError::Cancelled(operation));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LedgerError::DeadlineExceeded(operation));
        }
        Ok(())
    }

    /// Drive `fut` unless the context is cancelled or its deadline passes first.
    ///
    /// Work the future already committed is not rolled back.
    pub async fn run<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<LedgerError>,
    {
        self.check(operation)?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(operation, "call cancelled");
                Err(LedgerError::Cancelled(operation))
            }
            _ = deadline => {
                tracing::debug!(operation, "call deadline exceeded");
                Err(LedgerError::DeadlineExceeded(operation))
            }
            res = fut => res.map_err(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[tokio::test]
    async fn completes_when_nothing_fires() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let out = ctx
            .run("noop", async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn store_errors_become_storage() {
        let ctx = CallContext::new();
        let err = ctx
            .run("insert_expense", async {
                Err::<(), _>(StoreError::PoolClosed)
            })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Storage(StoreError::PoolClosed));
    }

    #[tokio::test]
    async fn already_cancelled_context_short_circuits() {
        let ctx = CallContext::new();
        ctx.cancellation().cancel();

        let err = ctx
            .run("get_expense", async { Ok::<_, StoreError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Cancelled("get_expense"));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_call() {
        let signal = CancellationSignal::new();
        let ctx = CallContext::new().with_cancellation(signal.clone());

        let handle = tokio::spawn(async move {
            ctx.run("stuck", std::future::pending::<Result<(), StoreError>>())
                .await
        });
        tokio::task::yield_now().await;
        signal.cancel();

        assert_eq!(
            handle.await.unwrap().unwrap_err(),
            LedgerError::Cancelled("stuck")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_call() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run("stuck", std::future::pending::<Result<(), StoreError>>())
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::DeadlineExceeded("stuck"));
    }
}
