// ABOUTME: Lock-free admission limiter bounding how many spawned tasks run at once.
// ABOUTME: The bound can be changed while tasks are in flight; closes on cancellation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::LimiterError;

/// Shared state behind every clone of a [`Parallel`].
struct Inner {
    cancel: CancellationToken,
    /// Desired maximum of concurrently admitted tasks; `< 1` means unlimited.
    limit: AtomicI64,
    /// Reservation counter. A pending request holds 1 unit, an admitted task holds 2.
    count: AtomicI64,
    closed: AtomicBool,
    /// Woken whenever the counter drops, the limit changes, or the limiter closes.
    changed: Notify,
}

impl Inner {
    fn is_running(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Returns the current counter and whether a request holding one pending
    /// unit in it may be admitted.
    fn is_limit_kept(&self) -> (i64, bool) {
        let limit = self.limit.load(Ordering::SeqCst);
        let count = self.count.load(Ordering::SeqCst);
        (count, limit < 1 || count - 1 < limit.saturating_mul(2))
    }

    fn withdraw(&self) {
        let count = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        let limit = self.limit.load(Ordering::SeqCst);
        if count == 0 || limit < 1 || count < limit.saturating_mul(2) || !self.is_running() {
            self.changed.notify_waiters();
        }
    }

    fn release(&self) -> Result<(), LimiterError> {
        let count = self.count.fetch_sub(2, Ordering::SeqCst) - 2;
        self.changed.notify_waiters();
        if count < 0 {
            return Err(LimiterError::NegativeCount);
        }
        Ok(())
    }
}

/// One pending reservation unit, rolled back on drop unless the request was admitted.
struct Pending<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl<'a> Pending<'a> {
    fn reserve(inner: &'a Inner) -> Self {
        inner.count.fetch_add(1, Ordering::SeqCst);
        Self { inner, armed: true }
    }

    fn admitted(mut self) {
        self.armed = false;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.withdraw();
        }
    }
}

/// Held by a running task; gives back both reservation units when the task ends,
/// including when it panics.
struct Admission {
    inner: Arc<Inner>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Err(err) = self.inner.release() {
            error!(
                count = self.inner.count.load(Ordering::SeqCst),
                error = %err,
                "reservation released without a matching admission"
            );
            std::process::abort();
        }
    }
}

/// Dynamically resizable admission gate.
///
/// Every admitted task is spawned onto the tokio runtime and receives a clone
/// of the limiter's cancellation token. Clones of a `Parallel` share state.
///
/// # Admission
///
/// A request first adds one pending unit to the reservation counter so that
/// concurrent requesters see it, then tries to add a second unit with a
/// compare-and-swap while the counter (minus its own pending unit) is below
/// `2 * limit`. A request that does not fit gives its pending unit back and
/// parks until a task finishes, the limit changes, or the limiter closes.
#[derive(Clone)]
pub struct Parallel {
    inner: Arc<Inner>,
}

impl Parallel {
    /// Create a limiter bound to `cancel`. A `limit` below 1 admits without bound.
    pub fn new(cancel: CancellationToken, limit: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancel,
                limit: AtomicI64::new(limit),
                count: AtomicI64::new(0),
                closed: AtomicBool::new(false),
                changed: Notify::new(),
            }),
        }
    }

    /// The limit used for the next admission decision.
    pub fn current_limit(&self) -> i64 {
        self.inner.limit.load(Ordering::SeqCst)
    }

    /// Raw reservation counter (2 per running task, 1 per request mid-admission).
    pub fn reservation(&self) -> i64 {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Whether the limiter still admits tasks.
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Admit `f` and spawn it.
    ///
    /// Returns once the task is running, or `Err(LimiterError::Closed)` if the
    /// limiter closed (explicitly or through its token) before a slot was
    /// granted; in that case `f` is never called.
    pub async fn spawn<F, Fut>(&self, f: F) -> Result<(), LimiterError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.start().await?;

        let admission = Admission {
            inner: self.inner.clone(),
        };
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            let _admission = admission;
            f(cancel).await;
        });

        Ok(())
    }

    /// Wait until no admitted task is running, or until the token is cancelled.
    pub async fn wait(&self) {
        let inner = &self.inner;
        loop {
            let changed = inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if inner.count.load(Ordering::SeqCst) == 0 {
                return;
            }

            tokio::select! {
                () = &mut changed => {}
                () = inner.cancel.cancelled() => return,
            }
        }
    }

    /// Permanently stop admitting. Running tasks are not interrupted.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(reservation = self.reservation(), "limiter closed");
        }
        self.inner.changed.notify_waiters();
    }

    /// Replace the limit. Takes effect on the next admission decision.
    pub fn set_parallelism(&self, limit: i64) {
        self.inner.limit.store(limit, Ordering::SeqCst);
        self.inner.changed.notify_waiters();
    }

    /// Shift the limit by `delta`.
    pub fn add_parallelism(&self, delta: i64) {
        self.inner.limit.fetch_add(delta, Ordering::SeqCst);
        self.inner.changed.notify_waiters();
    }

    async fn start(&self) -> Result<(), LimiterError> {
        let inner = &*self.inner;
        loop {
            let changed = inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let pending = Pending::reserve(inner);
            loop {
                if !inner.is_running() {
                    return Err(LimiterError::Closed);
                }

                let (count, kept) = inner.is_limit_kept();
                if !kept {
                    break;
                }
                if inner
                    .count
                    .compare_exchange(count, count + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    trace!(reservation = count + 1, "admitted");
                    pending.admitted();
                    return Ok(());
                }
            }
            drop(pending);

            tokio::select! {
                () = &mut changed => {}
                () = inner.cancel.cancelled() => {}
            }
        }
    }

    /// Give back one admission without a running task.
    #[cfg(test)]
    pub(crate) fn release(&self) -> Result<(), LimiterError> {
        self.inner.release()
    }

    /// Drop an admission guard that was never granted, as a finished task would.
    #[cfg(test)]
    pub(crate) fn drop_unmatched_admission(&self) {
        drop(Admission {
            inner: self.inner.clone(),
        });
    }
}

impl std::fmt::Debug for Parallel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parallel")
            .field("limit", &self.current_limit())
            .field("reservation", &self.reservation())
            .field("running", &self.is_running())
            .finish()
    }
}
