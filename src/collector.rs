// ABOUTME: Single-reader intake shared by the error and score sinks.
// ABOUTME: Many producers send without blocking; one task drains into a sink closure.

use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Intake<T> = Arc<RwLock<Option<mpsc::UnboundedSender<T>>>>;

/// Unbounded intake with exactly one consuming task.
///
/// Closing happens once, either through [`Collector::close`] or when the parent
/// token fires, and takes effect before the call returns: an item added after
/// closing is dropped. Items accepted before closing are all handed to the sink
/// before [`Collector::wait`] returns.
pub(crate) struct Collector<T> {
    intake: Intake<T>,
    closer: CancellationToken,
    drained: Arc<watch::Sender<bool>>,
}

impl<T: Send + 'static> Collector<T> {
    /// Start the consuming task. Must be called from within a tokio runtime.
    pub fn spawn<S>(name: &'static str, cancel: &CancellationToken, mut sink: S) -> Self
    where
        S: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let intake: Intake<T> = Arc::new(RwLock::new(Some(tx)));
        let closer = cancel.child_token();
        let drained = Arc::new(watch::channel(false).0);

        // Drops the sender once the parent token fires or close() is called.
        let close = closer.clone();
        let slot = intake.clone();
        tokio::spawn(async move {
            close.cancelled().await;
            slot.write().unwrap().take();
        });

        let done = drained.clone();
        tokio::spawn(async move {
            let mut received: u64 = 0;
            while let Some(item) = rx.recv().await {
                sink(item);
                received += 1;
            }

            debug!(collector = name, received, "collector drained");
            done.send_replace(true);
        });

        Self {
            intake,
            closer,
            drained,
        }
    }

    /// Hand an item to the consuming task. A no-op once closed.
    pub fn add(&self, item: T) {
        if self.closer.is_cancelled() {
            self.close();
            return;
        }
        if let Some(tx) = self.intake.read().unwrap().as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Close the intake. Idempotent, and agrees with closure by cancellation.
    pub fn close(&self) {
        self.closer.cancel();
        self.intake.write().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Wait until the intake is closed and every accepted item reached the sink.
    pub async fn wait(&self) {
        let mut drained = self.drained.subscribe();
        let _ = drained.wait_for(|drained| *drained).await;
    }
}

impl<T> Drop for Collector<T> {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}
