// ABOUTME: Worker drives a task function for N indexed iterations or until cancelled.
// ABOUTME: Every iteration is admitted through a Parallel limiter owned by the worker.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::options::{Settings, WorkerOption};
use crate::parallel::Parallel;

/// Type-erased task function. Receives the run's cancellation token and the
/// iteration index (`-1` when looping until cancelled).
pub type WorkFn = Arc<dyn Fn(CancellationToken, i64) -> BoxFuture<'static, ()> + Send + Sync>;

/// Summary of one [`Worker::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Processed {
    /// Iterations admitted and spawned.
    pub admitted: u64,
    /// True when submission stopped because of cancellation or a closed limiter
    /// rather than by running out of iterations.
    pub interrupted: bool,
}

/// Scheduler for a load-generating task.
///
/// The iteration count is fixed at construction. Parallelism can be changed at
/// any time with [`Worker::set_parallelism`], including while
/// [`Worker::process`] runs; share the worker through an `Arc` to do so.
pub struct Worker {
    work: WorkFn,
    count: i64,
    parallelism: Mutex<i64>,
    limiter: Mutex<Option<Parallel>>,
}

impl Worker {
    /// Create a worker running `f` with the given options.
    pub fn new<F, Fut>(f: F, options: impl IntoIterator<Item = WorkerOption>) -> Self
    where
        F: Fn(CancellationToken, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let work: WorkFn = Arc::new(move |cancel, index| f(cancel, index).boxed());
        Self::from_work_fn(work, options)
    }

    /// Create a worker from an already type-erased task function.
    pub fn from_work_fn(work: WorkFn, options: impl IntoIterator<Item = WorkerOption>) -> Self {
        let settings = Settings::from_options(options);
        Self {
            work,
            count: settings.count,
            parallelism: Mutex::new(settings.parallelism),
            limiter: Mutex::new(None),
        }
    }

    /// A worker whose task does nothing. Useful for measuring scheduler overhead.
    pub fn nop(options: impl IntoIterator<Item = WorkerOption>) -> Self {
        Self::new(|_, _| async {}, options)
    }

    /// Configured iteration count; below 1 means loop until cancelled.
    pub fn iterations(&self) -> i64 {
        self.count
    }

    /// Configured parallelism; below 1 means unlimited.
    pub fn parallelism(&self) -> i64 {
        *self.parallelism.lock().unwrap()
    }

    /// Run the task function until the iterations are exhausted or `cancel` fires.
    ///
    /// With a bounded iteration count, indices `0..count` are submitted in order
    /// and this returns after every admitted iteration has finished. Otherwise
    /// the task is submitted with index `-1` until cancellation, and this
    /// returns without waiting for running iterations; call [`Worker::wait`].
    pub async fn process(&self, cancel: CancellationToken) -> Processed {
        if cancel.is_cancelled() {
            return Processed {
                admitted: 0,
                interrupted: true,
            };
        }

        let limiter = self.fresh_limiter(&cancel);
        debug!(
            iterations = self.count,
            parallelism = limiter.current_limit(),
            "worker processing"
        );

        let processed = if self.count < 1 {
            self.process_infinity(&limiter, &cancel).await
        } else {
            self.process_limited(&limiter, &cancel, self.count).await
        };

        limiter.close();
        debug!(
            admitted = processed.admitted,
            interrupted = processed.interrupted,
            "worker stopped submitting"
        );
        processed
    }

    async fn process_infinity(&self, limiter: &Parallel, cancel: &CancellationToken) -> Processed {
        let mut admitted = 0;
        while !cancel.is_cancelled() {
            let work = self.work.clone();
            if limiter.spawn(move |token| work(token, -1)).await.is_err() {
                break;
            }
            admitted += 1;
            // Admission may never suspend when parallelism is unlimited.
            tokio::task::yield_now().await;
        }

        Processed {
            admitted,
            interrupted: true,
        }
    }

    async fn process_limited(
        &self,
        limiter: &Parallel,
        cancel: &CancellationToken,
        count: i64,
    ) -> Processed {
        let mut admitted = 0;
        for index in 0..count {
            if cancel.is_cancelled() {
                return Processed {
                    admitted,
                    interrupted: true,
                };
            }

            let work = self.work.clone();
            if let Err(err) = limiter.spawn(move |token| work(token, index)).await {
                debug!(index, error = %err, "iteration rejected");
                return Processed {
                    admitted,
                    interrupted: true,
                };
            }
            admitted += 1;
        }

        limiter.wait().await;
        Processed {
            admitted,
            interrupted: false,
        }
    }

    /// Wait until no iteration of the latest run is still running, or until
    /// that run's token fires. Returns immediately if `process` never ran.
    pub async fn wait(&self) {
        let limiter = self.limiter.lock().unwrap().clone();
        if let Some(limiter) = limiter {
            limiter.wait().await;
        }
    }

    /// Change the parallelism. Applies to the live limiter immediately, and to
    /// every later run.
    pub fn set_parallelism(&self, parallelism: i64) {
        let mut stored = self.parallelism.lock().unwrap();
        *stored = parallelism;
        if let Some(limiter) = self.limiter.lock().unwrap().as_ref() {
            limiter.set_parallelism(parallelism);
        }
    }

    /// Replace the limiter with a new one bound to this run's token. A limiter
    /// from an earlier run is never reopened.
    fn fresh_limiter(&self, cancel: &CancellationToken) -> Parallel {
        let parallelism = self.parallelism.lock().unwrap();
        let limiter = Parallel::new(cancel.clone(), *parallelism);
        if let Some(previous) = self.limiter.lock().unwrap().replace(limiter.clone()) {
            previous.close();
        }
        limiter
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("iterations", &self.count)
            .field("parallelism", &self.parallelism())
            .finish()
    }
}
