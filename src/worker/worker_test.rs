// ABOUTME: Tests for the Worker scheduler.
// ABOUTME: Covers bounded and unbounded runs, cancellation, and live parallelism changes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{Worker, WorkerOption};

#[derive(Default)]
struct Gauge {
    running: AtomicI64,
    peak: AtomicI64,
    finished: AtomicI64,
}

impl Gauge {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_peak(&self) {
        self.peak
            .store(self.running.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

fn sleeping_worker(gauge: Arc<Gauge>, sleep: Duration, options: Vec<WorkerOption>) -> Worker {
    Worker::new(
        move |_, _| {
            let gauge = gauge.clone();
            async move {
                gauge.enter();
                tokio::time::sleep(sleep).await;
                gauge.leave();
            }
        },
        options,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_runs_every_index_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let gauge = Arc::new(Gauge::default());

    let s = seen.clone();
    let g = gauge.clone();
    let worker = Worker::new(
        move |_, index| {
            let seen = s.clone();
            let gauge = g.clone();
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(1)).await;
                seen.lock().unwrap().push(index);
                gauge.leave();
            }
        },
        [WorkerOption::LoopCount(50), WorkerOption::MaxParallelism(5)],
    );

    let processed = worker.process(CancellationToken::new()).await;
    assert_eq!(processed.admitted, 50);
    assert!(!processed.interrupted);

    // Bounded process returns only after every iteration finished.
    let mut indices = seen.lock().unwrap().clone();
    indices.sort();
    assert_eq!(indices, (0..50).collect::<Vec<i64>>());
    assert!(gauge.peak.load(Ordering::SeqCst) <= 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unbounded_passes_minus_one_until_cancelled() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let worker = Worker::new(
        move |_, index| {
            let seen = s.clone();
            async move {
                seen.lock().unwrap().push(index);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        },
        [WorkerOption::InfinityLoop, WorkerOption::MaxParallelism(4)],
    );

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let processed = tokio::time::timeout(Duration::from_secs(2), worker.process(cancel))
        .await
        .expect("unbounded process should stop on cancel");
    worker.wait().await;

    assert!(processed.interrupted);
    assert!(processed.admitted > 0);
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|&index| index == -1));
}

#[tokio::test]
async fn test_unbounded_unlimited_stops_on_cancel() {
    let worker = Worker::nop([WorkerOption::InfinityLoop, WorkerOption::UnlimitedParallelism]);

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let processed = tokio::time::timeout(Duration::from_secs(2), worker.process(cancel))
        .await
        .expect("submission loop must yield to the runtime");
    assert!(processed.interrupted);
}

#[tokio::test]
async fn test_already_cancelled_submits_nothing() {
    let gauge = Arc::new(Gauge::default());
    let worker = sleeping_worker(
        gauge.clone(),
        Duration::ZERO,
        vec![WorkerOption::LoopCount(10)],
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let processed = worker.process(cancel).await;
    assert_eq!(processed.admitted, 0);
    tokio::task::yield_now().await;
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_bounded_submission() {
    let gauge = Arc::new(Gauge::default());
    let worker = sleeping_worker(
        gauge.clone(),
        Duration::from_millis(10),
        vec![WorkerOption::LoopCount(1000), WorkerOption::MaxParallelism(1)],
    );

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(35)).await;
        canceller.cancel();
    });

    let processed = tokio::time::timeout(Duration::from_secs(2), worker.process(cancel))
        .await
        .expect("bounded process should stop on cancel");
    assert!(processed.interrupted);
    assert!(processed.admitted < 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_set_parallelism_while_running() {
    let gauge = Arc::new(Gauge::default());
    let worker = Arc::new(sleeping_worker(
        gauge.clone(),
        Duration::from_millis(5),
        vec![WorkerOption::InfinityLoop, WorkerOption::MaxParallelism(1)],
    ));

    let cancel = CancellationToken::new();
    let run = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.process(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);

    worker.set_parallelism(8);
    gauge.reset_peak();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak > 1, "raising parallelism should raise concurrency, peak {}", peak);
    assert!(peak <= 8, "peak {} exceeded parallelism 8", peak);

    worker.set_parallelism(1);
    // Let the iterations admitted under the wider bound finish.
    tokio::time::sleep(Duration::from_millis(30)).await;
    gauge.reset_peak();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);

    cancel.cancel();
    run.await.unwrap();
    worker.wait().await;
    assert_eq!(worker.parallelism(), 1);
}

#[tokio::test]
async fn test_set_parallelism_before_process_is_stored() {
    let worker = Worker::nop([WorkerOption::LoopCount(3)]);
    assert_eq!(worker.parallelism(), -1);

    worker.set_parallelism(3);
    assert_eq!(worker.parallelism(), 3);
    assert_eq!(worker.iterations(), 3);

    let processed = worker.process(CancellationToken::new()).await;
    assert_eq!(processed.admitted, 3);
}

#[tokio::test]
async fn test_wait_without_process_returns() {
    let worker = Worker::nop([WorkerOption::LoopCount(1)]);
    tokio::time::timeout(Duration::from_millis(100), worker.wait())
        .await
        .expect("wait before process is a no-op");
}

#[tokio::test]
async fn test_worker_can_process_again() {
    let gauge = Arc::new(Gauge::default());
    let worker = sleeping_worker(
        gauge.clone(),
        Duration::ZERO,
        vec![WorkerOption::LoopCount(10), WorkerOption::MaxParallelism(2)],
    );

    for _ in 0..2 {
        let processed = worker.process(CancellationToken::new()).await;
        assert_eq!(processed.admitted, 10);
        assert!(!processed.interrupted);
    }
    assert_eq!(gauge.finished.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_panicking_iteration_is_isolated() {
    let gauge = Arc::new(Gauge::default());
    let g = gauge.clone();
    let worker = Worker::new(
        move |_, index| {
            let gauge = g.clone();
            async move {
                if index == 2 {
                    panic!("iteration {} failed", index);
                }
                gauge.enter();
                gauge.leave();
            }
        },
        [WorkerOption::LoopCount(5), WorkerOption::MaxParallelism(1)],
    );

    let processed = worker.process(CancellationToken::new()).await;
    assert_eq!(processed.admitted, 5);
    assert_eq!(gauge.finished.load(Ordering::SeqCst), 4);
}
