// ABOUTME: Concurrent error aggregator fed by many producers, drained by one collector.
// ABOUTME: Provides grouped snapshots of collected errors by classification code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use super::code::{Classifier, Code, error_code};
use crate::collector::Collector;

type Log = Arc<RwLock<Vec<(Code, anyhow::Error)>>>;

/// Append-only log of task failures.
///
/// [`Errors::add`] never blocks and never fails; once the aggregator is closed
/// (by [`Errors::done`] or by its cancellation token) added errors are dropped.
/// Snapshots taken before [`Errors::wait`] returns may miss errors that are
/// still queued.
pub struct Errors {
    collector: Collector<anyhow::Error>,
    log: Log,
}

impl Errors {
    /// Create an aggregator classifying with [`error_code`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cancel: &CancellationToken) -> Self {
        Self::with_classifier(cancel, Arc::new(error_code))
    }

    /// Create an aggregator with a custom classifier.
    pub fn with_classifier(cancel: &CancellationToken, classify: Classifier) -> Self {
        let log: Log = Arc::new(RwLock::new(Vec::new()));
        let entries = log.clone();
        let collector = Collector::spawn("errors", cancel, move |err: anyhow::Error| {
            let code = classify(&err);
            entries.write().unwrap().push((code, err));
        });

        Self { collector, log }
    }

    pub fn add(&self, err: impl Into<anyhow::Error>) {
        self.collector.add(err.into());
    }

    /// Wait until the aggregator is closed and fully drained.
    pub async fn wait(&self) {
        self.collector.wait().await;
    }

    /// Close the aggregator, then wait for it to drain.
    pub async fn done(&self) {
        self.collector.close();
        self.wait().await;
    }

    pub fn is_closed(&self) -> bool {
        self.collector.is_closed()
    }

    /// Number of errors appended so far.
    pub fn len(&self) -> usize {
        self.log.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Error messages grouped by code, in the order they were collected.
    pub fn messages(&self) -> HashMap<Code, Vec<String>> {
        let log = self.log.read().unwrap();
        let mut table: HashMap<Code, Vec<String>> = HashMap::new();
        for (code, err) in log.iter() {
            table.entry(code.clone()).or_default().push(err.to_string());
        }
        table
    }

    /// Number of errors per code.
    pub fn count(&self) -> HashMap<Code, i64> {
        let log = self.log.read().unwrap();
        let mut table: HashMap<Code, i64> = HashMap::new();
        for (code, _) in log.iter() {
            *table.entry(code.clone()).or_insert(0) += 1;
        }
        table
    }
}
