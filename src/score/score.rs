// ABOUTME: Score sink counting tagged measurements reported by running tasks.
// ABOUTME: Tags carry point values so a run can be reduced to a single total.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use crate::collector::Collector;

/// Tally of measurement tags.
///
/// Like [`Errors`](crate::failure::Errors), any number of tasks may call
/// [`Score::add`] concurrently, and counts are final once [`Score::wait`]
/// returns.
pub struct Score {
    collector: Collector<String>,
    table: Arc<RwLock<HashMap<String, i64>>>,
    points: RwLock<HashMap<String, i64>>,
    default_point: i64,
}

impl Score {
    /// Create a score sink. Tags without an explicit point value are worth 1.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cancel: &CancellationToken) -> Self {
        let table = Arc::new(RwLock::new(HashMap::new()));
        let counts = table.clone();
        let collector = Collector::spawn("score", cancel, move |tag: String| {
            *counts.write().unwrap().entry(tag).or_insert(0) += 1;
        });

        Self {
            collector,
            table,
            points: RwLock::new(HashMap::new()),
            default_point: 1,
        }
    }

    /// Set how many points one occurrence of `tag` is worth.
    pub fn set_point(&self, tag: impl Into<String>, point: i64) {
        self.points.write().unwrap().insert(tag.into(), point);
    }

    pub fn add(&self, tag: impl Into<String>) {
        self.collector.add(tag.into());
    }

    pub async fn wait(&self) {
        self.collector.wait().await;
    }

    pub async fn done(&self) {
        self.collector.close();
        self.wait().await;
    }

    /// Occurrences per tag.
    pub fn breakdown(&self) -> HashMap<String, i64> {
        self.table.read().unwrap().clone()
    }

    /// Sum of occurrences weighted by each tag's point value.
    pub fn total(&self) -> i64 {
        let table = self.table.read().unwrap();
        let points = self.points.read().unwrap();
        table
            .iter()
            .map(|(tag, count)| count * points.get(tag).copied().unwrap_or(self.default_point))
            .sum()
    }
}
