// ABOUTME: Construction options for a Worker and their serde-backed config form.
// ABOUTME: Options apply in order, so later options override earlier ones.

use serde::Deserialize;

/// A single construction option for a [`Worker`](super::Worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOption {
    /// Run exactly this many indexed iterations. Values below 1 loop until cancelled.
    LoopCount(i64),
    /// Run until cancelled, passing index `-1` to every call.
    InfinityLoop,
    /// Cap the number of concurrently running iterations. Values below 1 remove the cap.
    MaxParallelism(i64),
    /// No cap on concurrently running iterations.
    UnlimitedParallelism,
}

/// Resolved worker settings. `-1` means unbounded for both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settings {
    pub count: i64,
    pub parallelism: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            count: -1,
            parallelism: -1,
        }
    }
}

impl Settings {
    pub fn from_options(options: impl IntoIterator<Item = WorkerOption>) -> Self {
        let mut settings = Self::default();
        for option in options {
            settings.apply(option);
        }
        settings
    }

    fn apply(&mut self, option: WorkerOption) {
        match option {
            WorkerOption::LoopCount(count) => self.count = count,
            WorkerOption::InfinityLoop => self.count = -1,
            WorkerOption::MaxParallelism(parallelism) => self.parallelism = parallelism,
            WorkerOption::UnlimitedParallelism => self.parallelism = -1,
        }
    }
}

/// Declarative worker configuration, e.g. loaded from a scenario file.
///
/// ```json
/// { "iterations": 100, "parallelism": 8 }
/// ```
///
/// A missing field means unbounded iterations or unlimited parallelism.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of indexed iterations to run.
    pub iterations: Option<i64>,
    /// Maximum concurrently running iterations.
    pub parallelism: Option<i64>,
}

impl WorkerConfig {
    /// Convert to the equivalent option list.
    pub fn options(&self) -> Vec<WorkerOption> {
        vec![
            match self.iterations {
                Some(count) => WorkerOption::LoopCount(count),
                None => WorkerOption::InfinityLoop,
            },
            match self.parallelism {
                Some(parallelism) => WorkerOption::MaxParallelism(parallelism),
                None => WorkerOption::UnlimitedParallelism,
            },
        ]
    }
}
