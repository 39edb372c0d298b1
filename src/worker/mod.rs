// ABOUTME: Worker module - schedules a task function through an admission limiter.
// ABOUTME: Exposes Worker, its construction options, and WorkerConfig.

mod options;
mod worker;

pub use options::{WorkerConfig, WorkerOption};
pub use worker::{Processed, WorkFn, Worker};

#[cfg(test)]
mod worker_test;
