// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use surge::prelude::*;` to get started quickly.

pub use crate::error::LimiterError;
pub use crate::failure::{Classifier, Code, CodedError, Errors, error_code};
pub use crate::parallel::Parallel;
pub use crate::score::Score;
pub use crate::step::Step;
pub use crate::worker::{Processed, WorkFn, Worker, WorkerConfig, WorkerOption};
pub use tokio_util::sync::CancellationToken;
