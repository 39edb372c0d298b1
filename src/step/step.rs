// ABOUTME: Step bundles the error and score sinks of one benchmark phase.
// ABOUTME: The error code is an immutable value per handle, not shared mutable state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::failure::{Code, CodedError, Errors};
use crate::score::Score;

/// Reporting handle for one benchmark phase.
///
/// Clones share the same sinks and cancellation token. [`Step::with_code`]
/// derives a handle that tags errors with a different code, so concurrent
/// tasks never race on a shared code field.
#[derive(Clone)]
pub struct Step {
    code: Code,
    errors: Arc<Errors>,
    score: Arc<Score>,
    cancel: CancellationToken,
}

impl Step {
    /// Create a step whose sinks close when `parent` or [`Step::cancel`] fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        Self {
            code: Code::UNKNOWN,
            errors: Arc::new(Errors::new(&cancel)),
            score: Arc::new(Score::new(&cancel)),
            cancel,
        }
    }

    /// A handle sharing this step's sinks that tags errors with `code`.
    pub fn with_code(&self, code: impl Into<Code>) -> Self {
        Self {
            code: code.into(),
            ..self.clone()
        }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Token cancelled when the step is cancelled. Pass it to workers of this step.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record a failure. Errors are wrapped with this handle's code unless it is
    /// [`Code::UNKNOWN`], in which case they keep their own classification.
    ///
    /// The classifier reports the outermost code, so wrapping with `unknown`
    /// would hide a more specific code the task already attached.
    pub fn add_error(&self, err: impl Into<anyhow::Error>) {
        if self.code == Code::UNKNOWN {
            self.errors.add(err);
        } else {
            self.errors.add(CodedError::new(self.code.clone(), err));
        }
    }

    pub fn add_score(&self, tag: impl Into<String>) {
        self.score.add(tag);
    }

    /// Stop the step: closes both sinks and cancels every worker using its token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for both sinks to drain.
    pub async fn wait(&self) {
        tokio::join!(self.score.wait(), self.errors.wait());
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn score(&self) -> &Score {
        &self.score
    }
}
