// ABOUTME: Classification codes and the coded error wrapper.
// ABOUTME: error_code maps an arbitrary error to a code for grouping.

use std::borrow::{Borrow, Cow};
use std::sync::Arc;

/// Taxonomy label attached to an error for grouping and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code(Cow<'static, str>);

impl Code {
    /// Errors that carry no code.
    pub const UNKNOWN: Code = Code::from_static("unknown");
    /// Tasks that were cancelled before completing.
    pub const CANCELED: Code = Code::from_static("canceled");
    /// Operations that ran out of time.
    pub const TIMEOUT: Code = Code::from_static("timeout");

    pub const fn from_static(code: &'static str) -> Self {
        Self(Cow::Borrowed(code))
    }

    pub fn new(code: impl Into<String>) -> Self {
        Self(Cow::Owned(code.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Code {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Code {
    fn from(code: &'static str) -> Self {
        Self::from_static(code)
    }
}

impl From<String> for Code {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

/// An error tagged with a classification code.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {source}")]
pub struct CodedError {
    code: Code,
    #[source]
    source: anyhow::Error,
}

impl CodedError {
    pub fn new(code: impl Into<Code>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            code: code.into(),
            source: source.into(),
        }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }
}

/// Maps an error to the code it is grouped under. Must be total and deterministic.
pub type Classifier = Arc<dyn Fn(&anyhow::Error) -> Code + Send + Sync>;

/// Default classifier.
///
/// Walks the error chain and returns the outermost [`CodedError`]'s code.
/// Timeouts and cancelled tasks map to [`Code::TIMEOUT`] and [`Code::CANCELED`];
/// anything else is [`Code::UNKNOWN`].
pub fn error_code(err: &anyhow::Error) -> Code {
    for cause in err.chain() {
        if let Some(coded) = cause.downcast_ref::<CodedError>() {
            return coded.code.clone();
        }
        if cause.is::<tokio::time::error::Elapsed>() {
            return Code::TIMEOUT;
        }
        if let Some(join) = cause.downcast_ref::<tokio::task::JoinError>() {
            if join.is_cancelled() {
                return Code::CANCELED;
            }
        }
    }
    Code::UNKNOWN
}
