// ABOUTME: Failure module - classification codes and the concurrent error aggregator.
// ABOUTME: Errors collects task failures from many producers and groups them by code.

mod code;
mod errors;

pub use code::{Classifier, Code, CodedError, error_code};
pub use errors::Errors;
