// ABOUTME: Root module for surge - the concurrency core of a load generator.
// ABOUTME: Admission-controlled workers plus concurrent error and score collection.

mod collector;
pub mod error;
pub mod failure;
pub mod parallel;
pub mod prelude;
pub mod score;
pub mod step;
pub mod worker;

pub use error::LimiterError;
