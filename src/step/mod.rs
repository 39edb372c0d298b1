// ABOUTME: Step module - the facade benchmark tasks report through.
// ABOUTME: Tags errors with the step's code and forwards them alongside scores.

mod step;

pub use step::Step;
