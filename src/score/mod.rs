// ABOUTME: Score module - concurrent tally of measurement tags.
// ABOUTME: Same intake and drain contract as the error aggregator.

mod score;

pub use score::Score;
