// ABOUTME: Parallel module - admission control for concurrently spawned tasks.
// ABOUTME: Exposes the resizable Parallel limiter.

mod limiter;

pub use limiter::Parallel;
