//! Tasks — the slice of the task domain the profile pages read.

pub mod model;

pub use model::{AttemptState, TaskAttempt};
