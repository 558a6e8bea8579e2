#![warn(clippy::unwrap_used)]

pub mod recorder;

pub use recorder::{EngagementRecorder, Tracked};
