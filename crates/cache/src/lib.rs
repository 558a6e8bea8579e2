#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;
pub mod profile;

pub use client::ViewerContextCache;
pub use local::LocalProfiles;
pub use profile::ViewerProfile;
