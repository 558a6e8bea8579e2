//! Delivery surface: one per mounted placement instance. Requests a winner,
//! watches visibility, records engagement and hands clicks to navigation.

#![warn(clippy::unwrap_used)]

pub mod navigator;
pub mod surface;
pub mod visibility;

pub use navigator::{Navigator, RecordingNavigator};
pub use surface::{DeliveryServices, DeliverySurface, SurfaceProps, SurfaceState};
pub use visibility::{Visibility, VisibilityTracker};
