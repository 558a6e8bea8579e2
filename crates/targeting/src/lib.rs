//! Targeting: which advertisements may serve a request, and which one wins.

pub mod eligibility;
pub mod selection;
pub mod selector;

pub use eligibility::{Rejection, SelectionRequest};
pub use selector::AdSelector;
