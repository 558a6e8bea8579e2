//! Catalog Store and Event Log implementations.

#![warn(clippy::unwrap_used)]

pub mod events;
pub mod seed;
pub mod store;
pub mod validate;

pub use events::InMemoryEventLog;
pub use seed::CatalogSeed;
pub use store::InMemoryCatalog;
