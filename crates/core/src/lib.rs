pub mod config;
pub mod context;
pub mod error;
pub mod placement;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use context::TargetingContext;
pub use error::{AdServeError, AdServeResult};
pub use placement::{Dimensions, Placement};
pub use store::{AnonymousViewer, CatalogStore, EventLog, ViewerContextProvider};
