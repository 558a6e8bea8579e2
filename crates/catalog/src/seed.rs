//! JSON catalog snapshots used to bootstrap an in-memory catalog.

use adserve_core::error::AdServeResult;
use adserve_core::types::{Advertisement, AdvertisementFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub formats: Vec<AdvertisementFormat>,
    #[serde(default)]
    pub advertisements: Vec<Advertisement>,
}

impl CatalogSeed {
    pub async fn load(path: impl AsRef<Path>) -> AdServeResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let seed = Self::from_json(&raw)?;
        debug!(path = %path.display(), "Catalog seed parsed");
        Ok(seed)
    }

    pub fn from_json(raw: &str) -> AdServeResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
