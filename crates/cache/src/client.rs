//! Viewer context provider with two-tier caching: LocalProfiles (L1) -> Redis (L2).
//! Lookups are best-effort: any miss or backend failure yields an empty context.

use crate::local::LocalProfiles;
use crate::profile::ViewerProfile;
use adserve_core::config::RedisConfig;
use adserve_core::context::TargetingContext;
use adserve_core::store::ViewerContextProvider;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ViewerContextCache {
    redis: Option<redis::Client>,
    local: Arc<LocalProfiles>,
    ttl_secs: u64,
}

impl ViewerContextCache {
    /// Connect to Redis and verify connectivity.
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            redis: Some(client),
            local: Arc::new(Self::l1(config)),
            ttl_secs: config.ttl_secs,
        })
    }

    /// In-process only, for deployments and tests without Redis.
    pub fn local_only(config: &RedisConfig) -> Self {
        Self {
            redis: None,
            local: Arc::new(Self::l1(config)),
            ttl_secs: config.ttl_secs,
        }
    }

    fn l1(config: &RedisConfig) -> LocalProfiles {
        // L1 TTL is half of L2
        LocalProfiles::new(Duration::from_secs(config.ttl_secs / 2), config.local_max_entries)
    }

    /// Checks L1 first, then Redis.
    pub async fn get_profile(&self, viewer_id: Uuid) -> anyhow::Result<Option<ViewerProfile>> {
        if let Some(profile) = self.local.get(viewer_id) {
            metrics::counter!("cache.l1.hit").increment(1);
            return Ok(Some(profile));
        }
        metrics::counter!("cache.l1.miss").increment(1);

        let Some(client) = &self.redis else {
            return Ok(None);
        };
        let mut conn = client.get_multiplexed_async_connection().await?;
        let data: Option<String> = conn.get(Self::key(viewer_id)).await?;

        match data {
            Some(json) => {
                let profile: ViewerProfile = serde_json::from_str(&json)?;
                self.local.put(profile.clone());
                metrics::counter!("cache.l2.hit").increment(1);
                Ok(Some(profile))
            }
            None => {
                metrics::counter!("cache.l2.miss").increment(1);
                debug!(viewer_id = %viewer_id, "Cache miss for viewer profile");
                Ok(None)
            }
        }
    }

    /// Store a profile in both tiers. A full L1 leaves the profile to Redis.
    pub async fn put_profile(&self, profile: &ViewerProfile) -> anyhow::Result<()> {
        if let Some(client) = &self.redis {
            let json = serde_json::to_string(profile)?;
            let mut conn = client.get_multiplexed_async_connection().await?;
            conn.set_ex::<_, _, ()>(Self::key(profile.viewer_id), &json, self.ttl_secs)
                .await?;
        }
        if !self.local.put(profile.clone()) {
            debug!(
                viewer_id = %profile.viewer_id,
                "Local viewer cache full, profile kept in L2 only"
            );
        }
        Ok(())
    }

    /// Run periodic maintenance (L1 eviction). Returns the number of
    /// profiles evicted.
    pub async fn maintenance(&self) -> usize {
        let evicted = self.local.sweep();
        if evicted > 0 {
            debug!(evicted, remaining = self.local.len(), "Local cache eviction complete");
        }
        evicted
    }

    fn key(viewer_id: Uuid) -> String {
        format!("viewer:{viewer_id}")
    }
}

#[async_trait]
impl ViewerContextProvider for ViewerContextCache {
    async fn viewer_context(&self, viewer_id: Option<Uuid>) -> TargetingContext {
        let Some(viewer_id) = viewer_id else {
            return TargetingContext::anonymous();
        };
        match self.get_profile(viewer_id).await {
            Ok(Some(profile)) => profile.to_context(),
            Ok(None) => TargetingContext::anonymous(),
            Err(e) => {
                warn!(
                    viewer_id = %viewer_id,
                    error = %e,
                    "Viewer context lookup failed, treating as anonymous"
                );
                TargetingContext::anonymous()
            }
        }
    }
}
