//! Selection request entry point: eligibility filter followed by the
//! selection policy, against whatever catalog the caller hands in.

use crate::eligibility::{filter_eligible, SelectionRequest};
use crate::selection::rank;
use adserve_core::config::SelectionConfig;
use adserve_core::error::AdServeResult;
use adserve_core::store::CatalogStore;
use adserve_core::types::{AdFilter, Advertisement, AdvertisementFormat};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct AdSelector {
    catalog: Arc<dyn CatalogStore>,
    default_limit: usize,
}

impl AdSelector {
    pub fn new(catalog: Arc<dyn CatalogStore>, config: &SelectionConfig) -> Self {
        Self {
            catalog,
            default_limit: config.candidate_limit.max(1),
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Ordered eligible candidates, best first, at most `limit` of them.
    pub async fn select(
        &self,
        request: &SelectionRequest,
        limit: usize,
    ) -> AdServeResult<Vec<Advertisement>> {
        self.select_at(request, limit, Utc::now()).await
    }

    pub async fn select_at(
        &self,
        request: &SelectionRequest,
        limit: usize,
        now: DateTime<Utc>,
    ) -> AdServeResult<Vec<Advertisement>> {
        let ads = self
            .catalog
            .list(&AdFilter::active_of_type(request.ad_type))
            .await?;
        let formats: HashMap<Uuid, AdvertisementFormat> = self
            .catalog
            .list_formats()
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let considered = ads.len();
        let mut candidates = filter_eligible(ads, &formats, request, now);
        rank(&mut candidates);
        candidates.truncate(limit);

        debug!(
            placement = %request.placement,
            ad_type = %request.ad_type,
            considered,
            eligible = candidates.len(),
            "Selection evaluated"
        );
        if candidates.is_empty() {
            metrics::counter!("selection.empty").increment(1);
        } else {
            metrics::counter!("selection.served").increment(1);
        }
        Ok(candidates)
    }

    /// The one advertisement to show, or `None` when nothing qualifies.
    pub async fn select_winner(
        &self,
        request: &SelectionRequest,
    ) -> AdServeResult<Option<Advertisement>> {
        Ok(self.select(request, 1).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_catalog::InMemoryCatalog;
    use adserve_core::context::TargetingContext;
    use adserve_core::placement::Placement;
    use adserve_core::types::{
        AdType, CreateAdvertisementRequest, CreateFormatRequest, Creative, Schedule, Targeting,
    };

    async fn catalog_with_sidebar_ads(priorities: &[u32]) -> Arc<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::new());
        let format = catalog
            .create_format(CreateFormatRequest::for_placement("Sidebar", Placement::Sidebar))
            .await
            .unwrap();
        for (i, priority) in priorities.iter().enumerate() {
            catalog
                .create(CreateAdvertisementRequest {
                    creative: Creative {
                        title: format!("ad-{i}"),
                        description: None,
                        image_url: None,
                        link_url: "https://example.com".to_string(),
                        cta_text: None,
                    },
                    ad_type: AdType::Sidebar,
                    format_id: format.id,
                    targeting: Targeting::default(),
                    schedule: Schedule::default(),
                    is_active: true,
                    priority: *priority,
                    max_impressions: None,
                    max_clicks: None,
                    created_by: None,
                })
                .await
                .unwrap();
        }
        catalog
    }

    #[tokio::test]
    async fn test_select_orders_and_limits() {
        let catalog = catalog_with_sidebar_ads(&[1, 9, 4]).await;
        let selector = AdSelector::new(catalog, &SelectionConfig::default());
        let request =
            SelectionRequest::for_placement(Placement::Sidebar, TargetingContext::anonymous());

        let candidates = selector.select(&request, 2).await.unwrap();
        let priorities: Vec<u32> = candidates.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, [9, 4]);

        let winner = selector.select_winner(&request).await.unwrap().unwrap();
        assert_eq!(winner.priority, 9);
    }

    #[tokio::test]
    async fn test_repeated_selection_is_stable() {
        let catalog = catalog_with_sidebar_ads(&[3, 3, 3, 3]).await;
        let selector = AdSelector::new(catalog, &SelectionConfig::default());
        let request =
            SelectionRequest::for_placement(Placement::Sidebar, TargetingContext::anonymous());

        let first = selector.select_winner(&request).await.unwrap().unwrap().id;
        for _ in 0..10 {
            assert_eq!(selector.select_winner(&request).await.unwrap().unwrap().id, first);
        }
    }

    #[tokio::test]
    async fn test_other_placement_gets_nothing() {
        let catalog = catalog_with_sidebar_ads(&[1]).await;
        let selector = AdSelector::new(catalog, &SelectionConfig::default());
        let request = SelectionRequest::for_placement(
            Placement::HomepageBanner,
            TargetingContext::anonymous(),
        );
        assert!(selector.select(&request, 10).await.unwrap().is_empty());
    }
}
