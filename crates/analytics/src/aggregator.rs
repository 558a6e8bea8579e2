//! Analytics aggregator: click-through and budget consumption derived from
//! the catalog's running counters. Runs off the serving path.

use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::store::CatalogStore;
use adserve_core::types::{AdFilter, AdStatus, AdType, Advertisement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Per-advertisement performance row. Rates are percentages rendered to two
/// decimal places; consumption rates are `None` when no cap is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdPerformance {
    pub ad_id: Uuid,
    pub title: String,
    pub ad_type: AdType,
    pub status: AdStatus,
    pub impressions: u64,
    pub clicks: u64,
    pub max_impressions: Option<u64>,
    pub max_clicks: Option<u64>,
    pub ctr: String,
    pub impression_rate: Option<String>,
    pub click_rate: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AdPerformance {
    pub fn from_ad(ad: &Advertisement, now: DateTime<Utc>) -> Self {
        Self {
            ad_id: ad.id,
            title: ad.creative.title.clone(),
            ad_type: ad.ad_type,
            status: ad.status(now),
            impressions: ad.current_impressions,
            clicks: ad.current_clicks,
            max_impressions: ad.max_impressions,
            max_clicks: ad.max_clicks,
            ctr: ctr(ad.current_clicks, ad.current_impressions),
            impression_rate: consumption_rate(ad.current_impressions, ad.max_impressions),
            click_rate: consumption_rate(ad.current_clicks, ad.max_clicks),
            created_at: ad.created_at,
        }
    }
}

/// Totals across the whole catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    pub advertisements: usize,
    pub running: usize,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub overall_ctr: String,
    pub computed_at: DateTime<Utc>,
}

/// `clicks / impressions * 100`, `"0.00"` when nothing has been shown.
pub fn ctr(clicks: u64, impressions: u64) -> String {
    if impressions == 0 {
        return percent(0.0);
    }
    percent(clicks as f64 / impressions as f64 * 100.0)
}

/// Share of a cap already consumed. A zero cap counts as fully consumed.
pub fn consumption_rate(current: u64, cap: Option<u64>) -> Option<String> {
    cap.map(|cap| {
        if cap == 0 {
            percent(100.0)
        } else {
            percent(current as f64 / cap as f64 * 100.0)
        }
    })
}

fn percent(value: f64) -> String {
    format!("{value:.2}")
}

pub struct AnalyticsAggregator {
    catalog: Arc<dyn CatalogStore>,
}

impl AnalyticsAggregator {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Performance of every advertisement, newest first.
    pub async fn report(&self) -> AdServeResult<Vec<AdPerformance>> {
        let now = Utc::now();
        let mut ads = self.catalog.list(&AdFilter::default()).await?;
        ads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(ads.iter().map(|ad| AdPerformance::from_ad(ad, now)).collect())
    }

    pub async fn performance(&self, id: Uuid) -> AdServeResult<AdPerformance> {
        let ad = self
            .catalog
            .get(id)
            .await?
            .ok_or_else(|| AdServeError::advertisement_not_found(id))?;
        Ok(AdPerformance::from_ad(&ad, Utc::now()))
    }

    pub async fn summary(&self) -> AdServeResult<PerformanceSummary> {
        let now = Utc::now();
        let ads = self.catalog.list(&AdFilter::default()).await?;
        let total_impressions: u64 = ads.iter().map(|a| a.current_impressions).sum();
        let total_clicks: u64 = ads.iter().map(|a| a.current_clicks).sum();
        Ok(PerformanceSummary {
            advertisements: ads.len(),
            running: ads
                .iter()
                .filter(|a| a.status(now) == AdStatus::Running)
                .count(),
            total_impressions,
            total_clicks,
            overall_ctr: ctr(total_clicks, total_impressions),
            computed_at: now,
        })
    }
}
