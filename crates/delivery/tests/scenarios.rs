//! End-to-end delivery scenarios over the in-memory catalog.

use adserve_analytics::AnalyticsAggregator;
use adserve_catalog::{InMemoryCatalog, InMemoryEventLog};
use adserve_core::config::{DeliveryConfig, SelectionConfig, TrackingConfig};
use adserve_core::context::TargetingContext;
use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::placement::Placement;
use adserve_core::store::{AnonymousViewer, CatalogStore, EventLog};
use adserve_core::types::{
    AdFilter, AdType, Advertisement, AdvertisementFormat, ClickEvent, Counter,
    CreateAdvertisementRequest, CreateFormatRequest, Creative, ImpressionEvent, IncrementOutcome,
    Schedule, Targeting, UpdateAdvertisementRequest,
};
use adserve_delivery::{
    DeliveryServices, DeliverySurface, RecordingNavigator, SurfaceProps, SurfaceState,
};
use adserve_targeting::{AdSelector, SelectionRequest};
use adserve_tracking::EngagementRecorder;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn ad_request(
    title: &str,
    format: &AdvertisementFormat,
    priority: u32,
) -> CreateAdvertisementRequest {
    CreateAdvertisementRequest {
        creative: Creative {
            title: title.to_string(),
            description: None,
            image_url: None,
            link_url: format!("https://example.com/{}", title.to_lowercase()),
            cta_text: Some("Learn more".to_string()),
        },
        ad_type: format.ad_type,
        format_id: format.id,
        targeting: Targeting::default(),
        schedule: Schedule::default(),
        is_active: true,
        priority,
        max_impressions: None,
        max_clicks: None,
        created_by: None,
    }
}

fn services(
    catalog: Arc<dyn CatalogStore>,
    log: Arc<dyn EventLog>,
    navigator: Arc<RecordingNavigator>,
) -> DeliveryServices {
    let selector = Arc::new(AdSelector::new(catalog.clone(), &SelectionConfig::default()));
    let recorder = Arc::new(EngagementRecorder::new(catalog, log, &TrackingConfig::default()));
    DeliveryServices::new(
        selector,
        recorder,
        Arc::new(AnonymousViewer),
        navigator,
        &DeliveryConfig::default(),
    )
}

#[tokio::test]
async fn capped_winner_yields_to_runner_up_once_exhausted() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let log = Arc::new(InMemoryEventLog::new());
    let sidebar = catalog
        .create_format(CreateFormatRequest::for_placement("Sidebar", Placement::Sidebar))
        .await
        .unwrap();

    let mut alpha_req = ad_request("Alpha", &sidebar, 5);
    alpha_req.max_impressions = Some(100);
    let alpha = catalog.create(alpha_req).await.unwrap();
    for _ in 0..99 {
        catalog.atomic_increment(alpha.id, Counter::Impressions).await.unwrap();
    }
    let beta = catalog.create(ad_request("Beta", &sidebar, 2)).await.unwrap();

    let services = services(catalog.clone(), log.clone(), Arc::new(RecordingNavigator::new()));

    let first = DeliverySurface::new(services.clone(), SurfaceProps::new(Placement::Sidebar));
    first.mount().await;
    assert_eq!(first.state().advertisement().map(|a| a.id), Some(alpha.id));
    assert!(first.on_visibility(0.75).is_some());
    first.settle().await;

    let alpha_now = catalog.get(alpha.id).await.unwrap().unwrap();
    assert_eq!(alpha_now.current_impressions, 100);
    assert!(alpha_now.is_exhausted());

    let second = DeliverySurface::new(services, SurfaceProps::new(Placement::Sidebar));
    second.mount().await;
    assert_eq!(second.state().advertisement().map(|a| a.id), Some(beta.id));

    let report = AnalyticsAggregator::new(catalog.clone())
        .performance(alpha.id)
        .await
        .unwrap();
    assert_eq!(report.impression_rate.as_deref(), Some("100.00"));
    assert_eq!(report.ctr, "0.00");
}

#[tokio::test]
async fn shared_creative_size_does_not_leak_across_ad_types() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let card = catalog
        .create_format(CreateFormatRequest::for_placement("Search card", Placement::SearchResults))
        .await
        .unwrap();
    assert_eq!((card.width, card.height), (384, 480));
    catalog.create(ad_request("Groomers", &card, 1)).await.unwrap();
    catalog.create(ad_request("Sitters", &card, 1)).await.unwrap();

    let selector = AdSelector::new(catalog.clone(), &SelectionConfig::default());
    let ctx = TargetingContext::anonymous();

    let filter_slot =
        SelectionRequest::new(AdType::SearchFilter, Placement::SearchFilter, ctx.clone());
    assert!(selector.select(&filter_slot, 10).await.unwrap().is_empty());

    let filter_type_in_results =
        SelectionRequest::new(AdType::SearchFilter, Placement::SearchResults, ctx.clone());
    assert!(selector.select(&filter_type_in_results, 10).await.unwrap().is_empty());

    let cards_in_filter_slot =
        SelectionRequest::new(AdType::SearchCard, Placement::SearchFilter, ctx.clone());
    assert!(selector.select(&cards_in_filter_slot, 10).await.unwrap().is_empty());

    let cards = SelectionRequest::new(AdType::SearchCard, Placement::SearchResults, ctx);
    assert_eq!(selector.select(&cards, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_viewer_only_sees_unconstrained_ads() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let sidebar = catalog
        .create_format(CreateFormatRequest::for_placement("Sidebar", Placement::Sidebar))
        .await
        .unwrap();

    let mut dogs_only = ad_request("Dogs", &sidebar, 9);
    dogs_only.targeting.target_pet_types = ["dog".to_string()].into_iter().collect();
    catalog.create(dogs_only).await.unwrap();
    let everyone = catalog.create(ad_request("Everyone", &sidebar, 1)).await.unwrap();

    let selector = AdSelector::new(catalog.clone(), &SelectionConfig::default());
    let request =
        SelectionRequest::for_placement(Placement::Sidebar, TargetingContext::anonymous());
    let candidates = selector.select(&request, 10).await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, everyone.id);
}

#[tokio::test]
async fn expired_ad_is_excluded_until_its_window_is_edited() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let banner = catalog
        .create_format(CreateFormatRequest::for_placement("Banner", Placement::HomepageBanner))
        .await
        .unwrap();
    let mut req = ad_request("Summer", &banner, 3);
    req.schedule = Schedule {
        start_date: Some(Utc::now() - Duration::days(30)),
        end_date: Some(Utc::now() - Duration::days(1)),
    };
    let ad = catalog.create(req).await.unwrap();

    let selector = AdSelector::new(catalog.clone(), &SelectionConfig::default());
    let request =
        SelectionRequest::for_placement(Placement::HomepageBanner, TargetingContext::anonymous());
    assert!(selector.select_winner(&request).await.unwrap().is_none());

    catalog
        .update(
            ad.id,
            UpdateAdvertisementRequest {
                end_date: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(selector.select_winner(&request).await.unwrap().map(|a| a.id), Some(ad.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_impressions_never_exceed_cap() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let log = Arc::new(InMemoryEventLog::new());
    let sidebar = catalog
        .create_format(CreateFormatRequest::for_placement("Sidebar", Placement::Sidebar))
        .await
        .unwrap();
    let mut req = ad_request("Popular", &sidebar, 1);
    req.max_impressions = Some(25);
    let ad = catalog.create(req).await.unwrap();

    let recorder = Arc::new(EngagementRecorder::new(
        catalog.clone(),
        log.clone(),
        &TrackingConfig::default(),
    ));
    let handles: Vec<_> = (0..120)
        .map(|_| {
            recorder
                .track_impression(
                    ad.id,
                    Some(Uuid::new_v4()),
                    Placement::Sidebar,
                    TargetingContext::anonymous(),
                )
                .handle
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = catalog.get(ad.id).await.unwrap().unwrap();
    assert_eq!(stored.current_impressions, 25);
    assert_eq!(log.impressions_for(ad.id).len(), 120);
}

#[tokio::test]
async fn deleting_an_ad_keeps_its_events() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let log = Arc::new(InMemoryEventLog::new());
    let profile = catalog
        .create_format(CreateFormatRequest::for_placement("Profile", Placement::ProfilePage))
        .await
        .unwrap();
    let ad = catalog.create(ad_request("Insurance", &profile, 1)).await.unwrap();

    let surface = DeliverySurface::new(
        services(catalog.clone(), log.clone(), Arc::new(RecordingNavigator::new())),
        SurfaceProps::new(Placement::ProfilePage),
    );
    surface.mount().await;
    surface.on_visibility(1.0);
    surface.activate();
    surface.settle().await;

    catalog.delete(ad.id).await.unwrap();
    assert_eq!(log.impressions_for(ad.id).len(), 1);
    assert_eq!(log.clicks_for(ad.id).len(), 1);
}

/// Catalog whose every call fails, standing in for an unreachable backend.
struct UnreachableCatalog;

fn unreachable<T>() -> AdServeResult<T> {
    Err(AdServeError::store("connection refused"))
}

#[async_trait]
impl CatalogStore for UnreachableCatalog {
    async fn create(&self, _req: CreateAdvertisementRequest) -> AdServeResult<Advertisement> {
        unreachable()
    }
    async fn update(
        &self,
        _id: Uuid,
        _patch: UpdateAdvertisementRequest,
    ) -> AdServeResult<Advertisement> {
        unreachable()
    }
    async fn delete(&self, _id: Uuid) -> AdServeResult<()> {
        unreachable()
    }
    async fn get(&self, _id: Uuid) -> AdServeResult<Option<Advertisement>> {
        unreachable()
    }
    async fn list(&self, _filter: &AdFilter) -> AdServeResult<Vec<Advertisement>> {
        unreachable()
    }
    async fn atomic_increment(
        &self,
        _id: Uuid,
        _counter: Counter,
    ) -> AdServeResult<IncrementOutcome> {
        unreachable()
    }
    async fn create_format(&self, _req: CreateFormatRequest) -> AdServeResult<AdvertisementFormat> {
        unreachable()
    }
    async fn get_format(&self, _id: Uuid) -> AdServeResult<Option<AdvertisementFormat>> {
        unreachable()
    }
    async fn list_formats(&self) -> AdServeResult<Vec<AdvertisementFormat>> {
        unreachable()
    }
    async fn delete_format(&self, _id: Uuid) -> AdServeResult<()> {
        unreachable()
    }
}

#[tokio::test]
async fn store_failure_during_selection_renders_nothing() {
    let surface = DeliverySurface::new(
        services(
            Arc::new(UnreachableCatalog),
            Arc::new(InMemoryEventLog::new()),
            Arc::new(RecordingNavigator::new()),
        ),
        SurfaceProps::new(Placement::Sidebar),
    );
    surface.mount().await;
    assert_eq!(surface.state(), SurfaceState::Empty);
}

struct BrokenEventLog;

#[async_trait]
impl EventLog for BrokenEventLog {
    async fn append_impression(&self, _event: &ImpressionEvent) -> AdServeResult<Uuid> {
        Err(AdServeError::store("disk full"))
    }
    async fn append_click(&self, _event: &ClickEvent) -> AdServeResult<Uuid> {
        Err(AdServeError::store("disk full"))
    }
}

#[tokio::test]
async fn tracking_failure_never_blocks_navigation() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let inline = catalog
        .create_format(CreateFormatRequest::for_placement("Inline", Placement::MessageInline))
        .await
        .unwrap();
    let ad = catalog.create(ad_request("Treats", &inline, 1)).await.unwrap();
    let navigator = Arc::new(RecordingNavigator::new());

    let surface = DeliverySurface::new(
        services(catalog.clone(), Arc::new(BrokenEventLog), navigator.clone()),
        SurfaceProps::new(Placement::MessageInline),
    );
    surface.mount().await;
    assert!(surface.on_visibility(0.5).is_some());
    assert_eq!(surface.activate().as_deref(), Some("https://example.com/treats"));
    surface.settle().await;

    assert_eq!(navigator.opened(), ["https://example.com/treats"]);
    let stored = catalog.get(ad.id).await.unwrap().unwrap();
    assert_eq!((stored.current_impressions, stored.current_clicks), (0, 0));
}
