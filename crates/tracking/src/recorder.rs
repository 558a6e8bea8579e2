//! Engagement recorder: appends impression and click events and advances
//! the advertisement's counters through the store's atomic add.
//!
//! `record_*` are awaited and report failures. `track_*` are the
//! fire-and-forget variants used on the viewer's critical path: they spawn
//! the write and hand back the event immediately, logging any failure.

use adserve_core::config::TrackingConfig;
use adserve_core::context::TargetingContext;
use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::placement::Placement;
use adserve_core::store::{CatalogStore, EventLog};
use adserve_core::types::{ClickEvent, Counter, ImpressionEvent, IncrementOutcome};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// An event whose write was handed to a detached task.
#[derive(Debug)]
pub struct Tracked<E> {
    pub event: E,
    pub handle: JoinHandle<()>,
}

pub struct EngagementRecorder {
    catalog: Arc<dyn CatalogStore>,
    events: Arc<dyn EventLog>,
    enabled: bool,
}

impl EngagementRecorder {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        events: Arc<dyn EventLog>,
        config: &TrackingConfig,
    ) -> Self {
        Self {
            catalog,
            events,
            enabled: config.enabled,
        }
    }

    /// Append the impression, then advance `current_impressions`.
    /// An event that could not be appended never moves the counter.
    pub async fn record_impression(
        &self,
        event: ImpressionEvent,
    ) -> AdServeResult<ImpressionEvent> {
        self.events
            .append_impression(&event)
            .await
            .map_err(|e| AdServeError::tracking(format!("append impression {}: {e}", event.id)))?;
        self.advance(event.advertisement_id, Counter::Impressions).await?;
        metrics::counter!("tracking.impressions").increment(1);
        Ok(event)
    }

    /// Append the click, then advance `current_clicks`. Whether the paired
    /// impression was ever written does not matter here.
    pub async fn record_click(&self, event: ClickEvent) -> AdServeResult<ClickEvent> {
        self.events
            .append_click(&event)
            .await
            .map_err(|e| AdServeError::tracking(format!("append click {}: {e}", event.id)))?;
        self.advance(event.advertisement_id, Counter::Clicks).await?;
        metrics::counter!("tracking.clicks").increment(1);
        Ok(event)
    }

    pub fn track_impression(
        self: &Arc<Self>,
        advertisement_id: Uuid,
        viewer_id: Option<Uuid>,
        placement: Placement,
        context: TargetingContext,
    ) -> Tracked<ImpressionEvent> {
        let event = ImpressionEvent::new(advertisement_id, viewer_id, placement, context);
        let recorder = Arc::clone(self);
        let pending = event.clone();
        let handle = tokio::spawn(async move {
            if !recorder.enabled {
                debug!(
                    ad_id = %pending.advertisement_id,
                    "Tracking disabled, impression not recorded"
                );
                return;
            }
            if let Err(e) = recorder.record_impression(pending).await {
                metrics::counter!("tracking.failures", "kind" => "impression").increment(1);
                warn!(ad_id = %advertisement_id, error = %e, "Impression tracking failed");
            }
        });
        Tracked { event, handle }
    }

    pub fn track_click(
        self: &Arc<Self>,
        advertisement_id: Uuid,
        impression_id: Option<Uuid>,
        viewer_id: Option<Uuid>,
        placement: Placement,
        context: TargetingContext,
    ) -> Tracked<ClickEvent> {
        let event = ClickEvent::new(advertisement_id, impression_id, viewer_id, placement, context);
        let recorder = Arc::clone(self);
        let pending = event.clone();
        let handle = tokio::spawn(async move {
            if !recorder.enabled {
                debug!(ad_id = %pending.advertisement_id, "Tracking disabled, click not recorded");
                return;
            }
            if let Err(e) = recorder.record_click(pending).await {
                metrics::counter!("tracking.failures", "kind" => "click").increment(1);
                warn!(ad_id = %advertisement_id, error = %e, "Click tracking failed");
            }
        });
        Tracked { event, handle }
    }

    async fn advance(&self, advertisement_id: Uuid, counter: Counter) -> AdServeResult<()> {
        match self.catalog.atomic_increment(advertisement_id, counter).await {
            Ok(IncrementOutcome::Applied(value)) => {
                debug!(ad_id = %advertisement_id, %counter, value, "Counter advanced");
                Ok(())
            }
            Ok(IncrementOutcome::CapReached) => {
                debug!(ad_id = %advertisement_id, %counter, "Counter already at cap");
                Ok(())
            }
            Err(e) => Err(AdServeError::tracking(format!(
                "increment {counter} for {advertisement_id}: {e}"
            ))),
        }
    }
}
