//! Delivery surface lifecycle:
//! `Idle -> Requesting -> {Empty | Showing} -> [Seen] -> Unmounted`.
//!
//! A request is issued on mount and again only when the placement, ad type,
//! viewer or the *meaning* of the targeting context changes; re-supplying
//! equal props is a no-op. Responses that arrive after unmount, or after a
//! newer request superseded them, are discarded. Engagement is recorded on
//! detached tasks so neither rendering nor navigation ever waits on it.
//!
//! An instance records at most one impression over its whole lifetime, even
//! if later props bring a different creative. `Unmounted` is terminal.

use crate::navigator::Navigator;
use crate::visibility::VisibilityTracker;
use adserve_core::config::DeliveryConfig;
use adserve_core::context::TargetingContext;
use adserve_core::placement::Placement;
use adserve_core::store::ViewerContextProvider;
use adserve_core::types::{AdType, Advertisement};
use adserve_targeting::{AdSelector, SelectionRequest};
use adserve_tracking::EngagementRecorder;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceState {
    Idle,
    Requesting,
    /// Nothing eligible, or the request failed. Renders nothing.
    Empty,
    Showing(Advertisement),
    Seen {
        ad: Advertisement,
        impression_id: Uuid,
    },
    Unmounted,
}

impl SurfaceState {
    /// The creative currently rendered, if any.
    pub fn advertisement(&self) -> Option<&Advertisement> {
        match self {
            SurfaceState::Showing(ad) | SurfaceState::Seen { ad, .. } => Some(ad),
            _ => None,
        }
    }
}

/// Inputs a page passes when it renders a placement.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceProps {
    pub placement: Placement,
    /// Defaults to the placement's own ad type.
    pub ad_type: Option<AdType>,
    pub viewer_id: Option<Uuid>,
    /// Page-supplied targeting. Empty fields are filled from the viewer's profile.
    pub context: TargetingContext,
}

impl SurfaceProps {
    pub fn new(placement: Placement) -> Self {
        Self {
            placement,
            ad_type: None,
            viewer_id: None,
            context: TargetingContext::anonymous(),
        }
    }

    pub fn with_viewer(mut self, viewer_id: Uuid) -> Self {
        self.viewer_id = Some(viewer_id);
        self
    }

    pub fn with_context(mut self, context: TargetingContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_ad_type(mut self, ad_type: AdType) -> Self {
        self.ad_type = Some(ad_type);
        self
    }

    pub fn ad_type(&self) -> AdType {
        self.ad_type.unwrap_or_else(|| self.placement.default_ad_type())
    }

    /// Identity of the request these props would issue.
    fn request_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.placement,
            self.ad_type(),
            self.viewer_id.map(|v| v.to_string()).unwrap_or_default(),
            self.context.fingerprint()
        )
    }
}

/// Collaborators shared by every surface on a page.
#[derive(Clone)]
pub struct DeliveryServices {
    pub selector: Arc<AdSelector>,
    pub recorder: Arc<EngagementRecorder>,
    pub viewers: Arc<dyn ViewerContextProvider>,
    pub navigator: Arc<dyn Navigator>,
    pub visibility_threshold: f64,
}

impl DeliveryServices {
    pub fn new(
        selector: Arc<AdSelector>,
        recorder: Arc<EngagementRecorder>,
        viewers: Arc<dyn ViewerContextProvider>,
        navigator: Arc<dyn Navigator>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            selector,
            recorder,
            viewers,
            navigator,
            visibility_threshold: config.visibility_threshold,
        }
    }
}

struct SurfaceInner {
    props: SurfaceProps,
    requested_key: Option<String>,
    generation: u64,
    state: SurfaceState,
    /// Resolved context of the current request, snapshotted into events.
    context: TargetingContext,
    visibility: VisibilityTracker,
    /// The one impression this instance recorded, if any.
    impression: Option<Uuid>,
    pending: Vec<JoinHandle<()>>,
}

/// Handle to one mounted placement instance. Clones share the instance.
#[derive(Clone)]
pub struct DeliverySurface {
    services: DeliveryServices,
    inner: Arc<Mutex<SurfaceInner>>,
    mounted: Arc<AtomicBool>,
}

impl DeliverySurface {
    pub fn new(services: DeliveryServices, props: SurfaceProps) -> Self {
        let visibility = VisibilityTracker::new(services.visibility_threshold);
        Self {
            services,
            inner: Arc::new(Mutex::new(SurfaceInner {
                props,
                requested_key: None,
                generation: 0,
                state: SurfaceState::Idle,
                context: TargetingContext::anonymous(),
                visibility,
                impression: None,
                pending: Vec::new(),
            })),
            mounted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.inner.lock().state.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// The impression this instance recorded, kept across later requests.
    pub fn impression_id(&self) -> Option<Uuid> {
        self.inner.lock().impression
    }

    /// Mount and issue the first request. Ignored once unmounted.
    pub async fn mount(&self) {
        let first_mount = {
            let inner = self.inner.lock();
            if inner.state == SurfaceState::Unmounted {
                debug!(placement = %inner.props.placement, "Mount after unmount ignored");
                return;
            }
            !self.mounted.swap(true, Ordering::AcqRel)
        };
        if first_mount {
            self.request().await;
        }
    }

    /// Re-render with new props. Returns whether a new request was issued.
    pub async fn set_props(&self, props: SurfaceProps) -> bool {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.requested_key.as_deref() != Some(props.request_key().as_str());
            inner.props = props;
            changed
        };
        if changed && self.is_mounted() {
            self.request().await;
            return true;
        }
        false
    }

    async fn request(&self) {
        let (generation, props) = {
            let mut inner = self.inner.lock();
            if !self.is_mounted() {
                return;
            }
            inner.generation += 1;
            inner.requested_key = Some(inner.props.request_key());
            inner.state = SurfaceState::Requesting;
            // A spent tracker stays spent: one impression per instance.
            if inner.impression.is_none() {
                inner.visibility = VisibilityTracker::new(self.services.visibility_threshold);
            }
            (inner.generation, inner.props.clone())
        };

        let context = self.resolve_context(&props).await;
        let request = SelectionRequest::new(props.ad_type(), props.placement, context.clone());
        let outcome = self.services.selector.select_winner(&request).await;

        let mut inner = self.inner.lock();
        if !self.is_mounted() || inner.generation != generation {
            debug!(placement = %props.placement, "Discarding stale selection response");
            return;
        }
        inner.context = context;
        inner.state = match outcome {
            Ok(Some(ad)) => {
                debug!(placement = %props.placement, ad_id = %ad.id, "Showing advertisement");
                inner.visibility.observe();
                SurfaceState::Showing(ad)
            }
            Ok(None) => {
                debug!(placement = %props.placement, "No eligible advertisement");
                SurfaceState::Empty
            }
            Err(e) => {
                metrics::counter!("delivery.selection_failures").increment(1);
                warn!(
                    placement = %props.placement,
                    error = %e,
                    "Selection failed, rendering nothing"
                );
                SurfaceState::Empty
            }
        };
    }

    /// Page-supplied targeting, with empty fields filled from the viewer.
    async fn resolve_context(&self, props: &SurfaceProps) -> TargetingContext {
        let mut context = props.context.clone();
        if props.viewer_id.is_none() {
            return context;
        }
        let viewer = self.services.viewers.viewer_context(props.viewer_id).await;
        if context.pet_types.is_empty() {
            context.pet_types = viewer.pet_types;
        }
        if context.location.is_none() {
            context.location = viewer.location;
        }
        if context.subscription_type.is_none() {
            context.subscription_type = viewer.subscription_type;
        }
        context
    }

    /// Feed a visible-area ratio sample. Records the impression on the
    /// first crossing and returns its id; every later call is a no-op.
    pub fn on_visibility(&self, ratio: f64) -> Option<Uuid> {
        let mut inner = self.inner.lock();
        let ad = match &inner.state {
            SurfaceState::Showing(ad) => ad.clone(),
            _ => return None,
        };
        if !inner.visibility.report(ratio) {
            return None;
        }

        let tracked = self.services.recorder.track_impression(
            ad.id,
            inner.props.viewer_id,
            inner.props.placement,
            inner.context.clone(),
        );
        let impression_id = tracked.event.id;
        inner.impression = Some(impression_id);
        inner.pending.push(tracked.handle);
        debug!(ad_id = %ad.id, impression_id = %impression_id, "Advertisement seen");
        inner.state = SurfaceState::Seen { ad, impression_id };
        Some(impression_id)
    }

    /// Activate the creative: record a click, then open its destination.
    /// Returns the destination, or `None` when nothing is showing.
    pub fn activate(&self) -> Option<String> {
        let destination = {
            let mut inner = self.inner.lock();
            let (ad_id, link, impression_id) = match &inner.state {
                SurfaceState::Showing(ad) => (ad.id, ad.creative.link_url.clone(), None),
                SurfaceState::Seen { ad, impression_id } => {
                    (ad.id, ad.creative.link_url.clone(), Some(*impression_id))
                }
                _ => return None,
            };
            let tracked = self.services.recorder.track_click(
                ad_id,
                impression_id,
                inner.props.viewer_id,
                inner.props.placement,
                inner.context.clone(),
            );
            inner.pending.push(tracked.handle);
            link
        };

        self.services.navigator.open(&destination);
        Some(destination)
    }

    /// Tear down. Observation stops; in-flight recordings still complete.
    pub fn unmount(&self) {
        let mut inner = self.inner.lock();
        self.mounted.store(false, Ordering::Release);
        inner.visibility.release();
        inner.state = SurfaceState::Unmounted;
    }

    /// Await every detached recording this surface started. For shutdown
    /// paths only; serving code never waits on these.
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = std::mem::take(&mut self.inner.lock().pending);
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Engagement recording task aborted");
            }
        }
    }
}
