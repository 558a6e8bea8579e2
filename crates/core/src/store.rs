//! Collaborator contracts the engine components are handed at construction.
//! Nothing in the engine reaches for a global catalog.

use crate::context::TargetingContext;
use crate::error::{AdServeError, AdServeResult};
use crate::types::{
    AdFilter, Advertisement, AdvertisementFormat, ClickEvent, Counter, CreateAdvertisementRequest,
    CreateFormatRequest, ImpressionEvent, IncrementOutcome, UpdateAdvertisementRequest,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Persisted collection of advertisements and their display formats.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Validate and insert. Validation failures are returned before any write.
    async fn create(&self, req: CreateAdvertisementRequest) -> AdServeResult<Advertisement>;

    async fn update(
        &self,
        id: Uuid,
        patch: UpdateAdvertisementRequest,
    ) -> AdServeResult<Advertisement>;

    /// Remove the advertisement. Recorded events are left in place.
    async fn delete(&self, id: Uuid) -> AdServeResult<()>;

    async fn get(&self, id: Uuid) -> AdServeResult<Option<Advertisement>>;

    async fn list(&self, filter: &AdFilter) -> AdServeResult<Vec<Advertisement>>;

    /// Store-side add of one to `counter`, refused once the matching cap is reached.
    /// Callers must never read-modify-write counters themselves.
    async fn atomic_increment(&self, id: Uuid, counter: Counter) -> AdServeResult<IncrementOutcome>;

    async fn create_format(&self, req: CreateFormatRequest) -> AdServeResult<AdvertisementFormat>;

    async fn get_format(&self, id: Uuid) -> AdServeResult<Option<AdvertisementFormat>>;

    async fn list_formats(&self) -> AdServeResult<Vec<AdvertisementFormat>>;

    async fn delete_format(&self, id: Uuid) -> AdServeResult<()>;

    /// Clone an advertisement. The copy starts inactive with zeroed counters.
    async fn duplicate(&self, id: Uuid) -> AdServeResult<Advertisement> {
        let source = self
            .get(id)
            .await?
            .ok_or_else(|| AdServeError::advertisement_not_found(id))?;
        self.create(CreateAdvertisementRequest::duplicate_of(&source)).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AdServeResult<Advertisement> {
        self.update(
            id,
            UpdateAdvertisementRequest {
                is_active: Some(active),
                ..Default::default()
            },
        )
        .await
    }
}

/// Append-only engagement log.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append_impression(&self, event: &ImpressionEvent) -> AdServeResult<Uuid>;

    async fn append_click(&self, event: &ClickEvent) -> AdServeResult<Uuid>;
}

/// Supplies what is known about the current viewer. Never fails: anything
/// that cannot be looked up is simply left empty.
#[async_trait]
pub trait ViewerContextProvider: Send + Sync {
    async fn viewer_context(&self, viewer_id: Option<Uuid>) -> TargetingContext;
}

/// Provider for pages with no signed-in viewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousViewer;

#[async_trait]
impl ViewerContextProvider for AnonymousViewer {
    async fn viewer_context(&self, _viewer_id: Option<Uuid>) -> TargetingContext {
        TargetingContext::anonymous()
    }
}
