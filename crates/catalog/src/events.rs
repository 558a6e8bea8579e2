//! In-memory append-only engagement log.

use adserve_core::error::AdServeResult;
use adserve_core::store::EventLog;
use adserve_core::types::{ClickEvent, ImpressionEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Events are keyed by their own id and never removed, so they outlive the
/// advertisements they reference.
#[derive(Default)]
pub struct InMemoryEventLog {
    impressions: DashMap<Uuid, ImpressionEvent>,
    clicks: DashMap<Uuid, ClickEvent>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn impressions_for(&self, advertisement_id: Uuid) -> Vec<ImpressionEvent> {
        let mut events: Vec<ImpressionEvent> = self
            .impressions
            .iter()
            .filter(|r| r.value().advertisement_id == advertisement_id)
            .map(|r| r.value().clone())
            .collect();
        events.sort_by_key(|e| e.created_at);
        events
    }

    pub fn clicks_for(&self, advertisement_id: Uuid) -> Vec<ClickEvent> {
        let mut events: Vec<ClickEvent> = self
            .clicks
            .iter()
            .filter(|r| r.value().advertisement_id == advertisement_id)
            .map(|r| r.value().clone())
            .collect();
        events.sort_by_key(|e| e.created_at);
        events
    }

    pub fn impression_count(&self) -> usize {
        self.impressions.len()
    }

    pub fn click_count(&self) -> usize {
        self.clicks.len()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append_impression(&self, event: &ImpressionEvent) -> AdServeResult<Uuid> {
        self.impressions
            .entry(event.id)
            .or_insert_with(|| event.clone());
        Ok(event.id)
    }

    async fn append_click(&self, event: &ClickEvent) -> AdServeResult<Uuid> {
        self.clicks.entry(event.id).or_insert_with(|| event.clone());
        Ok(event.id)
    }
}
