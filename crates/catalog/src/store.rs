//! In-memory catalog backed by DashMap.
//!
//! Counter increments run under the entry's shard lock, so concurrent
//! viewers never lose an update and a cap is never overshot.
//!
//! Writes that attach an advertisement to a format hold `format_refs` for
//! reading; `delete_format` holds it for writing, so a format is never
//! removed while an advertisement that references it is being stored.
//! The guard is always taken before any map shard lock.

use crate::seed::CatalogSeed;
use crate::validate::{validate_advertisement, validate_format};
use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::store::CatalogStore;
use adserve_core::types::{
    AdFilter, Advertisement, AdvertisementFormat, Counter, CreateAdvertisementRequest,
    CreateFormatRequest, IncrementOutcome, UpdateAdvertisementRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Thread-safe in-memory store for advertisements and formats.
pub struct InMemoryCatalog {
    advertisements: DashMap<Uuid, Advertisement>,
    formats: DashMap<Uuid, AdvertisementFormat>,
    format_refs: RwLock<()>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            advertisements: DashMap::new(),
            formats: DashMap::new(),
            format_refs: RwLock::new(()),
        }
    }

    /// Build a catalog from seed data, validating every advertisement
    /// against the seeded formats.
    pub fn from_seed(seed: CatalogSeed) -> AdServeResult<Self> {
        let catalog = Self::new();
        for format in seed.formats {
            catalog.formats.insert(format.id, format);
        }
        for ad in seed.advertisements {
            let format = catalog.formats.get(&ad.format_id).map(|f| f.value().clone());
            validate_advertisement(&ad, format.as_ref())?;
            catalog.advertisements.insert(ad.id, ad);
        }
        info!(
            advertisements = catalog.advertisements.len(),
            formats = catalog.formats.len(),
            "Catalog loaded from seed"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.advertisements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advertisements.is_empty()
    }

    fn format_of(&self, ad: &Advertisement) -> Option<AdvertisementFormat> {
        self.formats.get(&ad.format_id).map(|f| f.value().clone())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn create(&self, req: CreateAdvertisementRequest) -> AdServeResult<Advertisement> {
        let now = Utc::now();
        let ad = Advertisement {
            id: Uuid::new_v4(),
            creative: req.creative,
            ad_type: req.ad_type,
            format_id: req.format_id,
            targeting: req.targeting,
            schedule: req.schedule,
            is_active: req.is_active,
            priority: req.priority,
            max_impressions: req.max_impressions,
            max_clicks: req.max_clicks,
            current_impressions: 0,
            current_clicks: 0,
            created_by: req.created_by,
            created_at: now,
            updated_at: now,
        };
        let _refs = self.format_refs.read();
        validate_advertisement(&ad, self.format_of(&ad).as_ref())?;

        self.advertisements.insert(ad.id, ad.clone());
        info!(
            ad_id = %ad.id,
            title = %ad.creative.title,
            ad_type = %ad.ad_type,
            "Advertisement created"
        );
        Ok(ad)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: UpdateAdvertisementRequest,
    ) -> AdServeResult<Advertisement> {
        let _refs = self.format_refs.read();
        let mut entry = self
            .advertisements
            .get_mut(&id)
            .ok_or_else(|| AdServeError::advertisement_not_found(id))?;

        let mut next = patch.apply_to(entry.value());
        validate_advertisement(&next, self.format_of(&next).as_ref())?;
        next.updated_at = Utc::now();

        *entry.value_mut() = next.clone();
        info!(ad_id = %id, is_active = next.is_active, "Advertisement updated");
        Ok(next)
    }

    async fn delete(&self, id: Uuid) -> AdServeResult<()> {
        self.advertisements
            .remove(&id)
            .ok_or_else(|| AdServeError::advertisement_not_found(id))?;
        info!(ad_id = %id, "Advertisement deleted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AdServeResult<Option<Advertisement>> {
        Ok(self.advertisements.get(&id).map(|r| r.value().clone()))
    }

    async fn list(&self, filter: &AdFilter) -> AdServeResult<Vec<Advertisement>> {
        let mut ads: Vec<Advertisement> = self
            .advertisements
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        ads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(ads)
    }

    async fn atomic_increment(
        &self,
        id: Uuid,
        counter: Counter,
    ) -> AdServeResult<IncrementOutcome> {
        let mut entry = self
            .advertisements
            .get_mut(&id)
            .ok_or_else(|| AdServeError::advertisement_not_found(id))?;
        let ad = entry.value_mut();

        let (current, cap) = ad.counter(counter);
        if cap.is_some_and(|cap| current >= cap) {
            metrics::counter!("catalog.increment.cap_reached").increment(1);
            debug!(ad_id = %id, %counter, "Counter at cap, increment refused");
            return Ok(IncrementOutcome::CapReached);
        }

        let slot = match counter {
            Counter::Impressions => &mut ad.current_impressions,
            Counter::Clicks => &mut ad.current_clicks,
        };
        *slot += 1;
        Ok(IncrementOutcome::Applied(*slot))
    }

    async fn create_format(&self, req: CreateFormatRequest) -> AdServeResult<AdvertisementFormat> {
        validate_format(&req)?;
        let format = AdvertisementFormat {
            id: Uuid::new_v4(),
            name: req.name,
            width: req.width,
            height: req.height,
            ad_type: req.ad_type,
            placement: req.placement,
            description: req.description,
        };
        self.formats.insert(format.id, format.clone());
        info!(
            format_id = %format.id,
            placement = %format.placement,
            dims = %format.dimensions(),
            "Format created"
        );
        Ok(format)
    }

    async fn get_format(&self, id: Uuid) -> AdServeResult<Option<AdvertisementFormat>> {
        Ok(self.formats.get(&id).map(|r| r.value().clone()))
    }

    async fn list_formats(&self) -> AdServeResult<Vec<AdvertisementFormat>> {
        let mut formats: Vec<AdvertisementFormat> =
            self.formats.iter().map(|r| r.value().clone()).collect();
        formats.sort_by(|a, b| a.placement.cmp(&b.placement).then(a.name.cmp(&b.name)));
        Ok(formats)
    }

    async fn delete_format(&self, id: Uuid) -> AdServeResult<()> {
        let _refs = self.format_refs.write();
        let in_use = self
            .advertisements
            .iter()
            .any(|r| r.value().format_id == id);
        if in_use {
            return Err(AdServeError::validation(format!(
                "format {id} is still referenced by advertisements"
            )));
        }
        self.formats
            .remove(&id)
            .ok_or_else(|| AdServeError::format_not_found(id))?;
        info!(format_id = %id, "Format deleted");
        Ok(())
    }
}
