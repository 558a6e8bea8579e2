use crate::context::TargetingContext;
use crate::placement::{Dimensions, Placement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ─── Advertisement ──────────────────────────────────────────────────────────

/// Structural category of a creative, independent of its size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    Banner,
    Sidebar,
    SearchCard,
    SearchFilter,
    ProfileCard,
    Native,
}

impl AdType {
    pub const fn as_str(self) -> &'static str {
        match self {
            AdType::Banner => "banner",
            AdType::Sidebar => "sidebar",
            AdType::SearchCard => "search_card",
            AdType::SearchFilter => "search_filter",
            AdType::ProfileCard => "profile_card",
            AdType::Native => "native",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AdType::Banner,
            AdType::Sidebar,
            AdType::SearchCard,
            AdType::SearchFilter,
            AdType::ProfileCard,
            AdType::Native,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| format!("unknown ad type: {s}"))
    }
}

/// What the viewer actually sees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Creative {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub link_url: String,
    #[serde(default)]
    pub cta_text: Option<String>,
}

/// Targeting criteria. An empty set matches every viewer on that dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Targeting {
    #[serde(default)]
    pub target_pet_types: BTreeSet<String>,
    #[serde(default)]
    pub target_locations: BTreeSet<String>,
    #[serde(default)]
    pub target_subscription_types: BTreeSet<String>,
}

/// Optional serving window, both bounds inclusive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start_date.map_or(true, |start| now >= start)
            && self.end_date.map_or(true, |end| now <= end)
    }

    pub fn is_ordered(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Advertisement {
    pub id: Uuid,
    #[serde(flatten)]
    pub creative: Creative,
    pub ad_type: AdType,
    pub format_id: Uuid,
    #[serde(flatten)]
    pub targeting: Targeting,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub is_active: bool,
    pub priority: u32,
    pub max_impressions: Option<u64>,
    pub max_clicks: Option<u64>,
    #[serde(default)]
    pub current_impressions: u64,
    #[serde(default)]
    pub current_clicks: u64,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived lifecycle state shown on admin views. `Expired` and `Exhausted`
/// are soft: editing dates or caps brings the advertisement back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdStatus {
    Inactive,
    Scheduled,
    Running,
    Expired,
    Exhausted,
}

impl Advertisement {
    pub fn impressions_exhausted(&self) -> bool {
        self.max_impressions
            .is_some_and(|cap| self.current_impressions >= cap)
    }

    pub fn clicks_exhausted(&self) -> bool {
        self.max_clicks.is_some_and(|cap| self.current_clicks >= cap)
    }

    pub fn is_exhausted(&self) -> bool {
        self.impressions_exhausted() || self.clicks_exhausted()
    }

    pub fn status(&self, now: DateTime<Utc>) -> AdStatus {
        if !self.is_active {
            AdStatus::Inactive
        } else if self.is_exhausted() {
            AdStatus::Exhausted
        } else if self.schedule.start_date.is_some_and(|start| now < start) {
            AdStatus::Scheduled
        } else if self.schedule.end_date.is_some_and(|end| now > end) {
            AdStatus::Expired
        } else {
            AdStatus::Running
        }
    }

    pub fn counter(&self, counter: Counter) -> (u64, Option<u64>) {
        match counter {
            Counter::Impressions => (self.current_impressions, self.max_impressions),
            Counter::Clicks => (self.current_clicks, self.max_clicks),
        }
    }
}

// ─── Formats ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdvertisementFormat {
    pub id: Uuid,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub ad_type: AdType,
    pub placement: Placement,
    #[serde(default)]
    pub description: Option<String>,
}

impl AdvertisementFormat {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFormatRequest {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub ad_type: AdType,
    pub placement: Placement,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateFormatRequest {
    /// A format sized to the placement's canonical dimensions.
    pub fn for_placement(name: impl Into<String>, placement: Placement) -> Self {
        let dims = placement.dimensions();
        Self {
            name: name.into(),
            width: dims.width,
            height: dims.height,
            ad_type: placement.default_ad_type(),
            placement,
            description: None,
        }
    }
}

// ─── Counters ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Impressions,
    Clicks,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counter::Impressions => f.write_str("current_impressions"),
            Counter::Clicks => f.write_str("current_clicks"),
        }
    }
}

/// Result of a store-side conditional add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The counter was advanced to the contained value.
    Applied(u64),
    /// The counter already sat at its cap and was left untouched.
    CapReached,
}

// ─── Engagement events ──────────────────────────────────────────────────────

/// Append-only record of one viewing. The advertisement may since have been deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImpressionEvent {
    pub id: Uuid,
    pub advertisement_id: Uuid,
    pub viewer_id: Option<Uuid>,
    pub placement: Placement,
    pub context: TargetingContext,
    pub created_at: DateTime<Utc>,
}

impl ImpressionEvent {
    pub fn new(
        advertisement_id: Uuid,
        viewer_id: Option<Uuid>,
        placement: Placement,
        context: TargetingContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            advertisement_id,
            viewer_id,
            placement,
            context,
            created_at: Utc::now(),
        }
    }
}

/// Append-only record of one activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClickEvent {
    pub id: Uuid,
    pub advertisement_id: Uuid,
    pub impression_id: Option<Uuid>,
    pub viewer_id: Option<Uuid>,
    pub placement: Placement,
    pub context: TargetingContext,
    pub created_at: DateTime<Utc>,
}

impl ClickEvent {
    pub fn new(
        advertisement_id: Uuid,
        impression_id: Option<Uuid>,
        viewer_id: Option<Uuid>,
        placement: Placement,
        context: TargetingContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            advertisement_id,
            impression_id,
            viewer_id,
            placement,
            context,
            created_at: Utc::now(),
        }
    }
}

// ─── Requests ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdvertisementRequest {
    #[serde(flatten)]
    pub creative: Creative,
    pub ad_type: AdType,
    pub format_id: Uuid,
    #[serde(flatten)]
    pub targeting: Targeting,
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub max_impressions: Option<u64>,
    #[serde(default)]
    pub max_clicks: Option<u64>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

impl CreateAdvertisementRequest {
    /// Copy of an existing advertisement that starts inactive so it never
    /// double-serves alongside its source.
    pub fn duplicate_of(source: &Advertisement) -> Self {
        let mut creative = source.creative.clone();
        creative.title = format!("{} (Copy)", creative.title);
        Self {
            creative,
            ad_type: source.ad_type,
            format_id: source.format_id,
            targeting: source.targeting.clone(),
            schedule: source.schedule,
            is_active: false,
            priority: source.priority,
            max_impressions: source.max_impressions,
            max_clicks: source.max_clicks,
            created_by: source.created_by,
        }
    }
}

/// Partial edit. For nullable fields the outer `Option` means "change this
/// field" and the inner one is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAdvertisementRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub cta_text: Option<Option<String>>,
    #[serde(default)]
    pub ad_type: Option<AdType>,
    #[serde(default)]
    pub format_id: Option<Uuid>,
    #[serde(default)]
    pub targeting: Option<Targeting>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_impressions: Option<Option<u64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_clicks: Option<Option<u64>>,
}

impl UpdateAdvertisementRequest {
    /// Apply the edit to a copy of `ad`. Counters are never touched here.
    pub fn apply_to(self, ad: &Advertisement) -> Advertisement {
        let mut next = ad.clone();
        if let Some(title) = self.title {
            next.creative.title = title;
        }
        if let Some(description) = self.description {
            next.creative.description = description;
        }
        if let Some(image_url) = self.image_url {
            next.creative.image_url = image_url;
        }
        if let Some(link_url) = self.link_url {
            next.creative.link_url = link_url;
        }
        if let Some(cta_text) = self.cta_text {
            next.creative.cta_text = cta_text;
        }
        if let Some(ad_type) = self.ad_type {
            next.ad_type = ad_type;
        }
        if let Some(format_id) = self.format_id {
            next.format_id = format_id;
        }
        if let Some(targeting) = self.targeting {
            next.targeting = targeting;
        }
        if let Some(start) = self.start_date {
            next.schedule.start_date = start;
        }
        if let Some(end) = self.end_date {
            next.schedule.end_date = end;
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(cap) = self.max_impressions {
            next.max_impressions = cap;
        }
        if let Some(cap) = self.max_clicks {
            next.max_clicks = cap;
        }
        next
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Catalog listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdFilter {
    #[serde(default)]
    pub ad_type: Option<AdType>,
    #[serde(default)]
    pub active_only: bool,
}

impl AdFilter {
    pub fn active_of_type(ad_type: AdType) -> Self {
        Self {
            ad_type: Some(ad_type),
            active_only: true,
        }
    }

    pub fn matches(&self, ad: &Advertisement) -> bool {
        self.ad_type.map_or(true, |t| t == ad.ad_type) && (!self.active_only || ad.is_active)
    }
}
