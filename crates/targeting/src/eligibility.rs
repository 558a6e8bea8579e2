//! Eligibility filter. Every rule must hold for an advertisement to qualify;
//! an empty result is a normal outcome.

use adserve_core::context::{normalize, TargetingContext, COUNTRY_WIDE};
use adserve_core::placement::{Dimensions, Placement};
use adserve_core::types::{AdType, Advertisement, AdvertisementFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// One selection request from a placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub ad_type: AdType,
    pub placement: Placement,
    #[serde(default)]
    pub context: TargetingContext,
}

impl SelectionRequest {
    pub fn new(ad_type: AdType, placement: Placement, context: TargetingContext) -> Self {
        Self {
            ad_type,
            placement,
            context,
        }
    }

    /// Request the placement's own ad type.
    pub fn for_placement(placement: Placement, context: TargetingContext) -> Self {
        Self::new(placement.default_ad_type(), placement, context)
    }
}

/// First rule an advertisement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Inactive,
    OutsideSchedule,
    AdTypeMismatch,
    MissingFormat,
    DimensionMismatch { expected: Dimensions, actual: Dimensions },
    PetTypeMismatch,
    LocationMismatch,
    SubscriptionMismatch,
    CapExhausted,
}

/// Check every rule in order and report the first one that fails.
pub fn check(
    ad: &Advertisement,
    format: Option<&AdvertisementFormat>,
    request: &SelectionRequest,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    if !ad.is_active {
        return Err(Rejection::Inactive);
    }
    if !ad.schedule.contains(now) {
        return Err(Rejection::OutsideSchedule);
    }
    if ad.ad_type != request.ad_type {
        return Err(Rejection::AdTypeMismatch);
    }

    let format = format.ok_or(Rejection::MissingFormat)?;
    let expected = request.placement.dimensions();
    if format.dimensions() != expected {
        return Err(Rejection::DimensionMismatch {
            expected,
            actual: format.dimensions(),
        });
    }

    let targeting = &ad.targeting;
    if !pet_types_match(&targeting.target_pet_types, &request.context) {
        return Err(Rejection::PetTypeMismatch);
    }
    if !location_matches(&targeting.target_locations, &request.context) {
        return Err(Rejection::LocationMismatch);
    }
    if !subscription_matches(&targeting.target_subscription_types, &request.context) {
        return Err(Rejection::SubscriptionMismatch);
    }
    if ad.is_exhausted() {
        return Err(Rejection::CapExhausted);
    }
    Ok(())
}

pub fn is_eligible(
    ad: &Advertisement,
    format: Option<&AdvertisementFormat>,
    request: &SelectionRequest,
    now: DateTime<Utc>,
) -> bool {
    check(ad, format, request, now).is_ok()
}

/// All advertisements that qualify, in catalog order.
pub fn filter_eligible(
    ads: Vec<Advertisement>,
    formats: &HashMap<Uuid, AdvertisementFormat>,
    request: &SelectionRequest,
    now: DateTime<Utc>,
) -> Vec<Advertisement> {
    ads.into_iter()
        .filter(|ad| is_eligible(ad, formats.get(&ad.format_id), request, now))
        .collect()
}

fn pet_types_match(targets: &BTreeSet<String>, context: &TargetingContext) -> bool {
    if targets.is_empty() {
        return true;
    }
    let viewer: BTreeSet<String> = context.pet_types.iter().map(|p| normalize(p)).collect();
    targets.iter().any(|t| viewer.contains(&normalize(t)))
}

fn location_matches(targets: &BTreeSet<String>, context: &TargetingContext) -> bool {
    if targets.is_empty() || targets.iter().any(|t| normalize(t) == COUNTRY_WIDE) {
        return true;
    }
    match context.normalized_location() {
        Some(location) => targets.iter().any(|t| normalize(t) == location),
        None => false,
    }
}

fn subscription_matches(targets: &BTreeSet<String>, context: &TargetingContext) -> bool {
    if targets.is_empty() {
        return true;
    }
    match context.subscription_type.as_deref().map(normalize) {
        Some(tier) => targets.iter().any(|t| normalize(t) == tier),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::types::{Creative, Schedule, Targeting};
    use chrono::Duration;

    fn format_for(placement: Placement) -> AdvertisementFormat {
        let dims = placement.dimensions();
        AdvertisementFormat {
            id: Uuid::new_v4(),
            name: placement.to_string(),
            width: dims.width,
            height: dims.height,
            ad_type: placement.default_ad_type(),
            placement,
            description: None,
        }
    }

    fn ad_on(format: &AdvertisementFormat) -> Advertisement {
        let now = Utc::now();
        Advertisement {
            id: Uuid::new_v4(),
            creative: Creative {
                title: "Pet insurance".to_string(),
                description: None,
                image_url: None,
                link_url: "https://insure.example.com".to_string(),
                cta_text: None,
            },
            ad_type: format.ad_type,
            format_id: format.id,
            targeting: Targeting::default(),
            schedule: Schedule::default(),
            is_active: true,
            priority: 1,
            max_impressions: None,
            max_clicks: None,
            current_impressions: 0,
            current_clicks: 0,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sidebar_request(context: TargetingContext) -> SelectionRequest {
        SelectionRequest::for_placement(Placement::Sidebar, context)
    }

    #[test]
    fn test_unconstrained_ad_matches_anonymous_viewer() {
        let format = format_for(Placement::Sidebar);
        let ad = ad_on(&format);
        let req = sidebar_request(TargetingContext::anonymous());
        assert_eq!(check(&ad, Some(&format), &req, Utc::now()), Ok(()));
    }

    #[test]
    fn test_inactive_and_missing_format() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        let req = sidebar_request(TargetingContext::anonymous());
        assert_eq!(check(&ad, None, &req, Utc::now()), Err(Rejection::MissingFormat));
        ad.is_active = false;
        assert_eq!(check(&ad, Some(&format), &req, Utc::now()), Err(Rejection::Inactive));
    }

    #[test]
    fn test_schedule_window_excludes_regardless_of_other_matches() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        let now = Utc::now();
        let req = sidebar_request(TargetingContext::anonymous());

        ad.schedule.start_date = Some(now + Duration::hours(1));
        assert_eq!(check(&ad, Some(&format), &req, now), Err(Rejection::OutsideSchedule));

        ad.schedule.start_date = Some(now - Duration::days(7));
        ad.schedule.end_date = Some(now - Duration::days(1));
        assert_eq!(check(&ad, Some(&format), &req, now), Err(Rejection::OutsideSchedule));

        ad.schedule.end_date = Some(now + Duration::days(1));
        assert!(is_eligible(&ad, Some(&format), &req, now));
    }

    #[test]
    fn test_dimension_mismatch_disqualifies_matching_type() {
        let mut format = format_for(Placement::Sidebar);
        format.height = 250;
        let ad = ad_on(&format);
        let req = sidebar_request(TargetingContext::anonymous());
        assert!(matches!(
            check(&ad, Some(&format), &req, Utc::now()),
            Err(Rejection::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_pet_types_intersect_case_insensitively() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        ad.targeting.target_pet_types = set(&["Dog", "rabbit"]);
        let now = Utc::now();

        let dog_owner =
            sidebar_request(TargetingContext::anonymous().with_pet_types(["dog", "cat"]));
        assert!(is_eligible(&ad, Some(&format), &dog_owner, now));

        let cat_owner = sidebar_request(TargetingContext::anonymous().with_pet_types(["cat"]));
        assert_eq!(check(&ad, Some(&format), &cat_owner, now), Err(Rejection::PetTypeMismatch));
    }

    #[test]
    fn test_empty_viewer_only_matches_wildcard_targets() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        let req = sidebar_request(TargetingContext::anonymous());
        let now = Utc::now();

        assert!(is_eligible(&ad, Some(&format), &req, now));
        ad.targeting.target_pet_types = set(&["dog"]);
        assert!(!is_eligible(&ad, Some(&format), &req, now));
    }

    #[test]
    fn test_country_wide_matches_every_location() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        ad.targeting.target_locations = set(&["country-wide"]);
        let now = Utc::now();

        for location in ["Oslo", "Bergen", "Tromsø"] {
            let req = sidebar_request(TargetingContext::anonymous().with_location(location));
            assert!(is_eligible(&ad, Some(&format), &req, now), "{location}");
        }
        let nowhere = sidebar_request(TargetingContext::anonymous());
        assert!(is_eligible(&ad, Some(&format), &nowhere, now));
    }

    #[test]
    fn test_concrete_location_requires_match() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        ad.targeting.target_locations = set(&["Oslo"]);
        let now = Utc::now();

        let oslo = sidebar_request(TargetingContext::anonymous().with_location(" oslo "));
        assert!(is_eligible(&ad, Some(&format), &oslo, now));
        let bergen = sidebar_request(TargetingContext::anonymous().with_location("Bergen"));
        assert_eq!(check(&ad, Some(&format), &bergen, now), Err(Rejection::LocationMismatch));
        let unknown = sidebar_request(TargetingContext::anonymous());
        assert_eq!(check(&ad, Some(&format), &unknown, now), Err(Rejection::LocationMismatch));
    }

    #[test]
    fn test_subscription_tier() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        ad.targeting.target_subscription_types = set(&["premium"]);
        let now = Utc::now();

        let premium = sidebar_request(TargetingContext::anonymous().with_subscription("Premium"));
        assert!(is_eligible(&ad, Some(&format), &premium, now));
        let free = sidebar_request(TargetingContext::anonymous().with_subscription("free"));
        assert_eq!(check(&ad, Some(&format), &free, now), Err(Rejection::SubscriptionMismatch));
    }

    #[test]
    fn test_exhausted_caps() {
        let format = format_for(Placement::Sidebar);
        let mut ad = ad_on(&format);
        let req = sidebar_request(TargetingContext::anonymous());
        let now = Utc::now();

        ad.max_clicks = Some(3);
        ad.current_clicks = 3;
        assert_eq!(check(&ad, Some(&format), &req, now), Err(Rejection::CapExhausted));

        ad.max_clicks = Some(0);
        ad.current_clicks = 0;
        assert_eq!(check(&ad, Some(&format), &req, now), Err(Rejection::CapExhausted));
    }

    #[test]
    fn test_filter_keeps_only_exact_dimensions() {
        let sidebar = format_for(Placement::Sidebar);
        let mut narrow = format_for(Placement::Sidebar);
        narrow.width = 160;
        let formats: HashMap<Uuid, AdvertisementFormat> =
            [(sidebar.id, sidebar.clone()), (narrow.id, narrow.clone())].into_iter().collect();

        let ads = vec![ad_on(&sidebar), ad_on(&narrow), ad_on(&sidebar)];
        let req = sidebar_request(TargetingContext::anonymous());
        let eligible = filter_eligible(ads, &formats, &req, Utc::now());

        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|ad| ad.format_id == sidebar.id));
    }
}
