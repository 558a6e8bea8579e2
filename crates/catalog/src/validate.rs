//! Checks run on every administrative write before anything is stored.

use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::types::{Advertisement, AdvertisementFormat, CreateFormatRequest};
use url::Url;

pub fn validate_advertisement(
    ad: &Advertisement,
    format: Option<&AdvertisementFormat>,
) -> AdServeResult<()> {
    if ad.creative.title.trim().is_empty() {
        return Err(AdServeError::validation("title is required"));
    }

    validate_link(&ad.creative.link_url)?;

    let format = format.ok_or_else(|| {
        AdServeError::validation(format!("format {} does not exist", ad.format_id))
    })?;
    if format.ad_type != ad.ad_type {
        return Err(AdServeError::validation(format!(
            "format {} is for {} creatives, advertisement is {}",
            format.id, format.ad_type, ad.ad_type
        )));
    }

    if !ad.schedule.is_ordered() {
        return Err(AdServeError::validation("start_date must not be after end_date"));
    }

    if let Some(cap) = ad.max_impressions {
        if ad.current_impressions > cap {
            return Err(AdServeError::validation(format!(
                "max_impressions {cap} is below the {} already served",
                ad.current_impressions
            )));
        }
    }
    if let Some(cap) = ad.max_clicks {
        if ad.current_clicks > cap {
            return Err(AdServeError::validation(format!(
                "max_clicks {cap} is below the {} already recorded",
                ad.current_clicks
            )));
        }
    }

    Ok(())
}

pub fn validate_format(req: &CreateFormatRequest) -> AdServeResult<()> {
    if req.name.trim().is_empty() {
        return Err(AdServeError::validation("format name is required"));
    }
    if req.width == 0 || req.height == 0 {
        return Err(AdServeError::validation("format dimensions must be non-zero"));
    }
    Ok(())
}

/// Destination links must be absolute http(s) URLs.
fn validate_link(link: &str) -> AdServeResult<()> {
    if link.trim().is_empty() {
        return Err(AdServeError::validation("destination link is required"));
    }
    let parsed = Url::parse(link)
        .map_err(|e| AdServeError::validation(format!("invalid destination link {link:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AdServeError::validation(format!(
            "destination link must be http or https, got {other}"
        ))),
    }
}
