//! Named page slots and the creative size each one expects.

use crate::types::AdType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical creative size in CSS pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A named slot on a page. Several placements may share one [`AdType`]
/// while expecting different physical sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    HomepageBanner,
    Sidebar,
    SearchResults,
    SearchFilter,
    ProfilePage,
    MessageInline,
}

impl Placement {
    pub const ALL: [Placement; 6] = [
        Placement::HomepageBanner,
        Placement::Sidebar,
        Placement::SearchResults,
        Placement::SearchFilter,
        Placement::ProfilePage,
        Placement::MessageInline,
    ];

    /// Canonical creative size registered for this placement.
    pub const fn dimensions(self) -> Dimensions {
        match self {
            Placement::HomepageBanner => Dimensions::new(1200, 300),
            Placement::Sidebar => Dimensions::new(300, 600),
            Placement::SearchResults => Dimensions::new(384, 480),
            Placement::SearchFilter => Dimensions::new(970, 90),
            Placement::ProfilePage => Dimensions::new(300, 250),
            Placement::MessageInline => Dimensions::new(728, 90),
        }
    }

    /// Ad type a page requests when it mounts this placement without naming one.
    pub const fn default_ad_type(self) -> AdType {
        match self {
            Placement::HomepageBanner => AdType::Banner,
            Placement::Sidebar => AdType::Sidebar,
            Placement::SearchResults => AdType::SearchCard,
            Placement::SearchFilter => AdType::SearchFilter,
            Placement::ProfilePage => AdType::ProfileCard,
            Placement::MessageInline => AdType::Native,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Placement::HomepageBanner => "homepage_banner",
            Placement::Sidebar => "sidebar",
            Placement::SearchResults => "search_results",
            Placement::SearchFilter => "search_filter",
            Placement::ProfilePage => "profile_page",
            Placement::MessageInline => "message_inline",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Placement::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown placement: {s}"))
    }
}
