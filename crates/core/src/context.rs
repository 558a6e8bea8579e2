//! Viewer targeting context: the attributes an advertisement is matched against.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Literal location value that matches every viewer location.
pub const COUNTRY_WIDE: &str = "country-wide";

/// Best-effort description of the current viewer. Absent attributes are
/// empty rather than errors; they only match advertisements that do not
/// constrain that dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetingContext {
    #[serde(default)]
    pub pet_types: BTreeSet<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub subscription_type: Option<String>,
}

impl TargetingContext {
    /// A viewer about whom nothing is known.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_pet_types<I, S>(mut self, pet_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pet_types = pet_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_subscription(mut self, subscription_type: impl Into<String>) -> Self {
        self.subscription_type = Some(subscription_type.into());
        self
    }

    /// Normalized location, `None` when absent or blank.
    pub fn normalized_location(&self) -> Option<String> {
        self.location
            .as_deref()
            .map(normalize)
            .filter(|l| !l.is_empty())
    }

    /// Stable digest of the context's meaning. Two contexts that differ only
    /// in case, whitespace or pet-type order share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let pets: BTreeSet<String> = self.pet_types.iter().map(|p| normalize(p)).collect();
        let mut hasher = Sha256::new();
        for pet in &pets {
            hasher.update(pet.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
        hasher.update(self.normalized_location().unwrap_or_default().as_bytes());
        hasher.update([0x1e]);
        hasher.update(
            self.subscription_type
                .as_deref()
                .map(normalize)
                .unwrap_or_default()
                .as_bytes(),
        );
        hex::encode(hasher.finalize())
    }
}

/// Lowercase and trim, the comparison form for targeting values.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
