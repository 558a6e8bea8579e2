use adserve_core::context::TargetingContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Targeting-relevant slice of a viewer's account, published by the
/// profile subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewerProfile {
    pub viewer_id: Uuid,
    #[serde(default)]
    pub pet_types: BTreeSet<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub subscription_type: Option<String>,
}

impl ViewerProfile {
    pub fn to_context(&self) -> TargetingContext {
        TargetingContext {
            pet_types: self.pet_types.clone(),
            location: self.location.clone(),
            subscription_type: self.subscription_type.clone(),
        }
    }
}
