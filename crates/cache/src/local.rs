//! Process-local viewer profiles, the L1 in front of Redis.
//!
//! Slots carry an absolute deadline. A full cache sweeps expired slots
//! before turning a new viewer away, and the background maintenance loop
//! sweeps the rest.

use crate::profile::ViewerProfile;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Slot {
    profile: ViewerProfile,
    expires_at: Instant,
}

pub struct LocalProfiles {
    slots: DashMap<Uuid, Slot>,
    ttl: Duration,
    capacity: usize,
}

impl LocalProfiles {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: DashMap::with_capacity(capacity.min(10_000)),
            ttl,
            capacity,
        }
    }

    pub fn get(&self, viewer_id: Uuid) -> Option<ViewerProfile> {
        let now = Instant::now();
        {
            let slot = self.slots.get(&viewer_id)?;
            if slot.expires_at > now {
                return Some(slot.profile.clone());
            }
        }
        // A concurrent refresh may have replaced the slot meanwhile.
        self.slots.remove_if(&viewer_id, |_, slot| slot.expires_at <= now);
        None
    }

    /// Returns false when the cache is full of live profiles and
    /// `profile` is a viewer it does not already hold.
    pub fn put(&self, profile: ViewerProfile) -> bool {
        let known = self.slots.contains_key(&profile.viewer_id);
        if !known && self.slots.len() >= self.capacity {
            self.sweep();
            if self.slots.len() >= self.capacity {
                metrics::counter!("cache.l1.rejected").increment(1);
                return false;
            }
        }
        let expires_at = Instant::now() + self.ttl;
        self.slots.insert(profile.viewer_id, Slot { profile, expires_at });
        true
    }

    /// Drop every expired slot, returning how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
