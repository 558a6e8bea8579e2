//! Selection policy: highest priority wins, earlier creation breaks ties.
//! The catalog id settles the rare case of identical creation timestamps,
//! so an unchanged candidate set always yields the same winner.

use adserve_core::types::Advertisement;
use std::cmp::Ordering;

pub fn compare(a: &Advertisement, b: &Advertisement) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Order candidates best first.
pub fn rank(candidates: &mut [Advertisement]) {
    candidates.sort_by(compare);
}

/// The single advertisement delivered for a request, if any.
pub fn pick_winner(candidates: &[Advertisement]) -> Option<&Advertisement> {
    candidates.iter().min_by(|a, b| compare(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adserve_core::types::{AdType, Creative, Schedule, Targeting};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn ad(title: &str, priority: u32, age_secs: i64) -> Advertisement {
        let created = Utc::now() - Duration::seconds(age_secs);
        Advertisement {
            id: Uuid::new_v4(),
            creative: Creative {
                title: title.to_string(),
                description: None,
                image_url: None,
                link_url: "https://example.com".to_string(),
                cta_text: None,
            },
            ad_type: AdType::Banner,
            format_id: Uuid::new_v4(),
            targeting: Targeting::default(),
            schedule: Schedule::default(),
            is_active: true,
            priority,
            max_impressions: None,
            max_clicks: None,
            current_impressions: 0,
            current_clicks: 0,
            created_by: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_priority_descending_then_oldest_first() {
        let mut candidates = vec![ad("low", 1, 100), ad("new-high", 5, 10), ad("old-high", 5, 50)];
        rank(&mut candidates);
        let titles: Vec<&str> = candidates.iter().map(|a| a.creative.title.as_str()).collect();
        assert_eq!(titles, ["old-high", "new-high", "low"]);
    }

    #[test]
    fn test_winner_is_independent_of_input_order() {
        let candidates = vec![ad("a", 2, 30), ad("b", 7, 20), ad("c", 7, 40), ad("d", 0, 90)];
        let winner = pick_winner(&candidates).unwrap().id;

        let mut reversed = candidates.clone();
        reversed.reverse();
        assert_eq!(pick_winner(&reversed).unwrap().id, winner);
        assert_eq!(pick_winner(&candidates).unwrap().creative.title, "c");

        let mut ranked = candidates.clone();
        rank(&mut ranked);
        assert_eq!(ranked[0].id, winner);
    }

    #[test]
    fn test_identical_timestamps_fall_back_to_id() {
        let first = ad("x", 3, 10);
        let mut second = ad("y", 3, 10);
        second.created_at = first.created_at;
        let expected = if first.id < second.id { first.id } else { second.id };
        assert_eq!(pick_winner(&[first.clone(), second.clone()]).unwrap().id, expected);
        assert_eq!(pick_winner(&[second, first]).unwrap().id, expected);
    }

    #[test]
    fn test_empty_candidates_deliver_nothing() {
        assert!(pick_winner(&[]).is_none());
    }
}
