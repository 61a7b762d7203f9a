// src/freshness.rs
//! Last stage: admit or reject listings by deadline and age. Never
//! mutates a record.

use chrono::{DateTime, Duration, Utc};

use crate::model::Listing;

#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    /// Drop listings whose deadline has passed. Some deployments disable
    /// this because source deadlines are unreliable.
    pub drop_past_deadlines: bool,
    /// Listings with no deadline at all are dropped once their createdAt
    /// is older than this.
    pub max_age_days: i64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            drop_past_deadlines: true,
            max_age_days: 90,
        }
    }
}

pub fn is_fresh(listing: &Listing, now: DateTime<Utc>, policy: &FreshnessPolicy) -> bool {
    if let Some(deadline) = listing.deadline {
        if policy.drop_past_deadlines && deadline < now {
            return false;
        }
        return true;
    }
    if let Some(created) = listing.created_at {
        return now - created <= Duration::days(policy.max_age_days);
    }
    // No deadline and no createdAt: nothing marks it stale.
    true
}

pub fn filter(listings: Vec<Listing>, now: DateTime<Utc>, policy: &FreshnessPolicy) -> Vec<Listing> {
    listings
        .into_iter()
        .filter(|l| is_fresh(l, now, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(created: Option<DateTime<Utc>>, deadline: Option<DateTime<Utc>>) -> Listing {
        Listing {
            id: "https://x.com/a".into(),
            title: "Win a Trip".into(),
            link: "https://x.com/a".into(),
            source: "x.com".into(),
            created_at: created,
            deadline,
            prize: None,
            tags: vec![],
        }
    }

    #[test]
    fn past_deadline_dropped_when_enabled() {
        let now = Utc::now();
        let policy = FreshnessPolicy::default();
        assert!(!is_fresh(&listing(None, Some(now - Duration::days(1))), now, &policy));
        assert!(is_fresh(&listing(None, Some(now + Duration::days(1))), now, &policy));
    }

    #[test]
    fn past_deadline_kept_when_disabled() {
        let now = Utc::now();
        let policy = FreshnessPolicy {
            drop_past_deadlines: false,
            ..Default::default()
        };
        assert!(is_fresh(&listing(None, Some(now - Duration::days(1))), now, &policy));
    }

    #[test]
    fn stale_record_without_deadline_dropped() {
        let now = Utc::now();
        let policy = FreshnessPolicy::default();
        assert!(!is_fresh(&listing(Some(now - Duration::days(91)), None), now, &policy));
        assert!(is_fresh(&listing(Some(now - Duration::days(89)), None), now, &policy));
        assert!(is_fresh(&listing(None, None), now, &policy));
    }
}
