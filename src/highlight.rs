// src/highlight.rs
//! Diff & Highlight Tracker.
//!
//! `new = current − previous`. The first observation of a partition only
//! records the baseline. A non-empty diff replaces the highlight set and
//! restarts its TTL (last write wins); an empty diff leaves it alone.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::ConsultationId;

/// Default time a record stays flagged as new.
pub const DEFAULT_HIGHLIGHT_TTL: Duration = Duration::from_secs(5 * 60);

/// What one tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub new_ids: HashSet<ConsultationId>,
    pub banner: bool,
    /// Set when a new highlight was published; the caller schedules
    /// `expire(generation)` after the TTL.
    pub generation: Option<u64>,
}

#[derive(Debug)]
pub struct HighlightTracker {
    ttl: Duration,
    highlighted: HashSet<ConsultationId>,
    expires_at: Option<Instant>,
    generation: u64,
    known_count: Option<usize>,
    banner: bool,
}

impl HighlightTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            highlighted: HashSet::new(),
            expires_at: None,
            generation: 0,
            known_count: None,
            banner: false,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn observe(
        &mut self,
        previous: Option<&HashSet<ConsultationId>>,
        current: &HashSet<ConsultationId>,
        now: Instant,
    ) -> Observation {
        let count = current.len();

        // Banner compares against the largest count seen so far, once per tick.
        let banner = matches!(self.known_count, Some(known) if count > known);
        self.known_count = Some(self.known_count.map_or(count, |k| k.max(count)));

        let Some(previous) = previous else {
            return Observation {
                new_ids: HashSet::new(),
                banner: false,
                generation: None,
            };
        };

        self.banner = banner;
        let new_ids: HashSet<ConsultationId> = current.difference(previous).cloned().collect();
        if new_ids.is_empty() {
            return Observation {
                new_ids,
                banner,
                generation: None,
            };
        }

        self.generation += 1;
        self.highlighted = new_ids.clone();
        self.expires_at = Some(now + self.ttl);
        Observation {
            new_ids,
            banner,
            generation: Some(self.generation),
        }
    }

    /// Clear the highlight published as `generation`. A newer publication
    /// makes this a no-op. Returns whether anything was cleared.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.expires_at.is_none() {
            return false;
        }
        self.highlighted.clear();
        self.expires_at = None;
        self.banner = false;
        true
    }

    fn live(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now < at)
    }

    pub fn highlighted(&self, now: Instant) -> HashSet<ConsultationId> {
        if self.live(now) {
            self.highlighted.clone()
        } else {
            HashSet::new()
        }
    }

    pub fn is_highlighted(&self, id: &ConsultationId, now: Instant) -> bool {
        self.live(now) && self.highlighted.contains(id)
    }

    pub fn banner(&self, now: Instant) -> bool {
        self.banner && (self.expires_at.is_none() || self.live(now))
    }

    pub fn known_count(&self) -> usize {
        self.known_count.unwrap_or(0)
    }
}

impl Default for HighlightTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u64]) -> HashSet<ConsultationId> {
        v.iter().map(|&i| ConsultationId::from(i)).collect()
    }

    #[test]
    fn baseline_is_never_highlighted() {
        let mut t = HighlightTracker::default();
        let now = Instant::now();
        let obs = t.observe(None, &ids(&[1, 2, 3, 4, 5]), now);
        assert!(obs.new_ids.is_empty());
        assert!(!obs.banner);
        assert_eq!(obs.generation, None);
        assert!(t.highlighted(now).is_empty());
        assert_eq!(t.known_count(), 5);
    }

    #[test]
    fn diff_is_set_difference() {
        let mut t = HighlightTracker::default();
        let now = Instant::now();
        let prev = ids(&[1, 2, 3]);
        t.observe(None, &prev, now);
        let obs = t.observe(Some(&prev), &ids(&[2, 3, 4, 5]), now);
        assert_eq!(obs.new_ids, ids(&[4, 5]));
        assert!(obs.banner);
        assert_eq!(t.highlighted(now), ids(&[4, 5]));
    }

    #[test]
    fn highlight_lapses_after_ttl() {
        let mut t = HighlightTracker::new(Duration::from_secs(300));
        let t0 = Instant::now();
        let prev = ids(&[1]);
        t.observe(None, &prev, t0);
        let obs = t.observe(Some(&prev), &ids(&[1, 2]), t0);
        assert!(t.is_highlighted(&ConsultationId::from("2"), t0 + Duration::from_secs(299)));
        assert!(t.highlighted(t0 + Duration::from_secs(300)).is_empty());

        assert!(t.expire(obs.generation.unwrap()));
        assert!(t.highlighted(t0).is_empty());
        assert!(!t.banner(t0));
    }

    #[test]
    fn newer_diff_supersedes_older_timer() {
        let mut t = HighlightTracker::default();
        let now = Instant::now();
        let a = ids(&[1]);
        let b = ids(&[1, 2]);
        let c = ids(&[1, 2, 3]);
        t.observe(None, &a, now);
        let first = t.observe(Some(&a), &b, now).generation.unwrap();
        let second = t.observe(Some(&b), &c, now).generation.unwrap();

        // the superseded timer fires: nothing happens
        assert!(!t.expire(first));
        assert_eq!(t.highlighted(now), ids(&[3]));
        assert!(t.expire(second));
    }

    #[test]
    fn empty_diff_keeps_existing_highlight() {
        let mut t = HighlightTracker::default();
        let now = Instant::now();
        let a = ids(&[1]);
        let b = ids(&[1, 2]);
        t.observe(None, &a, now);
        t.observe(Some(&a), &b, now);
        let obs = t.observe(Some(&b), &b, now);
        assert!(obs.new_ids.is_empty());
        assert!(!obs.banner);
        assert_eq!(t.highlighted(now), ids(&[2]));
    }

    #[test]
    fn banner_uses_known_maximum() {
        let mut t = HighlightTracker::default();
        let now = Instant::now();
        let three = ids(&[1, 2, 3]);
        let two = ids(&[1, 2]);
        let swapped = ids(&[1, 2, 9]);
        t.observe(None, &three, now);
        assert!(!t.observe(Some(&three), &two, now).banner);
        // back to three records: new id, but count did not exceed the maximum
        let obs = t.observe(Some(&two), &swapped, now);
        assert_eq!(obs.new_ids, ids(&[9]));
        assert!(!obs.banner);
        assert_eq!(t.known_count(), 3);
    }
}
